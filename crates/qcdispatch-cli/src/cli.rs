use clap::{Args, Parser, Subcommand};
use qcdispatch::core::models::structure::Axis;
use qcdispatch::engine::config::{CalcType, CalculatorKind};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "qcdispatch - run DFTB+, Gaussian and VASP calculations over structure databases and collect the results.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output.
    /// `run` logs to `logfile.log` when this is not given.
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one calculator over every structure of the input and record the results.
    Run(RunArgs),
    /// Split a structure into two fragments and write a rigid displacement scan.
    Scan(ScanArgs),
    /// Print or export energies relative to the minimum of each database.
    Energies(EnergiesArgs),
    /// Find and inspect structure databases.
    Db(DbArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the job configuration file in TOML format.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub config: PathBuf,

    /// Override the calculator (dftb, gaussian or vasp).
    #[arg(long, value_name = "NAME")]
    pub calculator: Option<CalculatorKind>,

    /// Override the calculation type (opt or sp).
    #[arg(long, value_name = "TYPE")]
    pub calc_type: Option<CalcType>,

    /// Override the label prefix.
    #[arg(long, value_name = "TEXT")]
    pub prefix: Option<String>,

    /// Override the folder holding the input and output databases.
    #[arg(long, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Override the input database, trajectory or structure file name.
    #[arg(short, long, value_name = "NAME")]
    pub input: Option<PathBuf>,

    /// Override the root folder of the per-structure calculation folders.
    #[arg(short, long, value_name = "PATH")]
    pub output_path: Option<PathBuf>,

    /// Set a specific configuration value, overriding the config file.
    /// Can be used multiple times. Example: -S job.encut=520
    #[arg(short = 'S', long = "set", value_name = "KEY=VALUE", num_args(0..))]
    pub set_values: Vec<String>,
}

/// Arguments for the `scan` subcommand.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Structure to split (extended XYZ, POSCAR or gen; the last frame is used).
    #[arg(short, long, required = true, value_name = "PATH")]
    pub input: PathBuf,

    /// Database the scan points are appended to.
    #[arg(short, long, required = true, value_name = "PATH")]
    pub output: PathBuf,

    /// Axis along which the fragments are separated and displaced.
    #[arg(short, long, default_value = "x", value_name = "AXIS")]
    pub axis: Axis,

    /// Coordinate separating the two fragments, in Angstroms.
    #[arg(short, long, required = true, value_name = "FLOAT", allow_negative_numbers = true)]
    pub threshold: f64,

    /// Step between consecutive points, in Angstroms.
    #[arg(short, long, default_value_t = 0.5, value_name = "FLOAT")]
    pub displacement: f64,

    /// Points with the fragments closer than in the input geometry.
    #[arg(long, default_value_t = 0, value_name = "INT")]
    pub num_closer: usize,

    /// Points with the fragments further apart than in the input geometry.
    #[arg(long, default_value_t = 6, value_name = "INT")]
    pub num_away: usize,
}

/// Arguments for the `energies` subcommand.
#[derive(Args, Debug)]
pub struct EnergiesArgs {
    /// Result databases to compare.
    #[arg(required = true, num_args(1..), value_name = "DB")]
    pub databases: Vec<PathBuf>,

    /// Column labels, one per database. Defaults to the database file stems.
    #[arg(short, long, value_delimiter = ',', value_name = "LABELS")]
    pub labels: Vec<String>,

    /// Write the table as CSV to this file instead of printing it.
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

/// Arguments for the `db` subcommand.
#[derive(Args, Debug)]
pub struct DbArgs {
    #[command(subcommand)]
    pub command: DbCommands,
}

#[derive(Subcommand, Debug)]
pub enum DbCommands {
    /// List the databases in a folder together with their selection index.
    List {
        /// Folder to search.
        #[arg(default_value = ".")]
        folder: PathBuf,
    },
    /// List the rows of one database, chosen by index or file name fragment.
    Show {
        /// Listing index or a unique part of the file name.
        #[arg(required = true)]
        selector: String,

        /// Folder to search.
        #[arg(short, long, default_value = ".")]
        folder: PathBuf,
    },
}
