mod cli;
mod commands;
mod config;
mod error;
mod logging;
mod utils;

use crate::cli::{Cli, Commands};
use crate::error::{CliError, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info};

/// Log file written next to the job when `run` is called without `--log-file`.
const DEFAULT_RUN_LOG: &str = "logfile.log";

#[tokio::main]
async fn main() {
    if let Err(e) = run_app().await {
        eprintln!("\n❌ Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_app() -> Result<()> {
    let cli = Cli::parse();

    let log_file = cli.log_file.clone().or_else(|| {
        matches!(cli.command, Commands::Run(_)).then(|| PathBuf::from(DEFAULT_RUN_LOG))
    });
    logging::setup_logging(cli.verbose, cli.quiet, log_file)?;

    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default().into_hooks();
    eyre_hook.install().map_err(|e| CliError::Other(e.into()))?;
    std::panic::set_hook(Box::new(move |pi| {
        error!("{}", panic_hook.panic_report(pi));
    }));

    info!("qcdispatch CLI v{} starting up.", env!("CARGO_PKG_VERSION"));
    debug!("Full CLI arguments parsed: {:?}", &cli);

    let command_result = match cli.command {
        Commands::Run(args) => {
            info!("Dispatching to 'run' command.");
            commands::run::run(args).await
        }
        Commands::Scan(args) => {
            info!("Dispatching to 'scan' command.");
            commands::scan::run(args).await
        }
        Commands::Energies(args) => {
            info!("Dispatching to 'energies' command.");
            commands::energies::run(args).await
        }
        Commands::Db(args) => {
            info!("Dispatching to 'db' command.");
            commands::db::run(args).await
        }
    };

    match &command_result {
        Ok(_) => info!("✅ Command completed successfully."),
        Err(e) => error!("❌ Command failed: {}", e),
    }

    command_result
}
