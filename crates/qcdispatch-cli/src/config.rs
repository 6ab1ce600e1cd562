use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use crate::utils::parser;
use qcdispatch::engine::config::{
    CalcType, CalculatorKind, EngineSettings, JobConfig, JobConfigBuilder,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// A boolean that may also be spelled `"yes"`/`"no"` in job files.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
enum Switch {
    Bool(bool),
    Text(String),
}

impl Switch {
    fn resolve(&self, key: &str) -> Result<bool> {
        match self {
            Switch::Bool(b) => Ok(*b),
            Switch::Text(text) => parse_switch(key, text),
        }
    }
}

fn parse_switch(key: &str, text: &str) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "yes" | "true" | "on" | "1" => Ok(true),
        "no" | "false" | "off" | "0" | "" => Ok(false),
        _ => Err(CliError::Config(format!(
            "Invalid boolean value for {}: {}",
            key, text
        ))),
    }
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialJobConfig {
    prefix: Option<String>,
    calculator: Option<String>,
    calc_type: Option<String>,
    functional: Option<String>,
    dispersion_correction: Option<String>,
    basis_set: Option<String>,
    parametrization: Option<String>,
    kpoints: Option<[u32; 3]>,
    encut: Option<f64>,
    lattice_opt: Option<Switch>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialPathConfig {
    db_path: Option<PathBuf>,
    input_db_name: Option<PathBuf>,
    output_path: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialDftbConfig {
    command: Option<String>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialGaussianConfig {
    command: Option<String>,
    mem: Option<String>,
    nprocshared: Option<u32>,
    scf_max_cycles: Option<u32>,
    opt_max_cycles: Option<u32>,
    population: Option<String>,
    charge: Option<i32>,
    multiplicity: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct PartialVaspConfig {
    command: Option<String>,
    pp_path: Option<PathBuf>,
    potpaw_set: Option<String>,
    default_encut: Option<f64>,
    nsw_opt: Option<u32>,
    stdout_file: Option<String>,
}

/// The job file as written by the user, before CLI overrides and validation.
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct PartialRunConfig {
    job: Option<PartialJobConfig>,
    paths: Option<PartialPathConfig>,
    dftb: Option<PartialDftbConfig>,
    gaussian: Option<PartialGaussianConfig>,
    vasp: Option<PartialVaspConfig>,
}

impl PartialRunConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Applies `-S` values and CLI flags on top of the file, then validates the job.
    pub fn merge_with_cli(mut self, args: &RunArgs) -> Result<JobConfig> {
        self.apply_set_values(&args.set_values)?;

        let job = self.job.take().unwrap_or_default();
        let paths = self.paths.take().unwrap_or_default();

        let calculator = match (args.calculator, job.calculator.as_deref()) {
            (Some(kind), _) => Some(kind),
            (None, Some(name)) => Some(parse_core::<CalculatorKind>(name)?),
            (None, None) => None,
        };
        let calc_type = match (args.calc_type, job.calc_type.as_deref()) {
            (Some(kind), _) => Some(kind),
            (None, Some(name)) => Some(parse_core::<CalcType>(name)?),
            (None, None) => None,
        };

        let mut builder = JobConfigBuilder::new().engines(self.engine_settings());
        if let Some(prefix) = args.prefix.clone().or(job.prefix) {
            builder = builder.prefix(prefix);
        }
        if let Some(calculator) = calculator {
            builder = builder.calculator(calculator);
        }
        if let Some(calc_type) = calc_type {
            builder = builder.calc_type(calc_type);
        }
        if let Some(functional) = job.functional {
            builder = builder.functional(functional);
        }
        if let Some(correction) = job.dispersion_correction {
            builder = builder.dispersion_correction(correction);
        }
        if let Some(basis_set) = job.basis_set {
            builder = builder.basis_set(basis_set);
        }
        if let Some(parametrization) = job.parametrization {
            builder = builder.parametrization(parametrization);
        }
        if let Some(kpoints) = job.kpoints {
            builder = builder.kpoints(kpoints);
        }
        if let Some(encut) = job.encut {
            builder = builder.encut(encut);
        }
        if let Some(lattice_opt) = &job.lattice_opt {
            builder = builder.lattice_opt(lattice_opt.resolve("job.lattice-opt")?);
        }
        if let Some(db_path) = args.db_path.clone().or(paths.db_path) {
            builder = builder.db_path(db_path);
        }
        if let Some(input) = args.input.clone().or(paths.input_db_name) {
            builder = builder.input_name(input);
        }
        if let Some(output) = args.output_path.clone().or(paths.output_path) {
            builder = builder.output_path(output);
        }

        builder.build().map_err(|e| CliError::Config(e.to_string()))
    }

    /// Environment defaults overlaid with the engine sections of the file.
    fn engine_settings(&mut self) -> EngineSettings {
        let mut engines = EngineSettings::from_env();

        if let Some(dftb) = self.dftb.take() {
            if let Some(command) = dftb.command {
                engines.dftb.command = command;
            }
        }

        if let Some(g) = self.gaussian.take() {
            let target = &mut engines.gaussian;
            if let Some(v) = g.command {
                target.command = v;
            }
            if let Some(v) = g.mem {
                target.mem = v;
            }
            if let Some(v) = g.nprocshared {
                target.nprocshared = v;
            }
            if let Some(v) = g.scf_max_cycles {
                target.scf_max_cycles = v;
            }
            if let Some(v) = g.opt_max_cycles {
                target.opt_max_cycles = v;
            }
            if let Some(v) = g.population {
                target.population = v;
            }
            if let Some(v) = g.charge {
                target.charge = v;
            }
            if let Some(v) = g.multiplicity {
                target.multiplicity = v;
            }
        }

        if let Some(v) = self.vasp.take() {
            let target = &mut engines.vasp;
            if let Some(command) = v.command {
                target.command = command;
            }
            if v.pp_path.is_some() {
                target.pp_path = v.pp_path;
            }
            if let Some(set) = v.potpaw_set {
                target.potpaw_set = set;
            }
            if let Some(encut) = v.default_encut {
                target.default_encut = encut;
            }
            if let Some(nsw) = v.nsw_opt {
                target.nsw_opt = nsw;
            }
            if let Some(file) = v.stdout_file {
                target.stdout_file = file;
            }
        }

        engines
    }

    fn apply_set_values(&mut self, set_values: &[String]) -> Result<()> {
        for kv_pair in set_values {
            let (key, value) =
                parser::parse_assignment(kv_pair).map_err(|e| CliError::Config(e.to_string()))?;
            debug!("Applying --set {} = {}", key, value);

            let text = || Some(value.to_string());
            let path = || Some(PathBuf::from(value));

            match key {
                "job.prefix" => self.job().prefix = text(),
                "job.calculator" => self.job().calculator = text(),
                "job.calc-type" => self.job().calc_type = text(),
                "job.functional" => self.job().functional = text(),
                "job.dispersion-correction" => self.job().dispersion_correction = text(),
                "job.basis-set" => self.job().basis_set = text(),
                "job.parametrization" => self.job().parametrization = text(),
                "job.kpoints" => {
                    self.job().kpoints = Some(
                        parser::parse_kpoints(value)
                            .map_err(|e| CliError::Config(e.to_string()))?,
                    )
                }
                "job.encut" => self.job().encut = Some(parse_number(key, value)?),
                "job.lattice-opt" => {
                    self.job().lattice_opt = Some(Switch::Bool(parse_switch(key, value)?))
                }
                "paths.db-path" => self.paths().db_path = path(),
                "paths.input-db-name" => self.paths().input_db_name = path(),
                "paths.output-path" => self.paths().output_path = path(),
                "dftb.command" => {
                    self.dftb.get_or_insert_with(Default::default).command = text()
                }
                "gaussian.command" => self.gaussian().command = text(),
                "gaussian.mem" => self.gaussian().mem = text(),
                "gaussian.nprocshared" => {
                    self.gaussian().nprocshared = Some(parse_number(key, value)?)
                }
                "gaussian.scf-max-cycles" => {
                    self.gaussian().scf_max_cycles = Some(parse_number(key, value)?)
                }
                "gaussian.opt-max-cycles" => {
                    self.gaussian().opt_max_cycles = Some(parse_number(key, value)?)
                }
                "gaussian.population" => self.gaussian().population = text(),
                "gaussian.charge" => self.gaussian().charge = Some(parse_number(key, value)?),
                "gaussian.multiplicity" => {
                    self.gaussian().multiplicity = Some(parse_number(key, value)?)
                }
                "vasp.command" => self.vasp().command = text(),
                "vasp.pp-path" => self.vasp().pp_path = path(),
                "vasp.potpaw-set" => self.vasp().potpaw_set = text(),
                "vasp.default-encut" => {
                    self.vasp().default_encut = Some(parse_number(key, value)?)
                }
                "vasp.nsw-opt" => self.vasp().nsw_opt = Some(parse_number(key, value)?),
                "vasp.stdout-file" => self.vasp().stdout_file = text(),
                _ => {
                    return Err(CliError::Config(format!(
                        "Unsupported configuration key for --set: '{}'",
                        key
                    )));
                }
            }
        }
        Ok(())
    }

    fn job(&mut self) -> &mut PartialJobConfig {
        self.job.get_or_insert_with(Default::default)
    }

    fn paths(&mut self) -> &mut PartialPathConfig {
        self.paths.get_or_insert_with(Default::default)
    }

    fn gaussian(&mut self) -> &mut PartialGaussianConfig {
        self.gaussian.get_or_insert_with(Default::default)
    }

    fn vasp(&mut self) -> &mut PartialVaspConfig {
        self.vasp.get_or_insert_with(Default::default)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| {
        CliError::Config(format!("Invalid numeric value for {}: {}", key, value))
    })
}

fn parse_core<T>(value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e: T::Err| CliError::Config(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use once_cell::sync::Lazy;
    use std::fs;
    use tempfile::{TempDir, tempdir};

    static TEST_DIR: Lazy<TempDir> = Lazy::new(|| tempdir().expect("Failed to create temp dir"));

    fn write_config_file(name: &str, content: &str) -> PathBuf {
        let file_path = TEST_DIR.path().join(name);
        fs::write(&file_path, content).unwrap();
        file_path
    }

    fn run_args(config_path: &Path, extra: &[&str]) -> RunArgs {
        let mut argv = vec![
            "qcdispatch".to_string(),
            "run".to_string(),
            "-c".to_string(),
            config_path.to_str().unwrap().to_string(),
        ];
        argv.extend(extra.iter().map(|s| s.to_string()));
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    fn load(config_path: &Path, extra: &[&str]) -> Result<JobConfig> {
        PartialRunConfig::from_file(config_path)?.merge_with_cli(&run_args(config_path, extra))
    }

    const VASP_JOB: &str = r#"
        [job]
        prefix = "bulk"
        calculator = "vasp"
        calc-type = "opt"
        functional = "PBE"
        dispersion-correction = "D3"
        kpoints = [4, 4, 2]
        encut = 520.0
        lattice-opt = "yes"

        [paths]
        db-path = "/data/bulk"
        input-db-name = "input.json"

        [vasp]
        command = "srun vasp_std"
        pp-path = "/opt/vasp/pp"
        nsw-opt = 200
    "#;

    #[test]
    fn file_values_build_a_validated_job() {
        let path = write_config_file("vasp.toml", VASP_JOB);
        let config = load(&path, &[]).unwrap();

        assert_eq!(config.prefix, "bulk");
        assert_eq!(config.calculator, CalculatorKind::Vasp);
        assert_eq!(config.calc_type, CalcType::Opt);
        assert_eq!(config.method.functional.as_deref(), Some("PBE"));
        assert_eq!(config.method.kpoints, Some([4, 4, 2]));
        assert_eq!(config.method.encut, Some(520.0));
        assert!(config.method.lattice_opt);
        assert_eq!(config.paths.db_path, PathBuf::from("/data/bulk"));
        assert_eq!(config.paths.input_name, PathBuf::from("input.json"));
        assert_eq!(config.paths.output_path, None);
        assert_eq!(config.engines.vasp.command, "srun vasp_std");
        assert_eq!(config.engines.vasp.pp_path, Some(PathBuf::from("/opt/vasp/pp")));
        assert_eq!(config.engines.vasp.nsw_opt, 200);
        assert_eq!(config.engines.vasp.potpaw_set, "potpaw_PBE");
    }

    #[test]
    fn cli_flags_override_file_values() {
        let path = write_config_file("override.toml", VASP_JOB);
        let config = load(
            &path,
            &[
                "--calc-type",
                "sp",
                "--prefix",
                "slab",
                "-i",
                "slabs.extxyz",
                "-o",
                "/scratch/runs",
            ],
        )
        .unwrap();

        assert_eq!(config.calc_type, CalcType::Sp);
        assert_eq!(config.prefix, "slab");
        assert_eq!(config.paths.input_name, PathBuf::from("slabs.extxyz"));
        assert_eq!(config.paths.output_path, Some(PathBuf::from("/scratch/runs")));
    }

    #[test]
    fn set_values_override_file_and_flags_win_over_set_values() {
        let path = write_config_file("set.toml", VASP_JOB);
        let config = load(
            &path,
            &[
                "-S",
                "job.kpoints=2x2x1",
                "-S",
                "job.encut=400",
                "-S",
                "job.lattice-opt=no",
                "-S",
                "job.prefix=ignored",
                "-S",
                "gaussian.mem=8GB",
                "--prefix",
                "cli",
            ],
        )
        .unwrap();

        assert_eq!(config.method.kpoints, Some([2, 2, 1]));
        assert_eq!(config.method.encut, Some(400.0));
        assert!(!config.method.lattice_opt);
        assert_eq!(config.prefix, "cli");
        assert_eq!(config.engines.gaussian.mem, "8GB");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let path = write_config_file("unknown.toml", "[job]\ncalculator = \"dftb\"\nsmearing = 0.1\n");
        let err = PartialRunConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, CliError::FileParsing { .. }));

        let path = write_config_file("unknown_set.toml", VASP_JOB);
        let err = load(&path, &["-S", "job.smearing=0.1"]).unwrap_err();
        assert!(err.to_string().contains("Unsupported configuration key"));
    }

    #[test]
    fn missing_required_field_returns_error() {
        let path = write_config_file(
            "missing.toml",
            "[job]\ncalculator = \"dftb\"\ncalc-type = \"sp\"\nparametrization = \"gfn2\"\n",
        );
        let err = load(&path, &[]).unwrap_err();
        assert!(matches!(err, CliError::Config(ref m) if m.contains("db_path")));
    }

    #[test]
    fn invalid_calculator_name_in_file_is_a_config_error() {
        let path = write_config_file(
            "orca.toml",
            "[job]\ncalculator = \"orca\"\ncalc-type = \"sp\"\n[paths]\ndb-path = \".\"\ninput-db-name = \"in.json\"\n",
        );
        let err = load(&path, &[]).unwrap_err();
        assert!(matches!(err, CliError::Config(ref m) if m.contains("orca")));
    }

    #[test]
    fn parametrization_is_uppercased_for_dftb_jobs() {
        let path = write_config_file(
            "dftb.toml",
            "[job]\nprefix = \"dimer\"\ncalculator = \"dftb\"\ncalc-type = \"opt\"\nparametrization = \"gfn2\"\nlattice-opt = false\n[paths]\ndb-path = \"db\"\ninput-db-name = \"dimers.json\"\n[dftb]\ncommand = \"dftb+ > out\"\n",
        );
        let config = load(&path, &[]).unwrap();
        assert_eq!(config.method.parametrization.as_deref(), Some("GFN2"));
        assert_eq!(config.engines.dftb.command, "dftb+ > out");
    }
}
