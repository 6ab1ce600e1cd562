use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("Invalid value for '{field}': {message}")]
    Invalid {
        field: &'static str,
        message: String,
    },
}

/// The external engine a job is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalculatorKind {
    Dftb,
    Gaussian,
    Vasp,
}

impl CalculatorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            CalculatorKind::Dftb => "dftb",
            CalculatorKind::Gaussian => "gaussian",
            CalculatorKind::Vasp => "vasp",
        }
    }
}

impl FromStr for CalculatorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dftb" | "dftb+" => Ok(CalculatorKind::Dftb),
            "gaussian" => Ok(CalculatorKind::Gaussian),
            "vasp" => Ok(CalculatorKind::Vasp),
            other => Err(ConfigError::Invalid {
                field: "calculator",
                message: format!(
                    "unsupported calculator '{}', expected one of dftb, gaussian, vasp",
                    other
                ),
            }),
        }
    }
}

impl fmt::Display for CalculatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Geometry optimization or single-point energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalcType {
    Opt,
    Sp,
}

impl CalcType {
    pub fn as_str(self) -> &'static str {
        match self {
            CalcType::Opt => "opt",
            CalcType::Sp => "sp",
        }
    }

    pub fn is_optimization(self) -> bool {
        self == CalcType::Opt
    }
}

impl FromStr for CalcType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "opt" => Ok(CalcType::Opt),
            "sp" => Ok(CalcType::Sp),
            other => Err(ConfigError::Invalid {
                field: "calc_type",
                message: format!("unsupported calculation type '{}', expected opt or sp", other),
            }),
        }
    }
}

impl fmt::Display for CalcType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Level-of-theory parameters forwarded to the calculator.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MethodParameters {
    pub functional: Option<String>,
    pub dispersion_correction: Option<String>,
    pub basis_set: Option<String>,
    /// xTB parametrization, stored upper-cased (e.g. `GFN2`).
    pub parametrization: Option<String>,
    pub kpoints: Option<[u32; 3]>,
    /// Plane-wave cutoff in eV.
    pub encut: Option<f64>,
    pub lattice_opt: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathConfig {
    /// Folder holding the input database; output databases are written here too.
    pub db_path: PathBuf,
    /// File name of the input database, trajectory or structure, relative to `db_path`.
    pub input_name: PathBuf,
    /// Root of the per-structure output folders. Falls back to the parent of
    /// `db_path` when it does not exist.
    pub output_path: Option<PathBuf>,
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct DftbSettings {
    pub command: String,
}

impl DftbSettings {
    pub const COMMAND_ENV: &'static str = "ASE_DFTB_COMMAND";

    pub fn from_env() -> Self {
        Self {
            command: env_or(Self::COMMAND_ENV, "dftb+"),
        }
    }
}

impl Default for DftbSettings {
    fn default() -> Self {
        Self {
            command: "dftb+".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GaussianSettings {
    pub command: String,
    pub mem: String,
    pub nprocshared: u32,
    pub scf_max_cycles: u32,
    pub opt_max_cycles: u32,
    pub population: String,
    pub charge: i32,
    pub multiplicity: u32,
}

impl GaussianSettings {
    pub const COMMAND_ENV: &'static str = "ASE_GAUSSIAN_COMMAND";

    pub fn from_env() -> Self {
        Self {
            command: env_or(Self::COMMAND_ENV, "g16"),
            ..Self::default()
        }
    }
}

impl Default for GaussianSettings {
    fn default() -> Self {
        Self {
            command: "g16".to_string(),
            mem: "12GB".to_string(),
            nprocshared: 12,
            scf_max_cycles: 200,
            opt_max_cycles: 500,
            population: "chelpg".to_string(),
            charge: 0,
            multiplicity: 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VaspSettings {
    pub command: String,
    /// Root containing the pseudopotential sets (`VASP_PP_PATH`).
    pub pp_path: Option<PathBuf>,
    /// Pseudopotential set under `pp_path`, e.g. `potpaw_PBE`.
    pub potpaw_set: String,
    pub default_encut: f64,
    pub nsw_opt: u32,
    pub stdout_file: String,
}

impl VaspSettings {
    pub const COMMAND_ENV: &'static str = "ASE_VASP_COMMAND";
    pub const PP_PATH_ENV: &'static str = "VASP_PP_PATH";

    pub fn from_env() -> Self {
        Self {
            command: env_or(Self::COMMAND_ENV, "mpprun vasp_std"),
            pp_path: std::env::var_os(Self::PP_PATH_ENV).map(PathBuf::from),
            ..Self::default()
        }
    }
}

impl Default for VaspSettings {
    fn default() -> Self {
        Self {
            command: "mpprun vasp_std".to_string(),
            pp_path: None,
            potpaw_set: "potpaw_PBE".to_string(),
            default_encut: 550.0,
            nsw_opt: 500,
            stdout_file: "vasp_out".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineSettings {
    pub dftb: DftbSettings,
    pub gaussian: GaussianSettings,
    pub vasp: VaspSettings,
}

impl EngineSettings {
    /// Defaults with commands and pseudopotential paths taken from the environment.
    pub fn from_env() -> Self {
        Self {
            dftb: DftbSettings::from_env(),
            gaussian: GaussianSettings::from_env(),
            vasp: VaspSettings::from_env(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobConfig {
    pub prefix: String,
    pub calculator: CalculatorKind,
    pub calc_type: CalcType,
    pub method: MethodParameters,
    pub paths: PathConfig,
    pub engines: EngineSettings,
}

impl JobConfig {
    /// Checks that the parameters the selected calculator needs are present
    /// and physically meaningful.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let method = &self.method;
        match self.calculator {
            CalculatorKind::Gaussian => {
                if method.functional.is_none() {
                    return Err(ConfigError::MissingParameter("functional"));
                }
                if method.basis_set.is_none() {
                    return Err(ConfigError::MissingParameter("basis_set"));
                }
            }
            CalculatorKind::Dftb => {
                if method.parametrization.is_none() {
                    return Err(ConfigError::MissingParameter("parametrization"));
                }
            }
            CalculatorKind::Vasp => {
                if method.functional.is_none() {
                    return Err(ConfigError::MissingParameter("functional"));
                }
            }
        }

        if let Some(kpoints) = method.kpoints {
            if kpoints.contains(&0) {
                return Err(ConfigError::Invalid {
                    field: "kpoints",
                    message: format!("every k-point component must be >= 1, got {:?}", kpoints),
                });
            }
        }
        if let Some(encut) = method.encut {
            if !(encut.is_finite() && encut > 0.0) {
                return Err(ConfigError::Invalid {
                    field: "encut",
                    message: format!("cutoff must be a positive number of eV, got {}", encut),
                });
            }
        }
        Ok(())
    }

    pub fn kpoints_or_gamma(&self) -> [u32; 3] {
        self.method.kpoints.unwrap_or([1, 1, 1])
    }
}

#[derive(Default)]
pub struct JobConfigBuilder {
    prefix: Option<String>,
    calculator: Option<CalculatorKind>,
    calc_type: Option<CalcType>,
    method: MethodParameters,
    db_path: Option<PathBuf>,
    input_name: Option<PathBuf>,
    output_path: Option<PathBuf>,
    engines: Option<EngineSettings>,
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

impl JobConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
    pub fn calculator(mut self, calculator: CalculatorKind) -> Self {
        self.calculator = Some(calculator);
        self
    }
    pub fn calc_type(mut self, calc_type: CalcType) -> Self {
        self.calc_type = Some(calc_type);
        self
    }
    pub fn functional(mut self, functional: impl Into<String>) -> Self {
        self.method.functional = non_empty(functional.into());
        self
    }
    pub fn dispersion_correction(mut self, correction: impl Into<String>) -> Self {
        self.method.dispersion_correction = non_empty(correction.into());
        self
    }
    pub fn basis_set(mut self, basis_set: impl Into<String>) -> Self {
        self.method.basis_set = non_empty(basis_set.into());
        self
    }
    pub fn parametrization(mut self, parametrization: impl Into<String>) -> Self {
        self.method.parametrization = non_empty(parametrization.into()).map(|p| p.to_uppercase());
        self
    }
    pub fn kpoints(mut self, kpoints: [u32; 3]) -> Self {
        self.method.kpoints = Some(kpoints);
        self
    }
    pub fn encut(mut self, encut: f64) -> Self {
        self.method.encut = Some(encut);
        self
    }
    pub fn lattice_opt(mut self, lattice_opt: bool) -> Self {
        self.method.lattice_opt = lattice_opt;
        self
    }
    pub fn db_path(mut self, path: PathBuf) -> Self {
        self.db_path = Some(path);
        self
    }
    pub fn input_name(mut self, name: PathBuf) -> Self {
        self.input_name = Some(name);
        self
    }
    pub fn output_path(mut self, path: PathBuf) -> Self {
        self.output_path = Some(path);
        self
    }
    pub fn engines(mut self, engines: EngineSettings) -> Self {
        self.engines = Some(engines);
        self
    }

    pub fn build(self) -> Result<JobConfig, ConfigError> {
        let config = JobConfig {
            prefix: self.prefix.unwrap_or_default(),
            calculator: self
                .calculator
                .ok_or(ConfigError::MissingParameter("calculator"))?,
            calc_type: self
                .calc_type
                .ok_or(ConfigError::MissingParameter("calc_type"))?,
            method: self.method,
            paths: PathConfig {
                db_path: self.db_path.ok_or(ConfigError::MissingParameter("db_path"))?,
                input_name: self
                    .input_name
                    .ok_or(ConfigError::MissingParameter("input_db_name"))?,
                output_path: self.output_path,
            },
            engines: self.engines.unwrap_or_else(EngineSettings::from_env),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> JobConfigBuilder {
        JobConfigBuilder::new()
            .prefix("dimer")
            .calc_type(CalcType::Opt)
            .db_path(PathBuf::from("/data/db"))
            .input_name(PathBuf::from("input.json"))
            .engines(EngineSettings::default())
    }

    #[test]
    fn calculator_and_calc_type_parse_case_insensitively() {
        assert_eq!("DFTB".parse::<CalculatorKind>().unwrap(), CalculatorKind::Dftb);
        assert_eq!("Gaussian".parse::<CalculatorKind>().unwrap().to_string(), "gaussian");
        assert_eq!("SP".parse::<CalcType>().unwrap(), CalcType::Sp);
        assert!(matches!(
            "orca".parse::<CalculatorKind>(),
            Err(ConfigError::Invalid { field: "calculator", .. })
        ));
    }

    #[test]
    fn dftb_requires_parametrization_and_uppercases_it() {
        let err = base().calculator(CalculatorKind::Dftb).build().unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("parametrization"));

        let config = base()
            .calculator(CalculatorKind::Dftb)
            .parametrization("gfn2")
            .build()
            .unwrap();
        assert_eq!(config.method.parametrization.as_deref(), Some("GFN2"));
    }

    #[test]
    fn gaussian_requires_functional_and_basis_set() {
        let err = base()
            .calculator(CalculatorKind::Gaussian)
            .functional("B3LYP")
            .build()
            .unwrap_err();
        assert_eq!(err, ConfigError::MissingParameter("basis_set"));
    }

    #[test]
    fn vasp_defaults_to_gamma_point_and_rejects_bad_values() {
        let config = base()
            .calculator(CalculatorKind::Vasp)
            .functional("PBE")
            .build()
            .unwrap();
        assert_eq!(config.kpoints_or_gamma(), [1, 1, 1]);

        let err = base()
            .calculator(CalculatorKind::Vasp)
            .functional("PBE")
            .kpoints([4, 0, 4])
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "kpoints", .. }));

        let err = base()
            .calculator(CalculatorKind::Vasp)
            .functional("PBE")
            .encut(-10.0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "encut", .. }));
    }

    #[test]
    fn blank_method_parameters_are_treated_as_absent() {
        let config = base()
            .calculator(CalculatorKind::Dftb)
            .parametrization("GFN1")
            .functional("  ")
            .build()
            .unwrap();
        assert_eq!(config.method.functional, None);
    }

    #[test]
    fn default_engine_settings_match_cluster_setup() {
        let settings = EngineSettings::default();
        assert_eq!(settings.dftb.command, "dftb+");
        assert_eq!(settings.gaussian.mem, "12GB");
        assert_eq!(settings.gaussian.nprocshared, 12);
        assert_eq!(settings.vasp.command, "mpprun vasp_std");
        assert_eq!(settings.vasp.default_encut, 550.0);
    }
}
