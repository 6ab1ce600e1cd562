//! Calculator dispatch for the external quantum-chemistry engines.
//!
//! Every engine implements [`Calculator`]: write the input files into a
//! working directory, run the program there, then parse energies and the
//! final geometry back. The process working directory is never changed.

pub mod dftb;
pub mod gaussian;
pub mod vasp;

use super::command::CommandError;
use super::config::{CalculatorKind, JobConfig};
use crate::core::io::error::StructureFileError;
use crate::core::models::structure::Structure;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HARTREE_TO_EV: f64 = 27.211386245988;

#[derive(Debug, Error)]
pub enum CalculatorError {
    #[error("I/O error for '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("External program failed: {0}")]
    Command(#[from] CommandError),
    #[error("Structure file error: {0}")]
    StructureFile(#[from] StructureFileError),
    #[error("Failed to parse '{path}': {message}", path = path.display())]
    Parse { path: PathBuf, message: String },
    #[error("Unsupported input: {0}")]
    Unsupported(String),
    #[error("No pseudopotential for '{element}' at '{path}'", path = path.display())]
    MissingPseudopotential { element: String, path: PathBuf },
}

impl CalculatorError {
    pub(crate) fn parse(path: &Path, message: impl Into<String>) -> Self {
        Self::Parse {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Final geometry and energies of one calculation. Energies are in eV.
#[derive(Debug, Clone, PartialEq)]
pub struct CalculationResult {
    pub structure: Structure,
    pub energy: f64,
    pub free_energy: Option<f64>,
}

pub trait Calculator {
    fn kind(&self) -> CalculatorKind;

    /// Writes every input file the engine needs into `workdir`.
    fn write_input(
        &self,
        structure: &Structure,
        label: &str,
        workdir: &Path,
    ) -> Result<(), CalculatorError>;

    /// Runs the engine in `workdir` and waits for it to finish.
    fn execute(&self, label: &str, workdir: &Path) -> Result<(), CalculatorError>;

    /// Parses the engine output in `workdir`. `structure` is the input
    /// geometry, used where the engine does not write a final one.
    fn read_results(
        &self,
        structure: &Structure,
        label: &str,
        workdir: &Path,
    ) -> Result<CalculationResult, CalculatorError>;

    fn calculate(
        &self,
        structure: &Structure,
        label: &str,
        workdir: &Path,
    ) -> Result<CalculationResult, CalculatorError> {
        self.write_input(structure, label, workdir)?;
        self.execute(label, workdir)?;
        self.read_results(structure, label, workdir)
    }
}

/// Builds the calculator selected by the job, forwarding the method parameters
/// it understands.
pub fn build_calculator(config: &JobConfig) -> Result<Box<dyn Calculator>, CalculatorError> {
    Ok(match config.calculator {
        CalculatorKind::Dftb => Box::new(dftb::DftbCalculator::from_config(config)?),
        CalculatorKind::Gaussian => Box::new(gaussian::GaussianCalculator::from_config(config)?),
        CalculatorKind::Vasp => Box::new(vasp::VaspCalculator::from_config(config)?),
    })
}

pub(crate) fn write_file(path: &Path, content: &str) -> Result<(), CalculatorError> {
    fs::write(path, content).map_err(|source| CalculatorError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn read_file(path: &Path) -> Result<String, CalculatorError> {
    fs::read_to_string(path).map_err(|source| CalculatorError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn required<'a>(
    value: &'a Option<String>,
    name: &str,
) -> Result<&'a str, CalculatorError> {
    value
        .as_deref()
        .ok_or_else(|| CalculatorError::Unsupported(format!("missing {}", name)))
}
