use super::calculators::CalculatorError;
use super::config::ConfigError;
use crate::core::database::DatabaseError;
use crate::core::io::error::StructureFileError;
use crate::core::models::structure::StructureError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid job configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Failed to read structures: {0}")]
    StructureFile(#[from] StructureFileError),

    #[error("Invalid structure: {0}")]
    Structure(#[from] StructureError),

    #[error("Calculator setup failed: {0}")]
    Calculator(#[from] CalculatorError),

    #[error("I/O error for '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported input '{path}': {message}", path = path.display())]
    UnsupportedInput { path: PathBuf, message: String },

    #[error("Invalid scan: {0}")]
    Scan(String),

    #[error("Failed to write CSV '{path}': {source}", path = path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
