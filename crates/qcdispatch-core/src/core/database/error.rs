use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("I/O error for database '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed database '{path}': {source}", path = path.display())]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Row {id} in database '{path}' is invalid: {message}", path = path.display())]
    InvalidRow {
        path: PathBuf,
        id: u64,
        message: String,
    },
    #[error("Invalid database selection: {0}")]
    Selection(String),
}
