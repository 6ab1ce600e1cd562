use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StructureFileError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Unexpected end of file while reading {0}")]
    UnexpectedEof(&'static str),
    #[error("Unknown element symbol '{symbol}' on line {line}")]
    UnknownElement { line: usize, symbol: String },
    #[error("Cannot write structure: {0}")]
    Unsupported(String),
    #[error("Unrecognised structure file format: {0}")]
    UnknownFormat(PathBuf),
    #[error("No structures found in {0}")]
    Empty(PathBuf),
}

impl StructureFileError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }
}
