//! Reading and writing structure file formats.
//!
//! All formats implement the [`traits::StructureFile`] trait. Extended XYZ is
//! the only multi-frame format; the others describe a single structure.

pub mod error;
pub mod extxyz;
pub mod gen_format;
pub mod poscar;
pub mod traits;

use crate::core::models::structure::Structure;
use error::StructureFileError;
use std::path::Path;
use traits::StructureFile;

/// Structure file formats recognised from a file name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructureFormat {
    ExtendedXyz,
    Poscar,
    Gen,
}

impl StructureFormat {
    /// Guesses the format from the file name or extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let file_name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if file_name.starts_with("poscar") || file_name.starts_with("contcar") {
            return Some(Self::Poscar);
        }
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "xyz" | "extxyz" => Some(Self::ExtendedXyz),
            "vasp" | "poscar" => Some(Self::Poscar),
            "gen" => Some(Self::Gen),
            _ => None,
        }
    }
}

/// Reads every frame stored in `path`.
pub fn read_frames(path: &Path) -> Result<Vec<Structure>, StructureFileError> {
    let format = StructureFormat::from_path(path)
        .ok_or_else(|| StructureFileError::UnknownFormat(path.to_path_buf()))?;
    match format {
        StructureFormat::ExtendedXyz => extxyz::ExtendedXyzFile::read_frames_from_path(path),
        StructureFormat::Poscar => Ok(vec![poscar::PoscarFile::read_from_path(path)?]),
        StructureFormat::Gen => Ok(vec![gen_format::GenFile::read_from_path(path)?]),
    }
}

/// Reads the last frame stored in `path`.
pub fn read_last(path: &Path) -> Result<Structure, StructureFileError> {
    read_frames(path)?
        .pop()
        .ok_or_else(|| StructureFileError::Empty(path.to_path_buf()))
}
