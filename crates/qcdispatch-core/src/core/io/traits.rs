use super::error::StructureFileError;
use crate::core::models::structure::Structure;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Defines the interface for reading and writing single-structure file formats.
///
/// Implementors handle format-specific parsing and serialization; the provided
/// methods add path-based convenience wrappers.
pub trait StructureFile {
    /// Reads one structure from a buffered reader.
    ///
    /// # Errors
    ///
    /// Returns an error if parsing fails or the reader fails.
    fn read_from(reader: &mut impl BufRead) -> Result<Structure, StructureFileError>;

    /// Writes one structure to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the structure cannot be represented in the format
    /// or writing fails.
    fn write_to(structure: &Structure, writer: &mut impl Write) -> Result<(), StructureFileError>;

    fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Structure, StructureFileError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader)
    }

    fn write_to_path<P: AsRef<Path>>(
        structure: &Structure,
        path: P,
    ) -> Result<(), StructureFileError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(structure, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}
