use super::error::DatabaseError;
use super::row::{KeyValuePairs, Row};
use crate::core::models::structure::Structure;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Document {
    next_id: u64,
    rows: Vec<Row>,
}

/// Energies (eV) to store alongside a structure.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Energies {
    pub energy: Option<f64>,
    pub free_energy: Option<f64>,
}

/// A structure database stored as one JSON document.
#[derive(Debug)]
pub struct StructureDatabase {
    path: PathBuf,
    document: Document,
}

impl StructureDatabase {
    /// Opens the database at `path`, or starts an empty one if the file does
    /// not exist yet. The file is created on the first write.
    pub fn connect(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref().to_path_buf();
        let document = if path.exists() {
            let content = fs::read_to_string(&path).map_err(|source| DatabaseError::Io {
                path: path.clone(),
                source,
            })?;
            if content.trim().is_empty() {
                Document::default()
            } else {
                serde_json::from_str(&content).map_err(|source| DatabaseError::Format {
                    path: path.clone(),
                    source,
                })?
            }
        } else {
            Document::default()
        };

        let db = Self { path, document };
        db.validate()?;
        debug!(
            "Connected to database {:?} ({} rows).",
            db.path,
            db.document.rows.len()
        );
        Ok(db)
    }

    fn validate(&self) -> Result<(), DatabaseError> {
        for row in &self.document.rows {
            if row.symbols.len() != row.positions.len() {
                return Err(DatabaseError::InvalidRow {
                    path: self.path.clone(),
                    id: row.id,
                    message: format!(
                        "{} symbols but {} positions",
                        row.symbols.len(),
                        row.positions.len()
                    ),
                });
            }
            if row.id == 0 || row.id >= self.next_id() {
                return Err(DatabaseError::InvalidRow {
                    path: self.path.clone(),
                    id: row.id,
                    message: "row id outside the allocated id range".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.document.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.document.rows.is_empty()
    }

    /// All rows in insertion order.
    pub fn select(&self) -> &[Row] {
        &self.document.rows
    }

    pub fn get(&self, id: u64) -> Option<&Row> {
        self.document.rows.iter().find(|r| r.id == id)
    }

    fn next_id(&self) -> u64 {
        self.document.next_id.max(1)
    }

    /// Appends a row and persists the database. Returns the new row id.
    pub fn write(
        &mut self,
        structure: &Structure,
        energies: Energies,
        key_value_pairs: KeyValuePairs,
    ) -> Result<u64, DatabaseError> {
        let id = self.next_id();
        let row = Row::from_structure(
            id,
            structure,
            energies.energy,
            energies.free_energy,
            key_value_pairs,
        );
        self.document.rows.push(row);
        self.document.next_id = id + 1;

        if let Err(e) = self.flush() {
            self.document.rows.pop();
            self.document.next_id = id;
            return Err(e);
        }
        Ok(id)
    }

    /// Writes the document to a temporary sibling file and renames it into place.
    fn flush(&self) -> Result<(), DatabaseError> {
        let io_err = |source| DatabaseError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let content =
            serde_json::to_string_pretty(&self.document).map_err(|source| DatabaseError::Format {
                path: self.path.clone(),
                source,
            })?;

        let mut tmp_name = self.path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp_path = self.path.with_file_name(tmp_name);
        fs::write(&tmp_path, content).map_err(io_err)?;
        fs::rename(&tmp_path, &self.path).map_err(io_err)?;
        Ok(())
    }
}
