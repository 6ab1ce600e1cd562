use crate::core::models::structure::Structure;
use chrono::{DateTime, Utc};
use nalgebra::{Matrix3, Point3};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A metadata value attached to a row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl KeyValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            KeyValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            KeyValue::Text(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Bool(v) => write!(f, "{}", v),
            KeyValue::Int(v) => write!(f, "{}", v),
            KeyValue::Float(v) => write!(f, "{}", v),
            KeyValue::Text(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for KeyValue {
    fn from(v: bool) -> Self {
        KeyValue::Bool(v)
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        KeyValue::Int(v)
    }
}

impl From<u64> for KeyValue {
    /// Values beyond `i64::MAX` are kept exactly as text.
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(KeyValue::Int)
            .unwrap_or_else(|_| KeyValue::Text(v.to_string()))
    }
}

impl From<f64> for KeyValue {
    fn from(v: f64) -> Self {
        KeyValue::Float(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        KeyValue::Text(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        KeyValue::Text(v)
    }
}

pub type KeyValuePairs = BTreeMap<String, KeyValue>;

/// One stored structure with its energies and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: u64,
    pub ctime: DateTime<Utc>,
    pub symbols: Vec<String>,
    pub positions: Vec<[f64; 3]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<[[f64; 3]; 3]>,
    #[serde(default)]
    pub pbc: [bool; 3],
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free_energy: Option<f64>,
    #[serde(default)]
    pub key_value_pairs: KeyValuePairs,
}

impl Row {
    pub(crate) fn from_structure(
        id: u64,
        structure: &Structure,
        energy: Option<f64>,
        free_energy: Option<f64>,
        key_value_pairs: KeyValuePairs,
    ) -> Self {
        let cell = structure.cell().map(|c| {
            [
                [c[(0, 0)], c[(0, 1)], c[(0, 2)]],
                [c[(1, 0)], c[(1, 1)], c[(1, 2)]],
                [c[(2, 0)], c[(2, 1)], c[(2, 2)]],
            ]
        });
        Self {
            id,
            ctime: Utc::now(),
            symbols: structure.symbols().to_vec(),
            positions: structure.positions().iter().map(|p| [p.x, p.y, p.z]).collect(),
            cell,
            pbc: structure.pbc(),
            energy,
            free_energy,
            key_value_pairs,
        }
    }

    pub fn to_structure(&self) -> Structure {
        let positions = self
            .positions
            .iter()
            .map(|p| Point3::new(p[0], p[1], p[2]))
            .collect();
        let structure = Structure::new(self.symbols.clone(), positions);
        match self.cell {
            Some(rows) => {
                let cell = Matrix3::from_row_slice(&rows.concat());
                structure.with_cell(cell, self.pbc)
            }
            None => structure,
        }
    }

    pub fn get(&self, key: &str) -> Option<&KeyValue> {
        self.key_value_pairs.get(key)
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name").and_then(KeyValue::as_text)
    }

    /// The key linking this row back to the structure it was derived from:
    /// an inherited integer `foreignkey` if present, otherwise the row id.
    pub fn foreign_key(&self) -> i64 {
        self.get("foreignkey")
            .and_then(KeyValue::as_int)
            .unwrap_or(self.id as i64)
    }
}
