use super::element;
use nalgebra::{Matrix3, Point3, Vector3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum StructureError {
    #[error("Unknown element symbol '{0}'")]
    UnknownElement(String),
    #[error("Atom index {index} is out of range for a structure with {len} atoms")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("Structure has no unit cell")]
    MissingCell,
    #[error("Unit cell is singular and cannot be inverted")]
    SingularCell,
}

/// Cartesian axis used for translations, scans and fragment separation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

impl std::str::FromStr for Axis {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "x" => Ok(Axis::X),
            "y" => Ok(Axis::Y),
            "z" => Ok(Axis::Z),
            other => Err(format!("Invalid axis '{}'. Expected one of x, y, z.", other)),
        }
    }
}

impl std::fmt::Display for Axis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Axis::X => "x",
            Axis::Y => "y",
            Axis::Z => "z",
        };
        write!(f, "{}", name)
    }
}

/// An atomic structure: a molecule or a periodic crystal.
///
/// Positions are Cartesian and in Angstroms. When present, the rows of `cell`
/// are the three lattice vectors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Structure {
    symbols: Vec<String>,
    positions: Vec<Point3<f64>>,
    cell: Option<Matrix3<f64>>,
    pbc: [bool; 3],
}

impl Structure {
    /// Creates a non-periodic structure.
    ///
    /// # Panics
    ///
    /// Panics if `symbols` and `positions` differ in length.
    pub fn new(symbols: Vec<String>, positions: Vec<Point3<f64>>) -> Self {
        assert_eq!(
            symbols.len(),
            positions.len(),
            "every atom needs exactly one symbol and one position"
        );
        Self {
            symbols,
            positions,
            cell: None,
            pbc: [false; 3],
        }
    }

    pub fn with_cell(mut self, cell: Matrix3<f64>, pbc: [bool; 3]) -> Self {
        self.cell = Some(cell);
        self.pbc = pbc;
        self
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn positions(&self) -> &[Point3<f64>] {
        &self.positions
    }

    pub fn positions_mut(&mut self) -> &mut [Point3<f64>] {
        &mut self.positions
    }

    pub fn cell(&self) -> Option<&Matrix3<f64>> {
        self.cell.as_ref()
    }

    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    pub fn is_periodic(&self) -> bool {
        self.cell.is_some() && self.pbc.iter().any(|&p| p)
    }

    pub fn atomic_numbers(&self) -> Result<Vec<u8>, StructureError> {
        self.symbols
            .iter()
            .map(|s| element::atomic_number(s).ok_or_else(|| StructureError::UnknownElement(s.clone())))
            .collect()
    }

    /// Distinct element symbols in order of first appearance.
    pub fn species(&self) -> Vec<&str> {
        let mut species: Vec<&str> = Vec::new();
        for symbol in &self.symbols {
            if !species.contains(&symbol.as_str()) {
                species.push(symbol);
            }
        }
        species
    }

    /// Builds a new structure from the atoms at `indices`, keeping the cell.
    pub fn subset(&self, indices: &[usize]) -> Result<Self, StructureError> {
        let mut symbols = Vec::with_capacity(indices.len());
        let mut positions = Vec::with_capacity(indices.len());
        for &index in indices {
            if index >= self.len() {
                return Err(StructureError::IndexOutOfRange {
                    index,
                    len: self.len(),
                });
            }
            symbols.push(self.symbols[index].clone());
            positions.push(self.positions[index]);
        }
        Ok(Self {
            symbols,
            positions,
            cell: self.cell,
            pbc: self.pbc,
        })
    }

    /// Appends the atoms of `other`. The cell of `self` is kept.
    pub fn extend(&mut self, other: &Structure) {
        self.symbols.extend(other.symbols.iter().cloned());
        self.positions.extend(other.positions.iter().copied());
    }

    /// Rigidly shifts the atoms at `indices` along `axis` by `distance`
    /// Angstroms. Nothing moves if any index is out of range.
    pub fn translate(
        &mut self,
        indices: &[usize],
        axis: Axis,
        distance: f64,
    ) -> Result<(), StructureError> {
        if let Some(&index) = indices.iter().find(|&&index| index >= self.len()) {
            return Err(StructureError::IndexOutOfRange {
                index,
                len: self.len(),
            });
        }
        let i = axis.index();
        for &index in indices {
            self.positions[index][i] += distance;
        }
        Ok(())
    }

    /// Returns a copy whose atoms are reordered so that `new[i] = old[order[i]]`.
    pub fn permuted(&self, order: &[usize]) -> Result<Self, StructureError> {
        self.subset(order)
    }

    pub fn fractional_positions(&self) -> Result<Vec<Vector3<f64>>, StructureError> {
        let cell = self.cell.ok_or(StructureError::MissingCell)?;
        // Cartesian r = f * cell (row vector convention), so f = r * cell^-1.
        let inverse = cell.try_inverse().ok_or(StructureError::SingularCell)?;
        Ok(self
            .positions
            .iter()
            .map(|p| (p.coords.transpose() * inverse).transpose())
            .collect())
    }
}

/// Converts fractional coordinates to Cartesian ones for the given cell.
pub fn fractional_to_cartesian(cell: &Matrix3<f64>, fractional: &Vector3<f64>) -> Point3<f64> {
    Point3::from((fractional.transpose() * cell).transpose())
}
