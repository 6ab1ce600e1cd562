use crate::core::database::StructureDatabase;
use crate::engine::error::EngineError;
use std::io::Write;
use std::path::Path;
use tracing::{info, warn};

/// Energies of the rows carrying one, in row order, relative to their minimum (eV).
pub fn relative_energies(db: &StructureDatabase) -> Vec<f64> {
    let energies: Vec<f64> = db.select().iter().filter_map(|row| row.energy).collect();
    let skipped = db.len() - energies.len();
    if skipped > 0 {
        warn!(
            "{} row(s) in {} have no energy and were skipped.",
            skipped,
            db.path().display()
        );
    }
    shift_to_minimum(&energies)
}

fn shift_to_minimum(energies: &[f64]) -> Vec<f64> {
    let minimum = energies.iter().copied().fold(f64::INFINITY, f64::min);
    energies.iter().map(|e| e - minimum).collect()
}

/// One labelled series of relative energies.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergySeries {
    pub label: String,
    pub values: Vec<f64>,
}

/// Relative energies of several databases, aligned by row index.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EnergyTable {
    series: Vec<EnergySeries>,
}

impl EnergyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the database at `path`, labelled with `label` or the file stem.
    pub fn add_database(&mut self, path: &Path, label: Option<&str>) -> Result<(), EngineError> {
        let db = StructureDatabase::connect(path)?;
        let label = match label {
            Some(l) => l.to_string(),
            None => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
        };
        let values = relative_energies(&db);
        info!("{}: {} relative energies.", label, values.len());
        self.series.push(EnergySeries { label, values });
        Ok(())
    }

    pub fn push(&mut self, series: EnergySeries) {
        self.series.push(series);
    }

    pub fn series(&self) -> &[EnergySeries] {
        &self.series
    }

    /// Number of rows needed to hold the longest series.
    pub fn rows(&self) -> usize {
        self.series.iter().map(|s| s.values.len()).max().unwrap_or(0)
    }

    /// Writes `index,<label>...` rows; shorter series leave empty cells.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), csv::Error> {
        let mut csv = csv::Writer::from_writer(writer);
        let mut header = vec!["index".to_string()];
        header.extend(self.series.iter().map(|s| s.label.clone()));
        csv.write_record(&header)?;

        for row in 0..self.rows() {
            let mut record = vec![row.to_string()];
            record.extend(self.series.iter().map(|s| {
                s.values
                    .get(row)
                    .map(|v| format!("{:.6}", v))
                    .unwrap_or_default()
            }));
            csv.write_record(&record)?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn write_csv_to_path(&self, path: &Path) -> Result<(), EngineError> {
        let to_err = |source| EngineError::Csv {
            path: path.to_path_buf(),
            source,
        };
        let file = std::fs::File::create(path).map_err(|e| to_err(csv::Error::from(e)))?;
        self.write_csv(file).map_err(to_err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::database::{Energies, KeyValuePairs};
    use crate::core::models::structure::Structure;
    use nalgebra::Point3;
    use tempfile::tempdir;

    fn atom() -> Structure {
        Structure::new(vec!["He".into()], vec![Point3::origin()])
    }

    fn database(path: &Path, energies: &[Option<f64>]) {
        let mut db = StructureDatabase::connect(path).unwrap();
        for &energy in energies {
            db.write(
                &atom(),
                Energies {
                    energy,
                    free_energy: None,
                },
                KeyValuePairs::new(),
            )
            .unwrap();
        }
    }

    #[test]
    fn energies_are_shifted_by_true_minimum() {
        // All energies positive: the minimum is 2.0, not 0.
        assert_eq!(shift_to_minimum(&[3.0, 2.0, 4.5]), vec![1.0, 0.0, 2.5]);
        assert_eq!(shift_to_minimum(&[-10.0, -12.0]), vec![2.0, 0.0]);
        assert!(shift_to_minimum(&[]).is_empty());
    }

    #[test]
    fn rows_without_energy_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.json");
        database(&path, &[Some(-5.0), None, Some(-6.0)]);
        let db = StructureDatabase::connect(&path).unwrap();
        assert_eq!(relative_energies(&db), vec![1.0, 0.0]);
    }

    #[test]
    fn csv_aligns_series_by_index() {
        let dir = tempdir().unwrap();
        let gfn1 = dir.path().join("scan_dftb_GFN1_sp.json");
        let gfn2 = dir.path().join("scan_dftb_GFN2_sp.json");
        database(&gfn1, &[Some(-1.0), Some(-1.5), Some(-1.25)]);
        database(&gfn2, &[Some(-2.0), Some(-2.5)]);

        let mut table = EnergyTable::new();
        table.add_database(&gfn1, None).unwrap();
        table.add_database(&gfn2, Some("GFN2")).unwrap();
        assert_eq!(table.rows(), 3);

        let mut buffer = Vec::new();
        table.write_csv(&mut buffer).unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert_eq!(
            text,
            "index,scan_dftb_GFN1_sp,GFN2\n\
             0,0.500000,0.500000\n\
             1,0.000000,0.000000\n\
             2,0.250000,\n"
        );
    }
}
