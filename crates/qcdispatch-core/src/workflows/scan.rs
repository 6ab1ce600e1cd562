use crate::core::database::{Energies, KeyValue, KeyValuePairs, StructureDatabase};
use crate::core::models::structure::{Axis, Structure};
use crate::engine::error::EngineError;
use tracing::{debug, info};

/// Splits a structure into the atoms below `threshold` along `axis` (first
/// fragment) and the atoms at or above it (second fragment).
pub fn separate(
    structure: &Structure,
    axis: Axis,
    threshold: f64,
) -> Result<(Structure, Structure), EngineError> {
    let i = axis.index();
    let (below, above): (Vec<usize>, Vec<usize>) =
        (0..structure.len()).partition(|&k| structure.positions()[k][i] < threshold);
    info!(
        "Separated along {} at {}: {} and {} atoms.",
        axis,
        threshold,
        below.len(),
        above.len()
    );
    if below.is_empty() || above.is_empty() {
        return Err(EngineError::Scan(format!(
            "threshold {} along {} leaves a fragment empty ({} / {} atoms)",
            threshold,
            axis,
            below.len(),
            above.len()
        )));
    }
    Ok((structure.subset(&below)?, structure.subset(&above)?))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanParameters {
    pub axis: Axis,
    /// Step between consecutive points, in Angstroms.
    pub displacement: f64,
    /// Points with the fragments closer than in the input geometry.
    pub num_closer: usize,
    /// Points with the fragments further apart than in the input geometry.
    pub num_away: usize,
}

impl Default for ScanParameters {
    fn default() -> Self {
        Self {
            axis: Axis::X,
            displacement: 0.5,
            num_closer: 0,
            num_away: 6,
        }
    }
}

/// One point of a rigid displacement scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPoint {
    pub structure: Structure,
    /// Shift applied to the first fragment along the scan axis, in Angstroms.
    pub offset: f64,
}

/// Rigidly translates `first` against `second` along the scan axis.
///
/// Point `k` shifts the first fragment by `(num_closer - k) * displacement`,
/// so point `num_closer` reproduces the input geometry and later points move
/// the first fragment towards negative coordinates.
pub fn scan(
    first: &Structure,
    second: &Structure,
    params: &ScanParameters,
) -> Result<Vec<ScanPoint>, EngineError> {
    if !(params.displacement.is_finite() && params.displacement > 0.0) {
        return Err(EngineError::Scan(format!(
            "displacement must be positive, got {}",
            params.displacement
        )));
    }
    info!(
        "Scanning along {} in steps of {} A: {} closer, {} away.",
        params.axis, params.displacement, params.num_closer, params.num_away
    );

    let moving: Vec<usize> = (0..first.len()).collect();
    let mut base = first.clone();
    base.extend(second);

    let total = params.num_closer + params.num_away + 1;
    (0..total)
        .map(|k| -> Result<ScanPoint, EngineError> {
            let offset = (params.num_closer as f64 - k as f64) * params.displacement;
            let mut combined = base.clone();
            combined.translate(&moving, params.axis, offset)?;
            debug!("Point {}: offset {:+.4}", k, offset);
            Ok(ScanPoint {
                structure: combined,
                offset,
            })
        })
        .collect()
}

/// Writes every scan point to `db`, named by its index.
pub fn save_scan(db: &mut StructureDatabase, points: &[ScanPoint]) -> Result<Vec<u64>, EngineError> {
    let mut ids = Vec::with_capacity(points.len());
    for (index, point) in points.iter().enumerate() {
        let mut kv = KeyValuePairs::new();
        kv.insert("name".into(), KeyValue::from(index as u64));
        kv.insert("scan_offset".into(), point.offset.into());
        ids.push(db.write(&point.structure, Energies::default(), kv)?);
    }
    info!("Wrote {} scan points to {}.", ids.len(), db.path().display());
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;
    use tempfile::tempdir;

    fn stacked_dimer() -> Structure {
        Structure::new(
            vec!["C".into(), "H".into(), "C".into(), "H".into()],
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.5, 1.0, 0.0),
                Point3::new(3.5, 0.0, 0.0),
                Point3::new(4.0, 1.0, 0.0),
            ],
        )
    }

    #[test]
    fn fragments_split_at_threshold() {
        let (a, b) = separate(&stacked_dimer(), Axis::X, 1.0).unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(b.positions()[0].x, 3.5);
    }

    #[test]
    fn empty_fragment_is_rejected() {
        let err = separate(&stacked_dimer(), Axis::Y, 5.0).unwrap_err();
        assert!(matches!(err, EngineError::Scan(_)));
    }

    #[test]
    fn points_are_evenly_spaced_around_the_input() {
        let input = stacked_dimer();
        let (a, b) = separate(&input, Axis::X, 1.0).unwrap();
        let params = ScanParameters {
            axis: Axis::X,
            displacement: 0.5,
            num_closer: 2,
            num_away: 3,
        };
        let points = scan(&a, &b, &params).unwrap();
        assert_eq!(points.len(), 6);

        let offsets: Vec<f64> = points.iter().map(|p| p.offset).collect();
        assert_eq!(offsets, vec![1.0, 0.5, 0.0, -0.5, -1.0, -1.5]);
        assert_eq!(points[2].structure, input);
        assert_eq!(points[0].structure.positions()[0].x, 1.0);
        // The second fragment never moves.
        assert_eq!(points[5].structure.positions()[2], input.positions()[2]);
    }

    #[test]
    fn non_positive_displacement_is_rejected() {
        let (a, b) = separate(&stacked_dimer(), Axis::X, 1.0).unwrap();
        let params = ScanParameters {
            displacement: 0.0,
            ..ScanParameters::default()
        };
        assert!(scan(&a, &b, &params).is_err());
    }

    #[test]
    fn saved_points_are_named_by_index() {
        let dir = tempdir().unwrap();
        let mut db = StructureDatabase::connect(dir.path().join("scan.json")).unwrap();
        let (a, b) = separate(&stacked_dimer(), Axis::X, 1.0).unwrap();
        let points = scan(&a, &b, &ScanParameters::default()).unwrap();

        let ids = save_scan(&mut db, &points).unwrap();
        assert_eq!(ids.len(), 7);
        assert_eq!(db.get(ids[3]).unwrap().get("name"), Some(&KeyValue::Int(3)));
        assert_eq!(db.get(ids[0]).unwrap().energy, None);
    }
}
