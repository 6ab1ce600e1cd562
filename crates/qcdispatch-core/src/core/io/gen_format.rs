use super::error::StructureFileError;
use super::traits::StructureFile;
use crate::core::models::element::normalize_symbol;
use crate::core::models::structure::{Structure, fractional_to_cartesian};
use nalgebra::{Matrix3, Point3, Vector3};
use std::io::{BufRead, Write};

/// DFTB+ gen geometry files (`C` cluster, `S` supercell, `F` fractional supercell).
pub struct GenFile;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenKind {
    Cluster,
    Supercell,
    Fractional,
}

impl StructureFile for GenFile {
    fn read_from(reader: &mut impl BufRead) -> Result<Structure, StructureFileError> {
        let mut lines = reader
            .lines()
            .enumerate()
            .map(|(i, l)| (i + 1, l))
            .filter(|(_, l)| match l {
                Ok(text) => {
                    let t = text.trim();
                    !t.is_empty() && !t.starts_with('#')
                }
                Err(_) => true,
            });
        let mut next = |what: &'static str| -> Result<(usize, String), StructureFileError> {
            match lines.next() {
                Some((n, line)) => Ok((n, line?)),
                None => Err(StructureFileError::UnexpectedEof(what)),
            }
        };

        let (header_num, header) = next("gen header")?;
        let mut parts = header.split_whitespace();
        let natoms: usize = parts
            .next()
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| StructureFileError::parse(header_num, "missing atom count"))?;
        let kind = match parts.next().map(|k| k.to_ascii_uppercase()) {
            Some(k) if k == "C" => GenKind::Cluster,
            Some(k) if k == "S" => GenKind::Supercell,
            Some(k) if k == "F" => GenKind::Fractional,
            other => {
                return Err(StructureFileError::parse(
                    header_num,
                    format!("unknown geometry type {:?}", other),
                ));
            }
        };

        let (species_num, species_line) = next("gen species")?;
        let species: Vec<&'static str> = species_line
            .split_whitespace()
            .map(|s| {
                normalize_symbol(s).ok_or_else(|| StructureFileError::UnknownElement {
                    line: species_num,
                    symbol: s.to_string(),
                })
            })
            .collect::<Result<_, _>>()?;

        let mut symbols = Vec::with_capacity(natoms);
        let mut raw_positions = Vec::with_capacity(natoms);
        for _ in 0..natoms {
            let (n, line) = next("gen atom lines")?;
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 5 {
                return Err(StructureFileError::parse(
                    n,
                    "atom line needs index, species and three coordinates",
                ));
            }
            let species_index: usize = parts[1]
                .parse()
                .map_err(|_| StructureFileError::parse(n, "invalid species index"))?;
            let symbol = species_index
                .checked_sub(1)
                .and_then(|i| species.get(i))
                .ok_or_else(|| {
                    StructureFileError::parse(n, format!("species index {} out of range", species_index))
                })?;
            let mut xyz = [0.0; 3];
            for (k, v) in parts[2..5].iter().enumerate() {
                xyz[k] = v
                    .parse()
                    .map_err(|_| StructureFileError::parse(n, format!("invalid coordinate '{}'", v)))?;
            }
            symbols.push(symbol.to_string());
            raw_positions.push(Vector3::new(xyz[0], xyz[1], xyz[2]));
        }

        if kind == GenKind::Cluster {
            let positions = raw_positions.into_iter().map(Point3::from).collect();
            return Ok(Structure::new(symbols, positions));
        }

        let mut rows = Vec::with_capacity(12);
        for _ in 0..4 {
            let (n, line) = next("gen lattice vectors")?;
            for v in line.split_whitespace().take(3) {
                rows.push(
                    v.parse::<f64>()
                        .map_err(|_| StructureFileError::parse(n, format!("invalid number '{}'", v)))?,
                );
            }
        }
        if rows.len() != 12 {
            return Err(StructureFileError::UnexpectedEof("gen lattice vectors"));
        }
        // First row is the origin, which only shifts the cell.
        let cell = Matrix3::from_row_slice(&rows[3..]);
        let positions = raw_positions
            .into_iter()
            .map(|v| match kind {
                GenKind::Fractional => fractional_to_cartesian(&cell, &v),
                _ => Point3::from(v),
            })
            .collect();
        Ok(Structure::new(symbols, positions).with_cell(cell, [true; 3]))
    }

    fn write_to(structure: &Structure, writer: &mut impl Write) -> Result<(), StructureFileError> {
        let periodic = structure.is_periodic();
        let species = structure.species();

        writeln!(
            writer,
            "{} {}",
            structure.len(),
            if periodic { "S" } else { "C" }
        )?;
        writeln!(writer, "{}", species.join(" "))?;
        for (i, (symbol, p)) in structure
            .symbols()
            .iter()
            .zip(structure.positions())
            .enumerate()
        {
            let species_index = species
                .iter()
                .position(|s| *s == symbol.as_str())
                .map(|k| k + 1)
                .unwrap_or(1);
            writeln!(
                writer,
                "{:>5} {:>3} {:>20.12} {:>20.12} {:>20.12}",
                i + 1,
                species_index,
                p.x,
                p.y,
                p.z
            )?;
        }
        if periodic {
            if let Some(cell) = structure.cell() {
                writeln!(writer, "{:>20.12} {:>20.12} {:>20.12}", 0.0, 0.0, 0.0)?;
                for r in 0..3 {
                    writeln!(
                        writer,
                        "{:>20.12} {:>20.12} {:>20.12}",
                        cell[(r, 0)],
                        cell[(r, 1)],
                        cell[(r, 2)]
                    )?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn reads_cluster_geometry() {
        let text = "# water\n3 C\nO H\n1 1 0.0 0.0 0.0\n2 2 0.96 0.0 0.0\n3 2 -0.24 0.93 0.0\n";
        let s = GenFile::read_from(&mut Cursor::new(text)).unwrap();
        assert_eq!(s.symbols(), &["O".to_string(), "H".to_string(), "H".to_string()]);
        assert!(s.cell().is_none());
        assert_eq!(s.positions()[2], Point3::new(-0.24, 0.93, 0.0));
    }

    #[test]
    fn reads_fractional_supercell() {
        let text = "\
2 F
Si
1 1 0.0 0.0 0.0
2 1 0.25 0.25 0.25
0.0 0.0 0.0
4.0 0.0 0.0
0.0 4.0 0.0
0.0 0.0 4.0
";
        let s = GenFile::read_from(&mut Cursor::new(text)).unwrap();
        assert!(s.is_periodic());
        assert_eq!(s.positions()[1], Point3::new(1.0, 1.0, 1.0));
    }

    #[test]
    fn periodic_structures_round_trip_as_supercells() {
        let s = Structure::new(
            vec!["Ga".into(), "As".into()],
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.4, 1.4, 1.4)],
        )
        .with_cell(Matrix3::identity() * 5.65, [true; 3]);

        let mut buffer = Vec::new();
        GenFile::write_to(&s, &mut buffer).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with("2 S\nGa As\n"));

        let reread = GenFile::read_from(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(reread, s);
    }

    #[test]
    fn species_index_out_of_range_is_rejected() {
        let text = "1 C\nH\n1 2 0 0 0\n";
        let err = GenFile::read_from(&mut Cursor::new(text)).unwrap_err();
        assert!(matches!(err, StructureFileError::Parse { line: 3, .. }));
    }
}
