use super::error::StructureFileError;
use super::traits::StructureFile;
use crate::core::models::element::normalize_symbol;
use crate::core::models::structure::{Structure, fractional_to_cartesian};
use nalgebra::{Matrix3, Point3, Vector3};
use std::io::{BufRead, Write};

/// VASP 5 POSCAR / CONTCAR files.
///
/// VASP expects atoms grouped by species, so writing may reorder atoms; use
/// [`PoscarFile::write_grouped`] to get the permutation back.
pub struct PoscarFile;

impl PoscarFile {
    /// Atom order used when writing: `written[i] = structure[order[i]]`.
    pub fn species_order(structure: &Structure) -> Vec<usize> {
        let mut order = Vec::with_capacity(structure.len());
        for species in structure.species() {
            order.extend(
                structure
                    .symbols()
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.as_str() == species)
                    .map(|(i, _)| i),
            );
        }
        order
    }

    /// Writes the structure grouped by species and returns the permutation used.
    pub fn write_grouped(
        structure: &Structure,
        comment: &str,
        writer: &mut impl Write,
    ) -> Result<Vec<usize>, StructureFileError> {
        let cell = structure.cell().ok_or_else(|| {
            StructureFileError::Unsupported("POSCAR requires a unit cell".to_string())
        })?;
        let order = Self::species_order(structure);
        let species = structure.species();

        writeln!(writer, "{}", comment)?;
        writeln!(writer, "  1.0")?;
        for r in 0..3 {
            writeln!(
                writer,
                "  {:>20.12} {:>20.12} {:>20.12}",
                cell[(r, 0)],
                cell[(r, 1)],
                cell[(r, 2)]
            )?;
        }
        writeln!(writer, "  {}", species.join("  "))?;
        let counts: Vec<String> = species
            .iter()
            .map(|sp| {
                structure
                    .symbols()
                    .iter()
                    .filter(|s| s.as_str() == *sp)
                    .count()
                    .to_string()
            })
            .collect();
        writeln!(writer, "  {}", counts.join("  "))?;
        writeln!(writer, "Cartesian")?;
        for &i in &order {
            let p = structure.positions()[i];
            writeln!(writer, "  {:>20.12} {:>20.12} {:>20.12}", p.x, p.y, p.z)?;
        }
        Ok(order)
    }
}

fn next_line(
    lines: &mut impl Iterator<Item = (usize, std::io::Result<String>)>,
    what: &'static str,
) -> Result<(usize, String), StructureFileError> {
    match lines.next() {
        Some((n, line)) => Ok((n, line?)),
        None => Err(StructureFileError::UnexpectedEof(what)),
    }
}

fn parse_floats(line: &str, line_num: usize, count: usize) -> Result<Vec<f64>, StructureFileError> {
    let values: Vec<f64> = line
        .split_whitespace()
        .take(count)
        .map(|v| v.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| StructureFileError::parse(line_num, format!("invalid number in '{}'", line.trim())))?;
    if values.len() != count {
        return Err(StructureFileError::parse(
            line_num,
            format!("expected {} numbers, found {}", count, values.len()),
        ));
    }
    Ok(values)
}

impl StructureFile for PoscarFile {
    fn read_from(reader: &mut impl BufRead) -> Result<Structure, StructureFileError> {
        let mut lines = reader.lines().enumerate().map(|(i, l)| (i + 1, l));

        let (_, comment) = next_line(&mut lines, "POSCAR comment")?;
        let (scale_num, scale_line) = next_line(&mut lines, "POSCAR scale factor")?;
        let scale = parse_floats(&scale_line, scale_num, 1)?[0];
        if scale <= 0.0 {
            return Err(StructureFileError::parse(
                scale_num,
                "only positive scale factors are supported",
            ));
        }

        let mut lattice = Vec::with_capacity(9);
        for _ in 0..3 {
            let (n, line) = next_line(&mut lines, "POSCAR lattice vectors")?;
            lattice.extend(parse_floats(&line, n, 3)?);
        }
        let cell = Matrix3::from_row_slice(&lattice) * scale;

        let (species_num, species_line) = next_line(&mut lines, "POSCAR species")?;
        let first_is_numeric = species_line
            .split_whitespace()
            .next()
            .is_some_and(|t| t.parse::<usize>().is_ok());
        let (species_words, counts_num, counts_line) = if first_is_numeric {
            // VASP 4 layout: no species line, symbols taken from the comment.
            (
                comment.split_whitespace().map(str::to_string).collect::<Vec<_>>(),
                species_num,
                species_line,
            )
        } else {
            let (n, line) = next_line(&mut lines, "POSCAR atom counts")?;
            (
                species_line.split_whitespace().map(str::to_string).collect(),
                n,
                line,
            )
        };
        let counts: Vec<usize> = counts_line
            .split_whitespace()
            .map(|v| v.parse::<usize>())
            .collect::<Result<_, _>>()
            .map_err(|_| StructureFileError::parse(counts_num, "invalid atom counts"))?;
        if species_words.len() < counts.len() {
            return Err(StructureFileError::parse(
                species_num,
                "fewer species symbols than atom counts",
            ));
        }

        let mut symbols = Vec::new();
        for (word, &count) in species_words.iter().zip(&counts) {
            // POTCAR labels such as "Fe_pv" name the element before the suffix.
            let element = word.split(['_', '/']).next().unwrap_or(word);
            let symbol = normalize_symbol(element).ok_or_else(|| StructureFileError::UnknownElement {
                line: species_num,
                symbol: word.clone(),
            })?;
            symbols.extend(std::iter::repeat_n(symbol.to_string(), count));
        }

        let (mut mode_num, mut mode_line) = next_line(&mut lines, "POSCAR coordinate mode")?;
        if mode_line.trim_start().starts_with(['s', 'S']) {
            (mode_num, mode_line) = next_line(&mut lines, "POSCAR coordinate mode")?;
        }
        let cartesian = mode_line.trim_start().starts_with(['c', 'C', 'k', 'K']);
        if !cartesian && !mode_line.trim_start().starts_with(['d', 'D']) {
            return Err(StructureFileError::parse(
                mode_num,
                format!("unknown coordinate mode '{}'", mode_line.trim()),
            ));
        }

        let mut positions = Vec::with_capacity(symbols.len());
        for _ in 0..symbols.len() {
            let (n, line) = next_line(&mut lines, "POSCAR coordinates")?;
            let v = parse_floats(&line, n, 3)?;
            let position = if cartesian {
                Point3::new(v[0], v[1], v[2]) * scale
            } else {
                fractional_to_cartesian(&cell, &Vector3::new(v[0], v[1], v[2]))
            };
            positions.push(position);
        }

        Ok(Structure::new(symbols, positions).with_cell(cell, [true; 3]))
    }

    fn write_to(structure: &Structure, writer: &mut impl Write) -> Result<(), StructureFileError> {
        Self::write_grouped(structure, &structure.species().join(" "), writer).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const NACL: &str = "\
NaCl rocksalt
  2.0
  1.0 0.0 0.0
  0.0 1.0 0.0
  0.0 0.0 1.0
  Na Cl
  1 1
Selective dynamics
Direct
  0.0 0.0 0.0 T T T
  0.5 0.5 0.5 T T T
";

    #[test]
    fn reads_direct_coordinates_with_scale_factor() {
        let s = PoscarFile::read_from(&mut Cursor::new(NACL)).unwrap();
        assert_eq!(s.symbols(), &["Na".to_string(), "Cl".to_string()]);
        assert_eq!(s.cell().unwrap()[(0, 0)], 2.0);
        assert!((s.positions()[1] - Point3::new(1.0, 1.0, 1.0)).norm() < 1e-12);
        assert!(s.is_periodic());
    }

    #[test]
    fn reads_vasp4_layout_with_symbols_in_comment() {
        let text = "Si\n1.0\n5 0 0\n0 5 0\n0 0 5\n2\nCartesian\n0 0 0\n1.25 1.25 1.25\n";
        let s = PoscarFile::read_from(&mut Cursor::new(text)).unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.positions()[1], Point3::new(1.25, 1.25, 1.25));
    }

    #[test]
    fn writing_groups_species_and_reports_permutation() {
        let s = Structure::new(
            vec!["O".into(), "H".into(), "O".into(), "H".into()],
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(3.0, 0.0, 0.0),
            ],
        )
        .with_cell(Matrix3::identity() * 10.0, [true; 3]);

        let mut buffer = Vec::new();
        let order = PoscarFile::write_grouped(&s, "water", &mut buffer).unwrap();
        assert_eq!(order, vec![0, 2, 1, 3]);

        let reread = PoscarFile::read_from(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(reread, s.permuted(&order).unwrap());
    }

    #[test]
    fn writing_requires_a_cell() {
        let s = Structure::new(vec!["H".into()], vec![Point3::origin()]);
        let err = PoscarFile::write_to(&s, &mut Vec::new()).unwrap_err();
        assert!(matches!(err, StructureFileError::Unsupported(_)));
    }
}
