use super::error::StructureFileError;
use super::traits::StructureFile;
use crate::core::models::element::normalize_symbol;
use crate::core::models::structure::Structure;
use nalgebra::{Matrix3, Point3};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Extended XYZ files: one or more frames, each with an atom count line, a
/// comment line carrying optional `Lattice` / `pbc` fields, and atom lines.
pub struct ExtendedXyzFile;

impl ExtendedXyzFile {
    pub fn read_frames_from(reader: &mut impl BufRead) -> Result<Vec<Structure>, StructureFileError> {
        let mut lines = reader.lines().enumerate().map(|(i, l)| (i + 1, l));
        let mut frames = Vec::new();

        loop {
            let (count_line_num, count_line) = loop {
                match lines.next() {
                    None => return Ok(frames),
                    Some((n, line)) => {
                        let line = line?;
                        if !line.trim().is_empty() {
                            break (n, line);
                        }
                    }
                }
            };

            let natoms: usize = count_line.trim().parse().map_err(|_| {
                StructureFileError::parse(
                    count_line_num,
                    format!("expected an atom count, found '{}'", count_line.trim()),
                )
            })?;

            let (comment_line_num, comment) = match lines.next() {
                Some((n, line)) => (n, line?),
                None => return Err(StructureFileError::UnexpectedEof("XYZ comment line")),
            };
            let fields = parse_comment_fields(&comment);

            let mut symbols = Vec::with_capacity(natoms);
            let mut positions = Vec::with_capacity(natoms);
            for _ in 0..natoms {
                let (line_num, line) = match lines.next() {
                    Some((n, line)) => (n, line?),
                    None => return Err(StructureFileError::UnexpectedEof("XYZ atom lines")),
                };
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() < 4 {
                    return Err(StructureFileError::parse(
                        line_num,
                        "atom line needs a symbol and three coordinates",
                    ));
                }
                let symbol = normalize_symbol(parts[0]).ok_or_else(|| {
                    StructureFileError::UnknownElement {
                        line: line_num,
                        symbol: parts[0].to_string(),
                    }
                })?;
                let mut xyz = [0.0; 3];
                for (k, value) in parts[1..4].iter().enumerate() {
                    xyz[k] = value.parse().map_err(|_| {
                        StructureFileError::parse(line_num, format!("invalid coordinate '{}'", value))
                    })?;
                }
                symbols.push(symbol.to_string());
                positions.push(Point3::new(xyz[0], xyz[1], xyz[2]));
            }

            let mut structure = Structure::new(symbols, positions);
            if let Some(lattice) = fields.get("lattice") {
                let cell = parse_lattice(lattice, comment_line_num)?;
                let pbc = match fields.get("pbc") {
                    Some(value) => parse_pbc(value, comment_line_num)?,
                    None => [true; 3],
                };
                structure = structure.with_cell(cell, pbc);
            }
            frames.push(structure);
        }
    }

    pub fn read_frames_from_path<P: AsRef<Path>>(
        path: P,
    ) -> Result<Vec<Structure>, StructureFileError> {
        let file = File::open(path)?;
        Self::read_frames_from(&mut BufReader::new(file))
    }

    pub fn write_frames_to(
        frames: &[Structure],
        writer: &mut impl Write,
    ) -> Result<(), StructureFileError> {
        for frame in frames {
            Self::write_to(frame, writer)?;
        }
        Ok(())
    }
}

impl StructureFile for ExtendedXyzFile {
    fn read_from(reader: &mut impl BufRead) -> Result<Structure, StructureFileError> {
        Self::read_frames_from(reader)?
            .into_iter()
            .next()
            .ok_or(StructureFileError::UnexpectedEof("XYZ atom count"))
    }

    fn write_to(structure: &Structure, writer: &mut impl Write) -> Result<(), StructureFileError> {
        writeln!(writer, "{}", structure.len())?;

        let mut comment = String::new();
        if let Some(cell) = structure.cell() {
            let values: Vec<String> = (0..3)
                .flat_map(|r| (0..3).map(move |c| (r, c)))
                .map(|(r, c)| format!("{:.8}", cell[(r, c)]))
                .collect();
            comment.push_str(&format!("Lattice=\"{}\" ", values.join(" ")));
        }
        comment.push_str("Properties=species:S:1:pos:R:3");
        let pbc: Vec<&str> = structure
            .pbc()
            .iter()
            .map(|&p| if p { "T" } else { "F" })
            .collect();
        comment.push_str(&format!(" pbc=\"{}\"", pbc.join(" ")));
        writeln!(writer, "{}", comment)?;

        for (symbol, position) in structure.symbols().iter().zip(structure.positions()) {
            writeln!(
                writer,
                "{:<2} {:>16.8} {:>16.8} {:>16.8}",
                symbol, position.x, position.y, position.z
            )?;
        }
        Ok(())
    }
}

/// Splits an extended XYZ comment line into lower-cased `key=value` fields.
/// Values may be wrapped in double quotes to contain spaces.
fn parse_comment_fields(comment: &str) -> HashMap<String, String> {
    let mut fields = HashMap::new();
    let mut chars = comment.trim().chars().peekable();

    while chars.peek().is_some() {
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let mut key = String::new();
        while let Some(&c) = chars.peek() {
            if c == '=' || c.is_whitespace() {
                break;
            }
            key.push(c);
            chars.next();
        }
        if chars.peek() != Some(&'=') {
            // Bare word without a value.
            if !key.is_empty() {
                fields.insert(key.to_ascii_lowercase(), String::new());
            }
            continue;
        }
        chars.next();
        let value = if chars.peek() == Some(&'"') {
            chars.next();
            chars.by_ref().take_while(|&c| c != '"').collect()
        } else {
            chars.by_ref().take_while(|c| !c.is_whitespace()).collect()
        };
        fields.insert(key.to_ascii_lowercase(), value);
    }
    fields
}

fn parse_lattice(value: &str, line: usize) -> Result<Matrix3<f64>, StructureFileError> {
    let numbers: Vec<f64> = value
        .split_whitespace()
        .map(|v| v.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| StructureFileError::parse(line, format!("invalid Lattice '{}'", value)))?;
    if numbers.len() != 9 {
        return Err(StructureFileError::parse(
            line,
            format!("Lattice needs 9 numbers, found {}", numbers.len()),
        ));
    }
    Ok(Matrix3::from_row_slice(&numbers))
}

fn parse_pbc(value: &str, line: usize) -> Result<[bool; 3], StructureFileError> {
    let flags: Vec<bool> = value
        .split_whitespace()
        .map(|v| match v.to_ascii_uppercase().as_str() {
            "T" | "TRUE" | "1" => Ok(true),
            "F" | "FALSE" | "0" => Ok(false),
            _ => Err(StructureFileError::parse(line, format!("invalid pbc flag '{}'", v))),
        })
        .collect::<Result<_, _>>()?;
    match flags.as_slice() {
        [a, b, c] => Ok([*a, *b, *c]),
        _ => Err(StructureFileError::parse(line, "pbc needs three flags")),
    }
}
