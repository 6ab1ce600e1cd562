use super::{
    CalculationResult, Calculator, CalculatorError, HARTREE_TO_EV, read_file, required, write_file,
};
use crate::core::models::element;
use crate::core::models::structure::Structure;
use crate::engine::command::ExternalCommand;
use crate::engine::config::{CalcType, CalculatorKind, GaussianSettings, JobConfig};
use nalgebra::Point3;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::path::Path;

static SCF_DONE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"SCF Done:\s+E\([^)]*\)\s*=\s*(-?\d+\.\d+(?:[DEde][-+]?\d+)?)").unwrap()
});

static ORIENTATION_ROW: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*\d+\s+(-?\d+)\s+-?\d+\s+(-?\d+\.\d+)\s+(-?\d+\.\d+)\s+(-?\d+\.\d+)\s*$")
        .unwrap()
});

/// Gaussian with a `<label>.com` input and `<label>.log` output.
#[derive(Debug, Clone)]
pub struct GaussianCalculator {
    settings: GaussianSettings,
    functional: String,
    basis_set: String,
    /// `EmpiricalDispersion` keyword value, `None` to leave it out.
    dispersion: Option<&'static str>,
    calc_type: CalcType,
}

/// Maps a dispersion correction to the Gaussian `EmpiricalDispersion` value.
/// Shares the D2, D3 and D3BJ names with the VASP `IVDW` mapping; jobs
/// without an explicit correction get GD3.
pub fn empirical_dispersion(dispersion: Option<&str>) -> Result<Option<&'static str>, CalculatorError> {
    let Some(name) = dispersion else {
        return Ok(Some("GD3"));
    };
    match name.trim().to_ascii_uppercase().as_str() {
        "NONE" => Ok(None),
        "D2" => Ok(Some("GD2")),
        "D3" | "GD3" => Ok(Some("GD3")),
        "D3BJ" | "GD3BJ" => Ok(Some("GD3BJ")),
        other => Err(CalculatorError::Unsupported(format!(
            "dispersion correction '{}' has no Gaussian EmpiricalDispersion value",
            other
        ))),
    }
}

impl GaussianCalculator {
    pub fn from_config(config: &JobConfig) -> Result<Self, CalculatorError> {
        Ok(Self {
            settings: config.engines.gaussian.clone(),
            functional: required(&config.method.functional, "functional")?.to_string(),
            basis_set: required(&config.method.basis_set, "basis set")?.to_string(),
            dispersion: empirical_dispersion(config.method.dispersion_correction.as_deref())?,
            calc_type: config.calc_type,
        })
    }

    pub fn route(&self) -> String {
        let mut route = format!("# {}/{}", self.functional, self.basis_set);
        if let Some(dispersion) = self.dispersion {
            route.push_str(&format!(" EmpiricalDispersion={}", dispersion));
        }
        route.push_str(&format!(
            " SCF=(MaxCycle={}) Pop={} NoSymm",
            self.settings.scf_max_cycles, self.settings.population
        ));
        if self.calc_type.is_optimization() {
            route.push_str(&format!(" Opt=(MaxCycles={})", self.settings.opt_max_cycles));
        }
        route
    }

    pub fn com_input(&self, structure: &Structure, label: &str) -> String {
        let mut com = String::new();
        self.write_com(structure, label, &mut com)
            .expect("writing to a String cannot fail");
        com
    }

    fn write_com(&self, structure: &Structure, label: &str, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(out, "%mem={}", self.settings.mem)?;
        writeln!(out, "%nprocshared={}", self.settings.nprocshared)?;
        writeln!(out, "%chk={}.chk", label)?;
        writeln!(out, "{}", self.route())?;
        writeln!(out)?;
        writeln!(out, "{}", label)?;
        writeln!(out)?;
        writeln!(out, "{} {}", self.settings.charge, self.settings.multiplicity)?;
        for (symbol, p) in structure.symbols().iter().zip(structure.positions()) {
            writeln!(out, "{:<2} {:>16.8} {:>16.8} {:>16.8}", symbol, p.x, p.y, p.z)?;
        }
        if structure.is_periodic() {
            if let Some(cell) = structure.cell() {
                for (r, &periodic) in structure.pbc().iter().enumerate() {
                    if periodic {
                        writeln!(
                            out,
                            "Tv {:>16.8} {:>16.8} {:>16.8}",
                            cell[(r, 0)],
                            cell[(r, 1)],
                            cell[(r, 2)]
                        )?;
                    }
                }
            }
        }
        writeln!(out)
    }
}

/// Energy (eV) of the last `SCF Done` line.
pub fn parse_scf_energy(log: &str, path: &Path) -> Result<f64, CalculatorError> {
    let capture = SCF_DONE
        .captures_iter(log)
        .last()
        .ok_or_else(|| CalculatorError::parse(path, "no 'SCF Done' line"))?;
    let value = capture[1].replace(['D', 'd'], "E");
    let hartree: f64 = value
        .parse()
        .map_err(|_| CalculatorError::parse(path, format!("invalid SCF energy '{}'", &capture[1])))?;
    Ok(hartree * HARTREE_TO_EV)
}

/// Atoms of the last `Input orientation` / `Standard orientation` block.
/// Translation vectors (atomic number -2) are skipped.
pub fn parse_last_orientation(log: &str) -> Option<(Vec<String>, Vec<Point3<f64>>)> {
    let lines: Vec<&str> = log.lines().collect();
    let header = lines
        .iter()
        .rposition(|l| l.contains("Input orientation:") || l.contains("Standard orientation:"))?;

    // Header, dashes, two column-title lines, dashes, then atom rows until dashes.
    let mut dashes_seen = 0;
    let mut symbols = Vec::new();
    let mut positions = Vec::new();
    for line in &lines[header + 1..] {
        if line.trim_start().starts_with("----") {
            dashes_seen += 1;
            if dashes_seen == 3 {
                break;
            }
            continue;
        }
        if dashes_seen < 2 {
            continue;
        }
        let caps = ORIENTATION_ROW.captures(line)?;
        let atomic_number: i32 = caps[1].parse().ok()?;
        if atomic_number < 1 {
            continue;
        }
        let symbol = element::symbol(u8::try_from(atomic_number).ok()?)?;
        symbols.push(symbol.to_string());
        positions.push(Point3::new(
            caps[2].parse().ok()?,
            caps[3].parse().ok()?,
            caps[4].parse().ok()?,
        ));
    }
    (dashes_seen == 3 && !symbols.is_empty()).then_some((symbols, positions))
}

impl Calculator for GaussianCalculator {
    fn kind(&self) -> CalculatorKind {
        CalculatorKind::Gaussian
    }

    fn write_input(
        &self,
        structure: &Structure,
        label: &str,
        workdir: &Path,
    ) -> Result<(), CalculatorError> {
        write_file(
            &workdir.join(format!("{}.com", label)),
            &self.com_input(structure, label),
        )
    }

    fn execute(&self, label: &str, workdir: &Path) -> Result<(), CalculatorError> {
        ExternalCommand::parse(&self.settings.command)?
            .current_dir(workdir)
            .stdin_from(format!("{}.com", label))
            .stdout_to(format!("{}.log", label))
            .run()?;
        Ok(())
    }

    fn read_results(
        &self,
        structure: &Structure,
        label: &str,
        workdir: &Path,
    ) -> Result<CalculationResult, CalculatorError> {
        let path = workdir.join(format!("{}.log", label));
        let log = read_file(&path)?;
        if !log.contains("Normal termination") {
            return Err(CalculatorError::parse(&path, "Gaussian did not terminate normally"));
        }
        let energy = parse_scf_energy(&log, &path)?;

        let mut final_structure = structure.clone();
        if self.calc_type.is_optimization() {
            let (symbols, positions) = parse_last_orientation(&log)
                .ok_or_else(|| CalculatorError::parse(&path, "no orientation block"))?;
            if symbols.as_slice() != structure.symbols() {
                return Err(CalculatorError::parse(
                    &path,
                    "final geometry does not match the input atoms",
                ));
            }
            final_structure.positions_mut().copy_from_slice(&positions);
        }

        Ok(CalculationResult {
            structure: final_structure,
            energy,
            free_energy: None,
        })
    }
}
