use super::{
    CalculationResult, Calculator, CalculatorError, HARTREE_TO_EV, read_file, required, write_file,
};
use crate::core::io::gen_format::GenFile;
use crate::core::io::traits::StructureFile;
use crate::core::models::structure::Structure;
use crate::engine::command::ExternalCommand;
use crate::engine::config::{CalcType, CalculatorKind, JobConfig};
use std::fmt;
use std::path::Path;

const GEOMETRY_FILE: &str = "geo.gen";
const INPUT_FILE: &str = "dftb_in.hsd";
const DETAILED_OUTPUT: &str = "detailed.out";
const FINAL_GEOMETRY: &str = "geo_end.gen";

/// DFTB+ with the extended tight-binding (xTB) Hamiltonian.
#[derive(Debug, Clone)]
pub struct DftbCalculator {
    command: String,
    /// Parametrization name without the `-xTB` suffix, e.g. `GFN2`.
    parametrization: String,
    calc_type: CalcType,
    kpoints: [u32; 3],
    lattice_opt: bool,
}

impl DftbCalculator {
    pub fn from_config(config: &JobConfig) -> Result<Self, CalculatorError> {
        let parametrization = required(&config.method.parametrization, "parametrization")?;
        Ok(Self {
            command: config.engines.dftb.command.clone(),
            parametrization: parametrization.to_uppercase(),
            calc_type: config.calc_type,
            kpoints: config.kpoints_or_gamma(),
            lattice_opt: config.method.lattice_opt,
        })
    }

    pub fn hsd_input(&self, structure: &Structure) -> String {
        let mut hsd = String::new();
        self.write_hsd(structure, &mut hsd)
            .expect("writing to a String cannot fail");
        hsd
    }

    fn write_hsd(&self, structure: &Structure, hsd: &mut impl fmt::Write) -> fmt::Result {
        let periodic = structure.is_periodic();

        writeln!(hsd, "Geometry = GenFormat {{")?;
        writeln!(hsd, "    <<< \"{}\"", GEOMETRY_FILE)?;
        writeln!(hsd, "}}\n")?;

        if self.calc_type.is_optimization() {
            writeln!(hsd, "Driver = GeometryOptimization {{")?;
            writeln!(hsd, "    Optimiser = Rational {{}}")?;
            if periodic {
                let flag = if self.lattice_opt { "Yes" } else { "No" };
                writeln!(hsd, "    LatticeOpt = {}", flag)?;
            }
            writeln!(hsd, "}}\n")?;
        }

        writeln!(hsd, "Hamiltonian = xTB {{")?;
        writeln!(hsd, "    Method = \"{}-xTB\"", self.parametrization)?;
        if periodic {
            let [a, b, c] = self.kpoints;
            writeln!(hsd, "    KPointsAndWeights = SupercellFolding {{")?;
            writeln!(hsd, "        {} 0 0", a)?;
            writeln!(hsd, "        0 {} 0", b)?;
            writeln!(hsd, "        0 0 {}", c)?;
            // Even meshes are shifted off Gamma.
            let shifts: Vec<&str> = self
                .kpoints
                .iter()
                .map(|&k| if k % 2 == 0 { "0.5" } else { "0.0" })
                .collect();
            writeln!(hsd, "        {}", shifts.join(" "))?;
            writeln!(hsd, "    }}")?;
        }
        writeln!(hsd, "}}\n")?;

        writeln!(hsd, "Options {{")?;
        writeln!(hsd, "    WriteResultsTag = Yes")?;
        writeln!(hsd, "}}\n")?;
        writeln!(hsd, "ParserOptions {{")?;
        writeln!(hsd, "    ParserVersion = 12")?;
        writeln!(hsd, "}}")
    }
}

/// Reads the last `Total energy` and `Total Mermin free energy` (eV) from
/// a `detailed.out` file.
pub fn parse_detailed_output(
    content: &str,
    path: &Path,
) -> Result<(f64, Option<f64>), CalculatorError> {
    let hartree_after = |line: &str, key: &str| -> Option<f64> {
        line.trim_start()
            .strip_prefix(key)?
            .split_whitespace()
            .next()?
            .parse::<f64>()
            .ok()
    };

    let mut energy = None;
    let mut free_energy = None;
    for line in content.lines() {
        if let Some(e) = hartree_after(line, "Total energy:") {
            energy = Some(e * HARTREE_TO_EV);
        } else if let Some(e) = hartree_after(line, "Total Mermin free energy:") {
            free_energy = Some(e * HARTREE_TO_EV);
        }
    }
    let energy = energy.ok_or_else(|| CalculatorError::parse(path, "no 'Total energy' line"))?;
    Ok((energy, free_energy))
}

impl Calculator for DftbCalculator {
    fn kind(&self) -> CalculatorKind {
        CalculatorKind::Dftb
    }

    fn write_input(
        &self,
        structure: &Structure,
        _label: &str,
        workdir: &Path,
    ) -> Result<(), CalculatorError> {
        GenFile::write_to_path(structure, workdir.join(GEOMETRY_FILE))?;
        write_file(&workdir.join(INPUT_FILE), &self.hsd_input(structure))
    }

    fn execute(&self, label: &str, workdir: &Path) -> Result<(), CalculatorError> {
        ExternalCommand::parse(&self.command)?
            .current_dir(workdir)
            .stdout_to(format!("{}.out", label))
            .run()?;
        Ok(())
    }

    fn read_results(
        &self,
        structure: &Structure,
        _label: &str,
        workdir: &Path,
    ) -> Result<CalculationResult, CalculatorError> {
        let detailed = workdir.join(DETAILED_OUTPUT);
        let (energy, free_energy) = parse_detailed_output(&read_file(&detailed)?, &detailed)?;

        let final_geometry = workdir.join(FINAL_GEOMETRY);
        let final_structure = if self.calc_type.is_optimization() {
            let mut optimized = GenFile::read_from_path(&final_geometry)?;
            if optimized.len() != structure.len() {
                return Err(CalculatorError::parse(
                    &final_geometry,
                    format!("expected {} atoms, found {}", structure.len(), optimized.len()),
                ));
            }
            if let Some(cell) = optimized.cell().copied() {
                optimized = optimized.with_cell(cell, structure.pbc());
            }
            optimized
        } else {
            structure.clone()
        };

        Ok(CalculationResult {
            structure: final_structure,
            energy,
            free_energy,
        })
    }
}
