use super::{CalculationResult, Calculator, CalculatorError, read_file, required, write_file};
use crate::core::io::poscar::PoscarFile;
use crate::core::io::traits::StructureFile;
use crate::core::models::structure::Structure;
use crate::engine::command::ExternalCommand;
use crate::engine::config::{CalcType, CalculatorKind, JobConfig, VaspSettings};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// VASP with a plane-wave basis. Only periodic structures are accepted.
#[derive(Debug, Clone)]
pub struct VaspCalculator {
    settings: VaspSettings,
    /// INCAR `GGA` tag, `None` for LDA.
    gga: Option<&'static str>,
    dispersion_correction: Option<String>,
    calc_type: CalcType,
    kpoints: [u32; 3],
    encut: f64,
    lattice_opt: bool,
}

/// Maps an exchange-correlation functional name to the INCAR `GGA` tag.
pub fn gga_tag(functional: &str) -> Result<Option<&'static str>, CalculatorError> {
    match functional.trim().to_ascii_uppercase().as_str() {
        "PBE" => Ok(Some("PE")),
        "PBESOL" => Ok(Some("PS")),
        "RPBE" => Ok(Some("RP")),
        "REVPBE" => Ok(Some("RE")),
        "PW91" => Ok(Some("91")),
        "LDA" => Ok(None),
        other => Err(CalculatorError::Unsupported(format!(
            "functional '{}' has no VASP GGA tag",
            other
        ))),
    }
}

/// Maps a dispersion correction to the INCAR `IVDW` value. Jobs without an
/// explicit correction get D3 (zero damping).
pub fn ivdw_tag(dispersion: Option<&str>) -> Result<Option<u32>, CalculatorError> {
    let Some(name) = dispersion else {
        return Ok(Some(11));
    };
    match name.trim().to_ascii_uppercase().as_str() {
        "NONE" => Ok(None),
        "D2" => Ok(Some(1)),
        "D3" | "GD3" => Ok(Some(11)),
        "D3BJ" | "GD3BJ" => Ok(Some(12)),
        "TS" => Ok(Some(2)),
        other => Err(CalculatorError::Unsupported(format!(
            "dispersion correction '{}' has no VASP IVDW value",
            other
        ))),
    }
}

impl VaspCalculator {
    pub fn from_config(config: &JobConfig) -> Result<Self, CalculatorError> {
        let functional = required(&config.method.functional, "functional")?;
        let dispersion = config.method.dispersion_correction.clone();
        ivdw_tag(dispersion.as_deref())?;
        Ok(Self {
            settings: config.engines.vasp.clone(),
            gga: gga_tag(functional)?,
            dispersion_correction: dispersion,
            calc_type: config.calc_type,
            kpoints: config.kpoints_or_gamma(),
            encut: config.method.encut.unwrap_or(config.engines.vasp.default_encut),
            lattice_opt: config.method.lattice_opt,
        })
    }

    /// INCAR tags in the order they are written.
    pub fn incar_tags(&self) -> Result<Vec<(&'static str, String)>, CalculatorError> {
        let mut tags: Vec<(&'static str, String)> = vec![("ALGO", "Normal".to_string())];
        if let Some(gga) = self.gga {
            tags.push(("GGA", gga.to_string()));
        }
        for (key, value) in [("PREC", "Accurate"), ("ISTART", "1"), ("ICHARG", "1"), ("ISPIN", "1")] {
            tags.push((key, value.to_string()));
        }
        if let Some(ivdw) = ivdw_tag(self.dispersion_correction.as_deref())? {
            tags.push(("IVDW", ivdw.to_string()));
        }
        let nsw = match self.calc_type {
            CalcType::Opt => self.settings.nsw_opt,
            CalcType::Sp => 1,
        };
        let isif = if self.lattice_opt { 3 } else { 2 };
        tags.push(("ENCUT", self.encut.to_string()));
        for (key, value) in [
            ("EDIFF", "1E-07"),
            ("EDIFFG", "-1E-03"),
            ("NELM", "600"),
            ("SIGMA", "0.05"),
            ("ISMEAR", "0"),
        ] {
            tags.push((key, value.to_string()));
        }
        tags.push(("NSW", nsw.to_string()));
        tags.push(("IBRION", "2".to_string()));
        tags.push(("ISIF", isif.to_string()));
        Ok(tags)
    }

    pub fn kpoints_file(&self) -> String {
        let [a, b, c] = self.kpoints;
        format!("Automatic mesh\n0\nMonkhorst-Pack\n{} {} {}\n0 0 0\n", a, b, c)
    }

    fn potcar_path(&self, element: &str) -> Result<PathBuf, CalculatorError> {
        let root = self.settings.pp_path.as_ref().ok_or_else(|| {
            CalculatorError::Unsupported(format!(
                "no pseudopotential root configured (set {})",
                VaspSettings::PP_PATH_ENV
            ))
        })?;
        let path = root.join(&self.settings.potpaw_set).join(element).join("POTCAR");
        if !path.is_file() {
            return Err(CalculatorError::MissingPseudopotential {
                element: element.to_string(),
                path,
            });
        }
        Ok(path)
    }

    fn write_potcar(&self, structure: &Structure, path: &Path) -> Result<(), CalculatorError> {
        let io_err = |source| CalculatorError::Io {
            path: path.to_path_buf(),
            source,
        };
        let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
        for species in structure.species() {
            let source = self.potcar_path(species)?;
            writer
                .write_all(read_file(&source)?.as_bytes())
                .map_err(io_err)?;
        }
        writer.flush().map_err(io_err)
    }
}

/// Reads the last `energy(sigma->0)` and `TOTEN` values (eV) from an OUTCAR.
pub fn parse_outcar(content: &str, path: &Path) -> Result<(f64, Option<f64>), CalculatorError> {
    let value_after = |line: &str, key: &str| -> Option<f64> {
        let (_, rest) = line.split_once(key)?;
        rest.trim_start()
            .trim_start_matches('=')
            .split_whitespace()
            .next()?
            .parse()
            .ok()
    };

    let mut energy = None;
    let mut free_energy = None;
    for line in content.lines() {
        if let Some(e) = value_after(line, "energy(sigma->0)") {
            energy = Some(e);
        }
        if line.contains("free  energy") {
            if let Some(e) = value_after(line, "TOTEN") {
                free_energy = Some(e);
            }
        }
    }
    let energy = energy.ok_or_else(|| CalculatorError::parse(path, "no 'energy(sigma->0)' line"))?;
    Ok((energy, free_energy))
}

/// Inverse of a permutation: `inverse[order[i]] = i`.
fn inverse_permutation(order: &[usize]) -> Vec<usize> {
    let mut inverse = vec![0; order.len()];
    for (i, &o) in order.iter().enumerate() {
        inverse[o] = i;
    }
    inverse
}

impl Calculator for VaspCalculator {
    fn kind(&self) -> CalculatorKind {
        CalculatorKind::Vasp
    }

    fn write_input(
        &self,
        structure: &Structure,
        label: &str,
        workdir: &Path,
    ) -> Result<(), CalculatorError> {
        if !structure.is_periodic() {
            return Err(CalculatorError::Unsupported(
                "VASP needs a periodic structure with a unit cell".to_string(),
            ));
        }

        let incar: String = self
            .incar_tags()?
            .into_iter()
            .map(|(key, value)| format!("{} = {}\n", key, value))
            .collect();
        write_file(&workdir.join("INCAR"), &incar)?;
        write_file(&workdir.join("KPOINTS"), &self.kpoints_file())?;

        let poscar_path = workdir.join("POSCAR");
        let io_err = |source| CalculatorError::Io {
            path: poscar_path.clone(),
            source,
        };
        let mut writer = BufWriter::new(File::create(&poscar_path).map_err(io_err)?);
        PoscarFile::write_grouped(structure, label, &mut writer)?;
        writer.flush().map_err(io_err)?;

        self.write_potcar(structure, &workdir.join("POTCAR"))
    }

    fn execute(&self, _label: &str, workdir: &Path) -> Result<(), CalculatorError> {
        ExternalCommand::parse(&self.settings.command)?
            .current_dir(workdir)
            .stdout_to(&self.settings.stdout_file)
            .run()?;
        Ok(())
    }

    fn read_results(
        &self,
        structure: &Structure,
        _label: &str,
        workdir: &Path,
    ) -> Result<CalculationResult, CalculatorError> {
        let outcar = workdir.join("OUTCAR");
        let (energy, free_energy) = parse_outcar(&read_file(&outcar)?, &outcar)?;

        let contcar = workdir.join("CONTCAR");
        let has_contcar = fs::metadata(&contcar).is_ok_and(|m| m.len() > 0);
        let final_structure = if has_contcar {
            let written = PoscarFile::read_from_path(&contcar)?;
            if written.len() != structure.len() {
                return Err(CalculatorError::parse(
                    &contcar,
                    format!("expected {} atoms, found {}", structure.len(), written.len()),
                ));
            }
            let order = PoscarFile::species_order(structure);
            let restored = written
                .permuted(&inverse_permutation(&order))
                .map_err(|e| CalculatorError::parse(&contcar, e.to_string()))?;
            match restored.cell().copied() {
                Some(cell) => restored.with_cell(cell, structure.pbc()),
                None => restored,
            }
        } else if self.calc_type.is_optimization() {
            return Err(CalculatorError::parse(&contcar, "missing or empty CONTCAR"));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::{EngineSettings, JobConfigBuilder};
    use nalgebra::{Matrix3, Point3};
    use tempfile::tempdir;

    const OUTCAR: &str = "\
  free  energy   TOTEN  =       -10.80000000 eV
  energy  without entropy=      -10.79000000  energy(sigma->0) =      -10.79500000
  free  energy   TOTEN  =       -10.84373568 eV
  energy  without entropy=      -10.84300000  energy(sigma->0) =      -10.84336784
";

    fn config(calc_type: CalcType) -> JobConfigBuilder {
        JobConfigBuilder::new()
            .calculator(CalculatorKind::Vasp)
            .calc_type(calc_type)
            .functional("PBE")
            .db_path(PathBuf::from("db"))
            .input_name(PathBuf::from("in.json"))
            .engines(EngineSettings::default())
    }

    fn calculator(builder: JobConfigBuilder) -> VaspCalculator {
        VaspCalculator::from_config(&builder.build().unwrap()).unwrap()
    }

    fn mixed_cell() -> Structure {
        Structure::new(
            vec!["O".into(), "Ti".into(), "O".into()],
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.5, 1.5, 1.5),
                Point3::new(3.0, 0.0, 0.0),
            ],
        )
        .with_cell(Matrix3::identity() * 4.6, [true; 3])
    }

    fn tag<'a>(tags: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        tags.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn incar_follows_calculation_settings() {
        let opt = calculator(config(CalcType::Opt).lattice_opt(true).encut(520.0));
        let tags = opt.incar_tags().unwrap();
        assert_eq!(tags[0], ("ALGO", "Normal".to_string()));
        assert_eq!(tag(&tags, "GGA"), Some("PE"));
        assert_eq!(tag(&tags, "IVDW"), Some("11"));
        assert_eq!(tag(&tags, "ENCUT"), Some("520"));
        assert_eq!(tag(&tags, "NSW"), Some("500"));
        assert_eq!(tag(&tags, "ISIF"), Some("3"));

        let sp = calculator(config(CalcType::Sp).dispersion_correction("none"));
        let tags = sp.incar_tags().unwrap();
        assert_eq!(tag(&tags, "IVDW"), None);
        assert_eq!(tag(&tags, "ENCUT"), Some("550"));
        assert_eq!(tag(&tags, "NSW"), Some("1"));
        assert_eq!(tag(&tags, "ISIF"), Some("2"));
    }

    #[test]
    fn functional_and_dispersion_mappings() {
        assert_eq!(gga_tag("pbesol").unwrap(), Some("PS"));
        assert_eq!(gga_tag("LDA").unwrap(), None);
        assert!(gga_tag("B3LYP").is_err());
        assert_eq!(ivdw_tag(Some("D3BJ")).unwrap(), Some(12));
        assert!(ivdw_tag(Some("MBD-X")).is_err());
    }

    #[test]
    fn molecules_are_rejected() {
        let dir = tempdir().unwrap();
        let molecule = Structure::new(vec!["H".into()], vec![Point3::origin()]);
        let err = calculator(config(CalcType::Sp))
            .write_input(&molecule, "h", dir.path())
            .unwrap_err();
        assert!(matches!(err, CalculatorError::Unsupported(_)));
    }

    #[test]
    fn inputs_are_written_with_concatenated_potcar() {
        let pp = tempdir().unwrap();
        for element in ["O", "Ti"] {
            let folder = pp.path().join("potpaw_PBE").join(element);
            fs::create_dir_all(&folder).unwrap();
            fs::write(folder.join("POTCAR"), format!("PAW_PBE {}\n", element)).unwrap();
        }
        let mut engines = EngineSettings::default();
        engines.vasp.pp_path = Some(pp.path().to_path_buf());
        let calc = calculator(config(CalcType::Opt).kpoints([3, 3, 2]).engines(engines));

        let dir = tempdir().unwrap();
        calc.write_input(&mixed_cell(), "1_tio2", dir.path()).unwrap();
        let potcar = fs::read_to_string(dir.path().join("POTCAR")).unwrap();
        assert_eq!(potcar, "PAW_PBE O\nPAW_PBE Ti\n");
        let kpoints = fs::read_to_string(dir.path().join("KPOINTS")).unwrap();
        assert!(kpoints.contains("Monkhorst-Pack\n3 3 2\n"));
        assert!(dir.path().join("INCAR").exists());
        assert!(dir.path().join("POSCAR").exists());
    }

    #[test]
    fn missing_pseudopotential_is_reported() {
        let pp = tempdir().unwrap();
        let mut engines = EngineSettings::default();
        engines.vasp.pp_path = Some(pp.path().to_path_buf());
        let calc = calculator(config(CalcType::Sp).engines(engines));
        let dir = tempdir().unwrap();
        let err = calc.write_input(&mixed_cell(), "x", dir.path()).unwrap_err();
        assert!(matches!(err, CalculatorError::MissingPseudopotential { .. }));
    }

    #[test]
    fn outcar_energies_take_last_ionic_step() {
        let (energy, free) = parse_outcar(OUTCAR, Path::new("OUTCAR")).unwrap();
        assert_eq!(energy, -10.84336784);
        assert_eq!(free, Some(-10.84373568));
    }

    #[test]
    fn contcar_is_restored_to_input_atom_order() {
        let dir = tempdir().unwrap();
        let input = mixed_cell();
        fs::write(dir.path().join("OUTCAR"), OUTCAR).unwrap();
        PoscarFile::write_to_path(&input, dir.path().join("CONTCAR")).unwrap();

        let result = calculator(config(CalcType::Opt))
            .read_results(&input, "x", dir.path())
            .unwrap();
        assert_eq!(result.structure.symbols(), input.symbols());
        for (a, b) in result.structure.positions().iter().zip(input.positions()) {
            assert!((a - b).norm() < 1e-9);
        }
    }
}
