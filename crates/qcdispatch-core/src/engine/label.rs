//! Calculation and database labels.
//!
//! Labels name output folders, calculator input files and output databases.
//! The calculation label carries every method parameter, while the database
//! label drops the cutoff and k-mesh so that convergence runs of one method
//! share a single output database.

use super::config::JobConfig;

/// Number of leading method parameters that make up the database label.
const DATABASE_PARAMETERS: usize = 5;

/// Builds `"{prefix}_{method}_{calc_type}"` where `method` joins the
/// non-empty `parameters` with `_`. Runs of `_` are collapsed and a leading
/// `_` is stripped, so an empty prefix yields `"{method}_{calc_type}"`.
pub fn create_label<S: AsRef<str>>(prefix: &str, parameters: &[S], calc_type: &str) -> String {
    let method = parameters
        .iter()
        .map(AsRef::as_ref)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let raw = format!("{}_{}_{}", prefix, method, calc_type);

    let mut label = String::with_capacity(raw.len());
    for c in raw.chars() {
        if c == '_' && label.ends_with('_') {
            continue;
        }
        label.push(c);
    }
    label.trim_start_matches('_').to_string()
}

/// Method parameters in label order:
/// calculator, functional, dispersion, basis set, parametrization, cutoff, k-mesh.
pub fn method_parameters(config: &JobConfig) -> Vec<String> {
    let method = &config.method;
    let kpoints_label = method
        .kpoints
        .map(|k| k.iter().map(u32::to_string).collect::<Vec<_>>().join("-"))
        .unwrap_or_default();
    vec![
        config.calculator.as_str().to_string(),
        method.functional.clone().unwrap_or_default(),
        method.dispersion_correction.clone().unwrap_or_default(),
        method.basis_set.clone().unwrap_or_default(),
        method.parametrization.clone().unwrap_or_default(),
        // Debug keeps the decimal point of whole cutoffs (520.0).
        method.encut.map(|e| format!("{:?}", e)).unwrap_or_default(),
        kpoints_label,
    ]
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLabels {
    /// Names output folders and input files.
    pub calculation: String,
    /// Stem of the output database file.
    pub database: String,
}

impl JobLabels {
    pub fn from_config(config: &JobConfig) -> Self {
        let parameters = method_parameters(config);
        let calc_type = config.calc_type.as_str();
        Self {
            calculation: create_label(&config.prefix, &parameters, calc_type),
            database: create_label(
                &config.prefix,
                &parameters[..DATABASE_PARAMETERS],
                calc_type,
            ),
        }
    }

    /// Label of one structure of the batch. `index` is 1-based; `None` is
    /// used for single-structure inputs, which keep the bare label.
    pub fn structure_label(&self, index: Option<usize>) -> String {
        match index {
            Some(i) => format!("{}_{}", i, self.calculation),
            None => self.calculation.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::config::{CalcType, CalculatorKind, EngineSettings, JobConfigBuilder};
    use std::path::PathBuf;

    fn builder(calculator: CalculatorKind) -> JobConfigBuilder {
        JobConfigBuilder::new()
            .calculator(calculator)
            .calc_type(CalcType::Opt)
            .db_path(PathBuf::from("db"))
            .input_name(PathBuf::from("in.json"))
            .engines(EngineSettings::default())
    }

    #[test]
    fn empty_parameters_are_skipped_and_underscores_collapsed() {
        assert_eq!(
            create_label("MOF", &["dftb", "", "", "GFN2"], "opt"),
            "MOF_dftb_GFN2_opt"
        );
        assert_eq!(create_label("", &["gaussian", "B3LYP"], "sp"), "gaussian_B3LYP_sp");
        assert_eq!(create_label("run__", &["a__b"], "sp"), "run_a_b_sp");
        assert_eq!(create_label::<&str>("", &[], "sp"), "sp");
    }

    #[test]
    fn database_label_omits_cutoff_and_kpoints() {
        let config = builder(CalculatorKind::Vasp)
            .prefix("bulk")
            .functional("PBE")
            .dispersion_correction("D3")
            .encut(520.0)
            .kpoints([4, 4, 2])
            .build()
            .unwrap();
        let labels = JobLabels::from_config(&config);
        assert_eq!(labels.calculation, "bulk_vasp_PBE_D3_520.0_4-4-2_opt");
        assert_eq!(labels.database, "bulk_vasp_PBE_D3_opt");
    }

    #[test]
    fn cutoff_keeps_its_decimal_point() {
        let whole = builder(CalculatorKind::Vasp).functional("PBE").encut(400.0).build().unwrap();
        assert!(method_parameters(&whole).contains(&"400.0".to_string()));

        let fractional = builder(CalculatorKind::Vasp).functional("PBE").encut(412.5).build().unwrap();
        assert!(method_parameters(&fractional).contains(&"412.5".to_string()));
    }

    #[test]
    fn dftb_labels_use_uppercased_parametrization() {
        let config = builder(CalculatorKind::Dftb)
            .prefix("scan")
            .parametrization("gfn1")
            .build()
            .unwrap();
        let labels = JobLabels::from_config(&config);
        assert_eq!(labels.calculation, "scan_dftb_GFN1_opt");
        assert_eq!(labels.database, labels.calculation);
    }

    #[test]
    fn structure_labels_are_indexed_from_one() {
        let labels = JobLabels {
            calculation: "x_dftb_GFN2_sp".into(),
            database: "x_dftb_GFN2_sp".into(),
        };
        assert_eq!(labels.structure_label(Some(1)), "1_x_dftb_GFN2_sp");
        assert_eq!(labels.structure_label(None), "x_dftb_GFN2_sp");
    }
}
