use crate::core::database::discovery::is_database_path;
use crate::core::database::{Energies, KeyValue, KeyValuePairs, StructureDatabase};
use crate::core::io;
use crate::core::io::extxyz::ExtendedXyzFile;
use crate::core::models::structure::Structure;
use crate::engine::calculators::{Calculator, CalculatorError, build_calculator};
use crate::engine::config::{JobConfig, PathConfig};
use crate::engine::error::EngineError;
use crate::engine::label::JobLabels;
use crate::engine::progress::{Progress, ProgressReporter};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{error, info, instrument, warn};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const SLURM_TIME_LIMIT_ENV: &str = "SLURM_TIME_LIMIT";

/// Where a job reads its structures and writes its results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPaths {
    pub input: PathBuf,
    pub output_database: PathBuf,
    /// Per-structure folders live under `<output_root>/outputs/`.
    pub output_root: PathBuf,
}

impl JobPaths {
    pub fn resolve(paths: &PathConfig, db_label: &str) -> Result<Self, EngineError> {
        let input = paths.db_path.join(&paths.input_name);
        let output_database = paths.db_path.join(format!("{}.json", db_label));

        let output_root = match &paths.output_path {
            Some(path) if path.exists() => path.clone(),
            _ => {
                let absolute =
                    std::path::absolute(&paths.db_path).map_err(|source| EngineError::Io {
                        path: paths.db_path.clone(),
                        source,
                    })?;
                absolute.parent().map(Path::to_path_buf).unwrap_or(absolute)
            }
        };

        Ok(Self {
            input,
            output_database,
            output_root,
        })
    }

    pub fn structure_folder(&self, label: &str) -> PathBuf {
        self.output_root.join("outputs").join(label)
    }
}

/// How the input file is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// Every row of a structure database.
    Database,
    /// Every frame of a multi-frame file.
    Trajectory,
    /// The last structure of any other structure file.
    Single,
}

impl InputKind {
    pub fn detect(path: &Path) -> Self {
        if is_database_path(path) {
            return InputKind::Database;
        }
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .as_deref()
        {
            Some("extxyz") | Some("traj") => InputKind::Trajectory,
            _ => InputKind::Single,
        }
    }
}

/// One structure to calculate, with the key linking it back to its source.
#[derive(Debug, Clone, PartialEq)]
pub struct InputStructure {
    pub structure: Structure,
    pub foreign_key: i64,
    /// 1-based position in the input; `None` for single-structure inputs.
    pub index: Option<usize>,
}

pub fn load_inputs(path: &Path) -> Result<Vec<InputStructure>, EngineError> {
    let kind = InputKind::detect(path);
    let inputs = match kind {
        InputKind::Database => {
            info!("Input database: {}", path.display());
            if !path.exists() {
                return Err(EngineError::UnsupportedInput {
                    path: path.to_path_buf(),
                    message: "input database does not exist".to_string(),
                });
            }
            let db = StructureDatabase::connect(path)?;
            db.select()
                .iter()
                .enumerate()
                .map(|(i, row)| InputStructure {
                    structure: row.to_structure(),
                    foreign_key: row.foreign_key(),
                    index: Some(i + 1),
                })
                .collect()
        }
        InputKind::Trajectory => {
            info!("Input trajectory: {}", path.display());
            if path.extension().is_some_and(|e| e.eq_ignore_ascii_case("traj")) {
                return Err(EngineError::UnsupportedInput {
                    path: path.to_path_buf(),
                    message: "binary trajectories are not supported, convert them to extended XYZ"
                        .to_string(),
                });
            }
            ExtendedXyzFile::read_frames_from_path(path)?
                .into_iter()
                .enumerate()
                .map(|(i, structure)| InputStructure {
                    structure,
                    foreign_key: i as i64 + 1,
                    index: Some(i + 1),
                })
                .collect()
        }
        InputKind::Single => {
            info!("Input file: {}", path.display());
            vec![InputStructure {
                structure: io::read_last(path)?,
                foreign_key: 1,
                index: None,
            }]
        }
    };
    Ok(inputs)
}

#[derive(Debug, Clone, PartialEq)]
pub enum StructureStatus {
    Succeeded { energy: f64 },
    Failed { reason: String },
}

impl StructureStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StructureStatus::Succeeded { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StructureStatus::Succeeded { .. } => "ok",
            StructureStatus::Failed { .. } => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructureOutcome {
    pub label: String,
    pub status: StructureStatus,
    /// Id of the row written to the output database, if the write succeeded.
    pub row_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub label: String,
    pub output_database: PathBuf,
    pub outcomes: Vec<StructureOutcome>,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }
}

/// Formats a duration as `HH:MM:SS`; hours are not wrapped at one day.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Metadata stored with every output row.
pub fn result_key_value_pairs(
    config: &JobConfig,
    foreign_key: i64,
    label: &str,
    status: &StructureStatus,
) -> KeyValuePairs {
    let mut kv = KeyValuePairs::new();
    kv.insert("foreignkey".into(), KeyValue::Int(foreign_key));
    kv.insert("name".into(), label.into());
    kv.insert("calc_type".into(), config.calc_type.as_str().into());
    kv.insert("calculator".into(), config.calculator.as_str().into());

    let method = &config.method;
    for (key, value) in [
        ("functional", &method.functional),
        ("dispersion_correction", &method.dispersion_correction),
        ("basis_set", &method.basis_set),
        ("parametrization", &method.parametrization),
    ] {
        if let Some(value) = value {
            kv.insert(key.into(), value.as_str().into());
        }
    }
    if let Some(encut) = method.encut {
        kv.insert("encut".into(), encut.into());
    }
    if let Some([a, b, c]) = method.kpoints {
        kv.insert("kpoints".into(), format!("{}-{}-{}", a, b, c).into());
    }
    if method.lattice_opt {
        kv.insert("lattice_opt".into(), true.into());
    }
    kv.insert("status".into(), status.as_str().into());
    kv
}

/// Runs one structure in its own output folder and records the result.
///
/// Calculator failures are logged and stored as a `failed` row carrying the
/// input geometry; they are never returned as errors.
pub fn run_structure(
    calculator: &dyn Calculator,
    config: &JobConfig,
    input: &InputStructure,
    label: &str,
    paths: &JobPaths,
    output_db: &mut StructureDatabase,
) -> StructureOutcome {
    info!("{}", "-".repeat(40));
    info!("Calculating {}", label);

    let folder = paths.structure_folder(label);
    info!("Output folder: {}", folder.display());
    let result = fs::create_dir_all(&folder)
        .map_err(|source| CalculatorError::Io {
            path: folder.clone(),
            source,
        })
        .and_then(|_| {
            info!(
                "Performing an {} calculation in {}",
                config.calc_type, config.calculator
            );
            calculator.calculate(&input.structure, label, &folder)
        });

    let (structure, energies, status) = match result {
        Ok(result) => {
            info!("Finished {} (E = {:.6} eV)", label, result.energy);
            (
                result.structure,
                Energies {
                    energy: Some(result.energy),
                    free_energy: result.free_energy,
                },
                StructureStatus::Succeeded {
                    energy: result.energy,
                },
            )
        }
        Err(e) => {
            error!("Error in {} calculation for {}: {}", config.calculator, label, e);
            (
                input.structure.clone(),
                Energies::default(),
                StructureStatus::Failed {
                    reason: e.to_string(),
                },
            )
        }
    };

    let kv = result_key_value_pairs(config, input.foreign_key, label, &status);
    let row_id = match output_db.write(&structure, energies, kv) {
        Ok(id) => {
            info!(
                "Wrote {} structure to {} with foreignkey {}",
                status.as_str(),
                output_db.path().display(),
                input.foreign_key
            );
            Some(id)
        }
        Err(e) => {
            error!("Error in writing to the database for {}: {}", label, e);
            None
        }
    };

    StructureOutcome {
        label: label.to_string(),
        status,
        row_id,
    }
}

/// Runs the calculation described by `config` over every input structure.
#[instrument(skip_all, name = "batch_workflow")]
pub fn run(config: &JobConfig, reporter: &ProgressReporter) -> Result<BatchSummary, EngineError> {
    config.validate()?;
    let labels = JobLabels::from_config(config);
    let timer = Instant::now();
    let started = Local::now();

    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    info!("{}", "-".repeat(80));
    info!(
        "Starting a new job with label {} at {}",
        labels.calculation,
        started.format(TIME_FORMAT)
    );
    info!("Path: {}", config.paths.db_path.display());
    if let Ok(limit) = std::env::var(SLURM_TIME_LIMIT_ENV) {
        info!("Allocated time limit: {}", limit);
    }

    let paths = JobPaths::resolve(&config.paths, &labels.database)?;
    let mut output_db = StructureDatabase::connect(&paths.output_database)?;
    info!("Output database: {}", paths.output_database.display());
    fs::create_dir_all(&paths.output_root).map_err(|source| EngineError::Io {
        path: paths.output_root.clone(),
        source,
    })?;
    info!("Output path: {}", paths.output_root.display());

    let inputs = load_inputs(&paths.input)?;
    let calculator = build_calculator(config)?;
    info!("Loaded {} structure(s).", inputs.len());
    reporter.report(Progress::PhaseFinish);

    reporter.report(Progress::PhaseStart {
        name: "Calculations",
    });
    reporter.report(Progress::TaskStart {
        total_steps: inputs.len() as u64,
    });
    let mut outcomes = Vec::with_capacity(inputs.len());
    for input in &inputs {
        let label = labels.structure_label(input.index);
        let outcome = run_structure(
            calculator.as_ref(),
            config,
            input,
            &label,
            &paths,
            &mut output_db,
        );
        reporter.step(format!("{}: {}", outcome.label, outcome.status.as_str()));
        outcomes.push(outcome);
    }
    reporter.report(Progress::TaskFinish);
    reporter.report(Progress::PhaseFinish);

    let elapsed = timer.elapsed();
    let ended = Local::now();
    info!(
        "Ending job with label {} at {}.",
        labels.calculation,
        ended.format(TIME_FORMAT)
    );
    info!(
        "Job with label {} started at {} and took {}.",
        labels.calculation,
        started.format(TIME_FORMAT),
        format_elapsed(elapsed)
    );

    let summary = BatchSummary {
        label: labels.calculation,
        output_database: paths.output_database,
        outcomes,
        elapsed,
    };
    if summary.failed() > 0 {
        warn!(
            "{} of {} structure(s) failed.",
            summary.failed(),
            summary.outcomes.len()
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::traits::StructureFile;
    use crate::engine::calculators::CalculationResult;
    use crate::engine::config::{
        CalcType, CalculatorKind, DftbSettings, EngineSettings, JobConfigBuilder,
    };
    use nalgebra::Point3;
    use tempfile::tempdir;

    fn dimer(offset: f64) -> Structure {
        Structure::new(
            vec!["H".into(), "H".into()],
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(0.74 + offset, 0.0, 0.0)],
        )
    }

    fn dftb_job(db_path: &Path, input: &str, command: &str) -> JobConfig {
        JobConfigBuilder::new()
            .prefix("h2")
            .calculator(CalculatorKind::Dftb)
            .calc_type(CalcType::Sp)
            .parametrization("GFN2")
            .db_path(db_path.to_path_buf())
            .input_name(PathBuf::from(input))
            .engines(EngineSettings {
                dftb: DftbSettings {
                    command: command.to_string(),
                },
                ..EngineSettings::default()
            })
            .build()
            .unwrap()
    }

    /// Stands in for an engine: succeeds with a fixed energy unless the
    /// label is listed as failing.
    struct FakeCalculator {
        failing: &'static str,
    }

    impl Calculator for FakeCalculator {
        fn kind(&self) -> CalculatorKind {
            CalculatorKind::Dftb
        }
        fn write_input(&self, _: &Structure, _: &str, workdir: &Path) -> Result<(), CalculatorError> {
            fs::write(workdir.join("input"), "x").unwrap();
            Ok(())
        }
        fn execute(&self, label: &str, _: &Path) -> Result<(), CalculatorError> {
            if label == self.failing {
                return Err(CalculatorError::Unsupported("engine crashed".into()));
            }
            Ok(())
        }
        fn read_results(
            &self,
            structure: &Structure,
            _: &str,
            _: &Path,
        ) -> Result<CalculationResult, CalculatorError> {
            Ok(CalculationResult {
                structure: structure.clone(),
                energy: -31.5,
                free_energy: Some(-31.6),
            })
        }
    }

    #[test]
    fn paths_fall_back_to_parent_of_database_folder() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("db");
        let config = PathConfig {
            db_path: db_path.clone(),
            input_name: PathBuf::from("in.json"),
            output_path: Some(dir.path().join("missing")),
        };
        let paths = JobPaths::resolve(&config, "h2_dftb_GFN2_sp").unwrap();
        assert_eq!(paths.input, db_path.join("in.json"));
        assert_eq!(paths.output_database, db_path.join("h2_dftb_GFN2_sp.json"));
        assert_eq!(paths.output_root, dir.path().to_path_buf());

        let existing = PathConfig {
            output_path: Some(dir.path().to_path_buf()),
            ..config
        };
        let paths = JobPaths::resolve(&existing, "x").unwrap();
        assert_eq!(paths.structure_folder("1_x"), dir.path().join("outputs").join("1_x"));
    }

    #[test]
    fn input_kind_follows_extension() {
        assert_eq!(InputKind::detect(Path::new("a/in.json")), InputKind::Database);
        assert_eq!(InputKind::detect(Path::new("in.db")), InputKind::Database);
        assert_eq!(InputKind::detect(Path::new("scan.extxyz")), InputKind::Trajectory);
        assert_eq!(InputKind::detect(Path::new("mol.xyz")), InputKind::Single);
        assert_eq!(InputKind::detect(Path::new("POSCAR")), InputKind::Single);
    }

    #[test]
    fn trajectory_frames_get_frame_foreign_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.extxyz");
        let mut buffer = Vec::new();
        ExtendedXyzFile::write_frames_to(&[dimer(0.0), dimer(0.1)], &mut buffer).unwrap();
        fs::write(&path, buffer).unwrap();

        let inputs = load_inputs(&path).unwrap();
        assert_eq!(inputs.len(), 2);
        assert_eq!(inputs[1].foreign_key, 2);
        assert_eq!(inputs[1].index, Some(2));
    }

    #[test]
    fn single_files_are_unindexed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("h2.xyz");
        ExtendedXyzFile::write_to_path(&dimer(0.0), &path).unwrap();
        let inputs = load_inputs(&path).unwrap();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].index, None);
        assert_eq!(inputs[0].foreign_key, 1);
    }

    #[test]
    fn database_rows_keep_inherited_foreign_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("in.json");
        let mut db = StructureDatabase::connect(&path).unwrap();
        db.write(&dimer(0.0), Energies::default(), KeyValuePairs::new()).unwrap();
        let mut kv = KeyValuePairs::new();
        kv.insert("foreignkey".into(), KeyValue::Int(7));
        db.write(&dimer(0.2), Energies::default(), kv).unwrap();

        let inputs = load_inputs(&path).unwrap();
        assert_eq!(
            inputs.iter().map(|i| i.foreign_key).collect::<Vec<_>>(),
            vec![1, 7]
        );
    }

    #[test]
    fn failed_structure_is_recorded_without_energy() {
        let dir = tempdir().unwrap();
        let config = dftb_job(dir.path(), "in.json", "dftb+");
        let paths = JobPaths {
            input: dir.path().join("in.json"),
            output_database: dir.path().join("out.json"),
            output_root: dir.path().to_path_buf(),
        };
        let mut db = StructureDatabase::connect(&paths.output_database).unwrap();
        let calculator = FakeCalculator { failing: "2_h2" };

        for (i, offset) in [0.0, 0.3].into_iter().enumerate() {
            let input = InputStructure {
                structure: dimer(offset),
                foreign_key: i as i64 + 1,
                index: Some(i + 1),
            };
            let label = format!("{}_h2", i + 1);
            let outcome = run_structure(&calculator, &config, &input, &label, &paths, &mut db);
            assert_eq!(outcome.row_id, Some(i as u64 + 1));
        }

        let rows = db.select();
        assert_eq!(rows[0].energy, Some(-31.5));
        assert_eq!(rows[0].get("status"), Some(&KeyValue::from("ok")));
        assert_eq!(rows[0].get("parametrization"), Some(&KeyValue::from("GFN2")));
        assert_eq!(rows[1].energy, None);
        assert_eq!(rows[1].get("status"), Some(&KeyValue::from("failed")));
        assert_eq!(rows[1].foreign_key(), 2);
        assert_eq!(rows[1].to_structure(), dimer(0.3));
        assert!(dir.path().join("outputs/1_h2/input").exists());
    }

    #[test]
    fn batch_continues_after_engine_failures() {
        let dir = tempdir().unwrap();
        let db_dir = dir.path().join("db");
        fs::create_dir_all(&db_dir).unwrap();
        let mut input_db = StructureDatabase::connect(db_dir.join("in.json")).unwrap();
        input_db.write(&dimer(0.0), Energies::default(), KeyValuePairs::new()).unwrap();
        input_db.write(&dimer(0.5), Energies::default(), KeyValuePairs::new()).unwrap();

        // `false` exits non-zero without producing any output.
        let config = dftb_job(&db_dir, "in.json", "false");
        let summary = run(&config, &ProgressReporter::new()).unwrap();

        assert_eq!(summary.label, "h2_dftb_GFN2_sp");
        assert_eq!(summary.outcomes.len(), 2);
        assert_eq!(summary.failed(), 2);
        assert_eq!(summary.outcomes[0].label, "1_h2_dftb_GFN2_sp");
        assert_eq!(summary.output_database, db_dir.join("h2_dftb_GFN2_sp.json"));
        assert!(dir.path().join("outputs/2_h2_dftb_GFN2_sp/dftb_in.hsd").exists());

        let output = StructureDatabase::connect(&summary.output_database).unwrap();
        assert_eq!(output.len(), 2);
    }

    #[test]
    fn elapsed_time_is_formatted_as_clock() {
        assert_eq!(format_elapsed(Duration::from_secs(3 * 3600 + 4 * 60 + 5)), "03:04:05");
        assert_eq!(format_elapsed(Duration::from_secs(30 * 3600)), "30:00:00");
    }
}
