use crate::cli::{DbArgs, DbCommands};
use crate::error::Result;
use qcdispatch::core::database::discovery::{self, DatabaseEntry};
use qcdispatch::core::database::{Row, StructureDatabase};
use std::path::Path;
use tracing::info;

pub async fn run(args: DbArgs) -> Result<()> {
    match args.command {
        DbCommands::List { folder } => list(&folder),
        DbCommands::Show { selector, folder } => show(&selector, &folder),
    }
}

fn list(folder: &Path) -> Result<()> {
    let entries = discovery::find_databases(folder)?;
    if entries.is_empty() {
        println!("No databases found in {}", folder.display());
        return Ok(());
    }
    println!("Databases in {}:", folder.display());
    for entry in &entries {
        println!("{:>4}  {}", entry.index, entry.file_name());
    }
    Ok(())
}

fn show(selector: &str, folder: &Path) -> Result<()> {
    let entries = discovery::find_databases(folder)?;
    let entry = discovery::select_database(selector, &entries)?;
    info!("Selected database {}", entry.path.display());

    let db = StructureDatabase::connect(&entry.path)?;
    println!("{} ({} rows)", entry.file_name(), db.len());
    for row in db.select() {
        println!("{}", describe_row(row, entry));
    }
    Ok(())
}

/// One listing line: id, name (or the database stem), atom count and energy.
fn describe_row(row: &Row, entry: &DatabaseEntry) -> String {
    let name = row
        .get("name")
        .map(ToString::to_string)
        .unwrap_or_else(|| entry.stem());
    let energy = row
        .energy
        .map(|e| format!("{:.6} eV", e))
        .unwrap_or_else(|| "-".to_string());
    let status = row
        .get("status")
        .map(ToString::to_string)
        .unwrap_or_default();
    format!(
        "{:>4}  {:<24} {:>5} atoms  {:>18}  {}",
        row.id,
        name,
        row.symbols.len(),
        energy,
        status
    )
    .trim_end()
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcdispatch::core::database::{Energies, KeyValue, KeyValuePairs};
    use qcdispatch::core::models::structure::Structure;
    use nalgebra::Point3;
    use tempfile::tempdir;

    fn water_db(path: &Path) -> StructureDatabase {
        let mut db = StructureDatabase::connect(path).unwrap();
        let water = Structure::new(
            vec!["O".into(), "H".into(), "H".into()],
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(0.96, 0.0, 0.0),
                Point3::new(-0.24, 0.93, 0.0),
            ],
        );
        let mut kv = KeyValuePairs::new();
        kv.insert("name".into(), KeyValue::from("1_water_dftb_GFN2_opt"));
        kv.insert("status".into(), KeyValue::from("ok"));
        db.write(
            &water,
            Energies {
                energy: Some(-137.25),
                free_energy: None,
            },
            kv,
        )
        .unwrap();
        db.write(&water, Energies::default(), KeyValuePairs::new())
            .unwrap();
        db
    }

    #[test]
    fn rows_fall_back_to_the_database_stem() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("water_dftb_GFN2_opt.json");
        let db = water_db(&path);
        let entry = DatabaseEntry { index: 0, path };

        let named = describe_row(&db.select()[0], &entry);
        assert!(named.starts_with("   1  1_water_dftb_GFN2_opt"));
        assert!(named.contains("-137.250000 eV"));
        assert!(named.ends_with("ok"));

        let unnamed = describe_row(&db.select()[1], &entry);
        assert!(unnamed.contains("water_dftb_GFN2_opt"));
        assert!(unnamed.ends_with('-'));
    }

    #[tokio::test]
    async fn show_selects_by_fragment() {
        let dir = tempdir().unwrap();
        water_db(&dir.path().join("water_dftb_GFN2_opt.json"));
        water_db(&dir.path().join("water_vasp_PBE_sp.json"));

        let args = DbArgs {
            command: DbCommands::Show {
                selector: "vasp".into(),
                folder: dir.path().to_path_buf(),
            },
        };
        run(args).await.unwrap();

        let ambiguous = DbArgs {
            command: DbCommands::Show {
                selector: "water".into(),
                folder: dir.path().to_path_buf(),
            },
        };
        assert!(run(ambiguous).await.is_err());
    }
}
