use super::error::DatabaseError;
use std::fs;
use std::path::{Path, PathBuf};

const DATABASE_EXTENSIONS: &[&str] = &["json", "db"];

/// A database file found in a folder, with its stable listing index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseEntry {
    pub index: usize,
    pub path: PathBuf,
}

impl DatabaseEntry {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

pub fn is_database_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| DATABASE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
}

/// Lists the databases in `folder`, sorted by file name and numbered from 0.
pub fn find_databases(folder: &Path) -> Result<Vec<DatabaseEntry>, DatabaseError> {
    let io_err = |source| DatabaseError::Io {
        path: folder.to_path_buf(),
        source,
    };
    let mut paths = Vec::new();
    for entry in fs::read_dir(folder).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_file() && is_database_path(&path) {
            paths.push(path);
        }
    }
    paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    Ok(paths
        .into_iter()
        .enumerate()
        .map(|(index, path)| DatabaseEntry { index, path })
        .collect())
}

/// Picks one database by listing index or by a substring of its file name.
pub fn select_database<'a>(
    selector: &str,
    entries: &'a [DatabaseEntry],
) -> Result<&'a DatabaseEntry, DatabaseError> {
    if let Ok(index) = selector.trim().parse::<usize>() {
        if let Some(entry) = entries.iter().find(|e| e.index == index) {
            return Ok(entry);
        }
    }

    let matches: Vec<&DatabaseEntry> = entries
        .iter()
        .filter(|e| e.file_name().contains(selector))
        .collect();
    match matches.as_slice() {
        [entry] => Ok(entry),
        [] => Err(DatabaseError::Selection(format!(
            "no database matches '{}'",
            selector
        ))),
        many => {
            let names: Vec<String> = many.iter().map(|e| e.file_name()).collect();
            Err(DatabaseError::Selection(format!(
                "'{}' is ambiguous, it matches {}",
                selector,
                names.join(", ")
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn populated() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        for name in [
            "scan_dftb_GFN2.json",
            "bulk_vasp_PBE_D3.db",
            "notes.txt",
            "scan_gaussian_B3LYP.json",
        ] {
            fs::write(dir.path().join(name), "").unwrap();
        }
        fs::create_dir(dir.path().join("outputs.json")).unwrap();
        dir
    }

    #[test]
    fn databases_are_listed_sorted_by_name() {
        let dir = populated();
        let entries = find_databases(dir.path()).unwrap();
        let names: Vec<String> = entries.iter().map(|e| e.file_name()).collect();
        assert_eq!(
            names,
            vec![
                "bulk_vasp_PBE_D3.db",
                "scan_dftb_GFN2.json",
                "scan_gaussian_B3LYP.json"
            ]
        );
        assert_eq!(entries[2].index, 2);
    }

    #[test]
    fn selection_by_index_or_unique_substring() {
        let dir = populated();
        let entries = find_databases(dir.path()).unwrap();
        assert_eq!(select_database("1", &entries).unwrap().stem(), "scan_dftb_GFN2");
        assert_eq!(
            select_database("gaussian", &entries).unwrap().stem(),
            "scan_gaussian_B3LYP"
        );
    }

    #[test]
    fn ambiguous_or_missing_selection_is_an_error() {
        let dir = populated();
        let entries = find_databases(dir.path()).unwrap();
        assert!(matches!(
            select_database("scan", &entries),
            Err(DatabaseError::Selection(_))
        ));
        assert!(matches!(
            select_database("cp2k", &entries),
            Err(DatabaseError::Selection(_))
        ));
    }
}
