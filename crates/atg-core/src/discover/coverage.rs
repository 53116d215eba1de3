//! Coverage-database query: joins `functions` →
//! `instrumented_files` → `source_files` in the per-environment
//! `cover.db`, preserving result order so downstream merge output stays
//! deterministic.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use rusqlite::Connection;

use crate::error::{AtgError, Result};

const UNITS_TO_FUNCTIONS_QUERY: &str = "
SELECT source_files.path,
       functions.name
FROM   functions
       JOIN instrumented_files
         ON instrumented_files.id = functions.instrumented_file_id
       JOIN source_files
         ON source_files.id = instrumented_files.source_file_id
";

/// `unit source path -> ordered routine names`, in query result order.
pub fn units_to_functions(db_path: &Path) -> Result<BTreeMap<PathBuf, Vec<String>>> {
    let conn = Connection::open(db_path)
        .map_err(|e| AtgError::io(db_path, std::io::Error::other(e.to_string())))?;

    let mut stmt = conn
        .prepare(UNITS_TO_FUNCTIONS_QUERY)
        .map_err(|e| AtgError::configuration(format!("bad coverage query: {e}")))?;

    let rows = stmt
        .query_map([], |row| {
            let path: String = row.get(0)?;
            let name: String = row.get(1)?;
            Ok((path, name))
        })
        .map_err(|e| AtgError::configuration(format!("coverage query failed: {e}")))?;

    // Routine order within each unit must match query order; the outer
    // map's own key order doesn't matter (unit paths are deduped, not
    // sequenced).
    let mut result: BTreeMap<PathBuf, Vec<String>> = BTreeMap::new();
    for row in rows {
        let (path, name) = row.map_err(|e| AtgError::configuration(format!("row decode error: {e}")))?;
        result.entry(PathBuf::from(path)).or_default().push(name);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_test_db(dir: &Path) -> PathBuf {
        let db_path = dir.join("cover.db");
        let conn = Connection::open(&db_path).unwrap();
        conn.execute_batch(
            "
            CREATE TABLE source_files (id INTEGER PRIMARY KEY, path TEXT);
            CREATE TABLE instrumented_files (id INTEGER PRIMARY KEY, source_file_id INTEGER);
            CREATE TABLE functions (id INTEGER PRIMARY KEY, instrumented_file_id INTEGER, name TEXT);

            INSERT INTO source_files VALUES (1, 'src/a.c');
            INSERT INTO instrumented_files VALUES (10, 1);
            INSERT INTO functions VALUES (100, 10, 'first_routine');
            INSERT INTO functions VALUES (101, 10, 'second_routine');
            ",
        )
        .unwrap();
        db_path
    }

    #[test]
    fn joins_functions_to_source_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = build_test_db(dir.path());
        let result = units_to_functions(&db_path).unwrap();
        let routines = result.get(&PathBuf::from("src/a.c")).unwrap();
        assert_eq!(routines, &vec!["first_routine".to_string(), "second_routine".to_string()]);
    }

    #[test]
    fn missing_database_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.db");
        // rusqlite lazily creates the file on open, so point at a path
        // whose parent does not exist to force a real I/O failure.
        let bogus = dir.path().join("missing-parent").join("cover.db");
        let err = units_to_functions(&bogus).unwrap_err();
        assert!(matches!(err, AtgError::Io { .. }));
        let _ = missing;
    }
}
