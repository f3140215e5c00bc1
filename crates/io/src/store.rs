// Model database handle for one version

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags, OptionalExtension};
use tracing::debug;

use crate::error::StoreError;

/// Relative locations of a model database under a version root, tried in order.
const DB_CANDIDATES: &[&str] = &[
    "models/{model}.db",
    "models/bin/{model}.sqlite",
    "models/{model}.sqlite",
];

/// `run_lst` columns a non-numeric run identifier may match, tried in order.
/// Older schemas lack `run_stamp`; a failing lookup falls through.
const RUN_LOOKUP_COLUMNS: &[&str] = &["run_stamp", "run_digest", "run_name"];

/// Read-only handle on one version's output table store.
pub struct OutputStore {
    path: PathBuf,
    conn: Connection,
}

impl std::fmt::Debug for OutputStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputStore").field("path", &self.path).finish()
    }
}

impl OutputStore {
    /// Locate and open `<model>`'s database under a version root.
    pub fn open(version_root: &Path, model: &str) -> Result<Self, StoreError> {
        let path = locate(version_root, model).ok_or_else(|| StoreError::NotFound {
            root: version_root.to_path_buf(),
            model: model.to_string(),
        })?;
        Self::open_path(&path)
    }

    /// Open a database file directly.
    pub fn open_path(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|source| StoreError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "opened output store");
        Ok(Self {
            path: path.to_path_buf(),
            conn,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Highest `run_id` in `run_lst`.
    pub fn latest_run_id(&self) -> Result<i64, StoreError> {
        let latest: Option<i64> = self
            .conn
            .query_row("SELECT MAX(run_id) FROM run_lst", [], |row| row.get(0))
            .map_err(StoreError::query("latest run"))?;
        latest.ok_or(StoreError::NoRuns)
    }

    /// Map a run identifier to the store's integer `run_id`.
    ///
    /// Integers are taken as-is. Anything else (stamp, digest, name) is
    /// looked up in `run_lst`, newest match first.
    pub fn resolve_run(&self, identifier: &str) -> Result<i64, StoreError> {
        let trimmed = identifier.trim();
        if let Ok(id) = trimmed.parse::<i64>() {
            return Ok(id);
        }

        for column in RUN_LOOKUP_COLUMNS {
            let sql = format!(
                "SELECT run_id FROM run_lst WHERE {column} = ?1 ORDER BY run_id DESC LIMIT 1"
            );
            match self
                .conn
                .query_row(&sql, [trimmed], |row| row.get::<_, i64>(0))
                .optional()
            {
                Ok(Some(id)) => {
                    debug!(identifier = trimmed, column, run_id = id, "resolved run");
                    return Ok(id);
                }
                Ok(None) => {}
                Err(e) => debug!(column, error = %e, "run lookup column unavailable"),
            }
        }

        Err(StoreError::RunNotFound(trimmed.to_string()))
    }
}

fn locate(root: &Path, model: &str) -> Option<PathBuf> {
    DB_CANDIDATES
        .iter()
        .map(|pattern| root.join(pattern.replace("{model}", model)))
        .find(|p| p.is_file())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Minimal model database: catalog tables, two runs, one output table.
    pub(crate) fn model_db(dir: &Path, relative: &str) -> PathBuf {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE run_lst (
                run_id INTEGER PRIMARY KEY,
                run_name TEXT,
                run_digest TEXT,
                run_stamp TEXT,
                create_dt TEXT,
                update_dt TEXT,
                run_status TEXT
            );
            INSERT INTO run_lst VALUES (101, 'TestRun_1', 'dig-a', '2026_01_01_10_00_00_000', '2026-01-01 10:00:00', '2026-01-01 10:05:00', 's');
            INSERT INTO run_lst VALUES (102, 'TestRun_2', 'dig-b', '2026_01_02_10_00_00_000', '2026-01-02 10:00:00', '2026-01-02 10:05:00', 'e');

            CREATE TABLE table_dic (table_hid INTEGER PRIMARY KEY, table_name TEXT, table_digest TEXT);
            INSERT INTO table_dic VALUES (1, 'Mortality', 'tdig-m');
            INSERT INTO table_dic VALUES (2, 'Income', 'tdig-i');

            CREATE TABLE table_dic_txt (table_hid INTEGER, lang_id INTEGER, descr TEXT);
            INSERT INTO table_dic_txt VALUES (2, 0, 'Income by age');
            INSERT INTO table_dic_txt VALUES (2, 1, 'Revenu par age');

            CREATE TABLE Income (run_id INTEGER, dim0 INTEGER, label TEXT, expr_value REAL, count_value INTEGER);
            INSERT INTO Income VALUES (101, 0, 'young', 1.5, 10);
            INSERT INTO Income VALUES (101, 1, 'old', NULL, 20);
            INSERT INTO Income VALUES (102, 0, 'young', 9.0, 1);
            "#,
        )
        .unwrap();
        path
    }

    #[test]
    fn locates_candidate_paths_in_order() {
        let dir = TempDir::new().unwrap();
        model_db(dir.path(), "models/bin/RiskPaths.sqlite");
        let store = OutputStore::open(dir.path(), "RiskPaths").unwrap();
        assert!(store.path().ends_with("models/bin/RiskPaths.sqlite"));

        model_db(dir.path(), "models/RiskPaths.db");
        let store = OutputStore::open(dir.path(), "RiskPaths").unwrap();
        assert!(store.path().ends_with("models/RiskPaths.db"));
    }

    #[test]
    fn missing_database_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = OutputStore::open(dir.path(), "Nope").unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(err.to_string().contains("Nope"));
    }

    #[test]
    fn latest_run() {
        let dir = TempDir::new().unwrap();
        let path = model_db(dir.path(), "models/M.db");
        let store = OutputStore::open_path(&path).unwrap();
        assert_eq!(store.latest_run_id().unwrap(), 102);
    }

    #[test]
    fn resolve_run_by_id_stamp_digest_and_name() {
        let dir = TempDir::new().unwrap();
        let path = model_db(dir.path(), "models/M.db");
        let store = OutputStore::open_path(&path).unwrap();

        assert_eq!(store.resolve_run("101").unwrap(), 101);
        assert_eq!(store.resolve_run("2026_01_02_10_00_00_000").unwrap(), 102);
        assert_eq!(store.resolve_run("dig-a").unwrap(), 101);
        assert_eq!(store.resolve_run("TestRun_2").unwrap(), 102);
        assert!(matches!(store.resolve_run("ghost"), Err(StoreError::RunNotFound(_))));
    }

    #[test]
    fn resolve_run_without_stamp_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("old.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE run_lst (run_id INTEGER, run_name TEXT, run_digest TEXT);
             INSERT INTO run_lst VALUES (7, 'legacy', 'dig-7');",
        )
        .unwrap();
        drop(conn);

        let store = OutputStore::open_path(&path).unwrap();
        assert_eq!(store.resolve_run("dig-7").unwrap(), 7);
    }

    #[test]
    fn empty_run_list_has_no_latest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch("CREATE TABLE run_lst (run_id INTEGER);")
            .unwrap();
        let store = OutputStore::open_path(&path).unwrap();
        assert!(matches!(store.latest_run_id(), Err(StoreError::NoRuns)));
    }
}
