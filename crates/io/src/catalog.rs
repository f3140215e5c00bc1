// Table catalog and run list of a model database

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::OutputStore;

pub const NO_DESCRIPTION: &str = "No description available";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputTableInfo {
    pub name: String,
    pub digest: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelRun {
    pub run_id: i64,
    pub run_name: String,
    pub run_digest: Option<String>,
    pub create_dt: Option<String>,
    pub update_dt: Option<String>,
    pub run_status: Option<String>,
}

impl OutputStore {
    /// Output tables from `table_dic`, ordered by name.
    ///
    /// Descriptions come from `table_dic_txt` (language 0). A store without
    /// that table still lists its tables, with a placeholder description.
    pub fn list_output_tables(&self) -> Result<Vec<OutputTableInfo>, StoreError> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT table_hid, table_name, table_digest FROM table_dic ORDER BY table_name",
            )
            .map_err(StoreError::query("table_dic"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(StoreError::query("table_dic"))?;

        let mut tables = Vec::new();
        for row in rows {
            tables.push(row.map_err(StoreError::query("table_dic"))?);
        }

        let descriptions = match self.table_descriptions() {
            Ok(d) => d,
            Err(e) => {
                debug!(error = %e, "could not get table descriptions");
                HashMap::new()
            }
        };

        let tables: Vec<OutputTableInfo> = tables
            .into_iter()
            .map(|(hid, name, digest)| OutputTableInfo {
                description: descriptions
                    .get(&hid)
                    .cloned()
                    .unwrap_or_else(|| NO_DESCRIPTION.to_string()),
                name,
                digest: digest.unwrap_or_default(),
            })
            .collect();

        info!(count = tables.len(), "found output tables");
        Ok(tables)
    }

    /// Names only, in catalog order.
    pub fn output_table_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.list_output_tables()?.into_iter().map(|t| t.name).collect())
    }

    fn table_descriptions(&self) -> Result<HashMap<i64, String>, StoreError> {
        let mut stmt = self
            .conn()
            .prepare("SELECT table_hid, descr FROM table_dic_txt WHERE lang_id = 0")
            .map_err(StoreError::query("table_dic_txt"))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, Option<String>>(1)?)))
            .map_err(StoreError::query("table_dic_txt"))?;

        let mut out = HashMap::new();
        for row in rows {
            if let (hid, Some(descr)) = row.map_err(StoreError::query("table_dic_txt"))? {
                out.insert(hid, descr);
            }
        }
        Ok(out)
    }

    /// All runs, newest first.
    pub fn list_runs(&self) -> Result<Vec<ModelRun>, StoreError> {
        let mut stmt = self
            .conn()
            .prepare(
                "SELECT run_id, run_name, run_digest, create_dt, update_dt, run_status
                 FROM run_lst ORDER BY create_dt DESC",
            )
            .map_err(StoreError::query("run_lst"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ModelRun {
                    run_id: row.get(0)?,
                    run_name: row.get::<_, Option<String>>(1)?.unwrap_or_default(),
                    run_digest: row.get(2)?,
                    create_dt: row.get(3)?,
                    update_dt: row.get(4)?,
                    run_status: row.get(5)?,
                })
            })
            .map_err(StoreError::query("run_lst"))?;

        let mut runs = Vec::new();
        for run in rows {
            runs.push(run.map_err(StoreError::query("run_lst"))?);
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::model_db;
    use rusqlite::Connection;
    use tempfile::TempDir;

    #[test]
    fn tables_sorted_with_descriptions() {
        let dir = TempDir::new().unwrap();
        let store = OutputStore::open_path(&model_db(dir.path(), "m.db")).unwrap();
        let tables = store.list_output_tables().unwrap();

        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "Income");
        assert_eq!(tables[0].digest, "tdig-i");
        assert_eq!(tables[0].description, "Income by age");
        assert_eq!(tables[1].name, "Mortality");
        assert_eq!(tables[1].description, NO_DESCRIPTION);
        assert_eq!(store.output_table_names().unwrap(), vec!["Income", "Mortality"]);
    }

    #[test]
    fn tables_without_description_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bare.db");
        Connection::open(&path)
            .unwrap()
            .execute_batch(
                "CREATE TABLE table_dic (table_hid INTEGER, table_name TEXT, table_digest TEXT);
                 INSERT INTO table_dic VALUES (1, 'B', 'x');
                 INSERT INTO table_dic VALUES (2, 'A', NULL);",
            )
            .unwrap();
        let store = OutputStore::open_path(&path).unwrap();
        let tables = store.list_output_tables().unwrap();
        assert_eq!(tables[0].name, "A");
        assert_eq!(tables[0].digest, "");
        assert!(tables.iter().all(|t| t.description == NO_DESCRIPTION));
    }

    #[test]
    fn missing_catalog_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nothing.db");
        Connection::open(&path).unwrap().execute_batch("CREATE TABLE x (a INTEGER);").unwrap();
        let store = OutputStore::open_path(&path).unwrap();
        assert!(matches!(store.list_output_tables(), Err(StoreError::Query { .. })));
    }

    #[test]
    fn runs_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = OutputStore::open_path(&model_db(dir.path(), "m.db")).unwrap();
        let runs = store.list_runs().unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].run_id, 102);
        assert_eq!(runs[0].run_status.as_deref(), Some("e"));
        assert_eq!(runs[1].run_name, "TestRun_1");
    }
}
