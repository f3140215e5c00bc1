// Output table retrieval for one run

use std::collections::HashMap;

use rusqlite::types::Value;
use rusqlite::Connection;
use tracing::debug;
use verirun_recon::{Column, TableData};

use crate::error::StoreError;
use crate::store::OutputStore;

/// Filter column of every output table. Dropped from fetched datasets.
pub const RUN_ID_COLUMN: &str = "run_id";

impl OutputStore {
    /// All rows of `table` belonging to `run_id`, in store order.
    pub fn fetch_table(&self, table: &str, run_id: i64) -> Result<TableData, StoreError> {
        if !is_identifier(table) {
            return Err(StoreError::InvalidTableName(table.to_string()));
        }

        let context = format!("table '{table}'");
        let sql = format!("SELECT * FROM \"{table}\" WHERE {RUN_ID_COLUMN} = ?1");
        let mut stmt = self
            .conn()
            .prepare(&sql)
            .map_err(StoreError::query(context.clone()))?;

        let declared = self.declared_affinities(table);
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut cells: Vec<Vec<Value>> = vec![Vec::new(); names.len()];

        let mut rows = stmt.query([run_id]).map_err(StoreError::query(context.clone()))?;
        while let Some(row) = rows.next().map_err(StoreError::query(context.clone()))? {
            for (i, col) in cells.iter_mut().enumerate() {
                col.push(row.get::<_, Value>(i).map_err(StoreError::query(context.clone()))?);
            }
        }

        let columns: Vec<Column> = names
            .into_iter()
            .zip(cells)
            .filter(|(name, _)| !name.eq_ignore_ascii_case(RUN_ID_COLUMN))
            .map(|(name, values)| {
                let affinity = declared
                    .get(&name.to_ascii_lowercase())
                    .copied()
                    .unwrap_or(Affinity::Undeclared);
                typed_column(name, values, affinity)
            })
            .collect();

        let data = TableData::new(columns)?;
        debug!(table, run_id, shape = %data.shape(), "fetched table");
        Ok(data)
    }

    /// Column affinities from the table's declared schema, keyed by
    /// lowercased column name. Empty when the schema can't be read.
    fn declared_affinities(&self, table: &str) -> HashMap<String, Affinity> {
        read_affinities(self.conn(), table).unwrap_or_else(|e| {
            debug!(table, error = %e, "declared column types unavailable");
            HashMap::new()
        })
    }
}

fn read_affinities(conn: &Connection, table: &str) -> rusqlite::Result<HashMap<String, Affinity>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{table}\")"))?;
    let rows = stmt.query_map([], |row| {
        let name: String = row.get("name")?;
        let decl: Option<String> = row.get("type")?;
        Ok((name.to_ascii_lowercase(), Affinity::of(decl.as_deref().unwrap_or(""))))
    })?;
    let affinities = rows.collect::<rusqlite::Result<HashMap<_, _>>>()?;
    Ok(affinities)
}

/// Type affinity of a declared column, following SQLite's rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Affinity {
    /// INTEGER, REAL or NUMERIC.
    Numeric,
    Text,
    /// BLOB or no declared type.
    Undeclared,
}

impl Affinity {
    fn of(decl: &str) -> Self {
        let decl = decl.to_ascii_uppercase();
        if decl.contains("INT") {
            Self::Numeric
        } else if ["CHAR", "CLOB", "TEXT"].iter().any(|t| decl.contains(t)) {
            Self::Text
        } else if decl.is_empty() || decl.contains("BLOB") {
            Self::Undeclared
        } else {
            Self::Numeric
        }
    }
}

/// A declared numeric column is numeric unless it holds a text or blob
/// value, even when every cell of the run is null. An undeclared column is
/// numeric iff it has at least one non-null value and every non-null value
/// is INTEGER or REAL. Anything else is rendered as text.
fn typed_column(name: String, values: Vec<Value>, affinity: Affinity) -> Column {
    let mut any_value = false;
    let numeric = values.iter().all(|v| match v {
        Value::Null => true,
        Value::Integer(_) | Value::Real(_) => {
            any_value = true;
            true
        }
        Value::Text(_) | Value::Blob(_) => false,
    });

    let is_numeric = match affinity {
        Affinity::Numeric => numeric,
        Affinity::Text => false,
        Affinity::Undeclared => numeric && any_value,
    };

    if is_numeric {
        Column::numeric(
            name,
            values
                .into_iter()
                .map(|v| match v {
                    Value::Integer(i) => Some(i as f64),
                    Value::Real(r) => Some(r),
                    _ => None,
                })
                .collect(),
        )
    } else {
        Column::text(
            name,
            values
                .into_iter()
                .map(|v| match v {
                    Value::Null => None,
                    Value::Integer(i) => Some(i.to_string()),
                    Value::Real(r) => Some(r.to_string()),
                    Value::Text(s) => Some(s),
                    Value::Blob(b) => Some(String::from_utf8_lossy(&b).into_owned()),
                })
                .collect(),
        )
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
