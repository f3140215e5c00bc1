use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ReconError {
    /// Columns of one table disagree on row count.
    #[error("column '{column}' has {found} rows, expected {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        found: usize,
    },
    /// The same column name appears twice in one table.
    #[error("duplicate column '{0}'")]
    DuplicateColumn(String),
}
