use std::path::PathBuf;

use thiserror::Error;
use verirun_recon::ReconError;

#[derive(Debug, Error)]
pub enum StoreError {
    /// None of the candidate database paths exist.
    #[error("can't find the model database for '{model}' under {}", root.display())]
    NotFound { root: PathBuf, model: String },
    #[error("cannot open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    /// Table names are spliced into SQL and must be plain identifiers.
    #[error("invalid table name '{0}'")]
    InvalidTableName(String),
    #[error("run '{0}' not found in run_lst")]
    RunNotFound(String),
    #[error("no runs recorded in run_lst")]
    NoRuns,
    #[error("{context}: {source}")]
    Query {
        context: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("malformed result set: {0}")]
    Malformed(#[from] ReconError),
}

impl StoreError {
    pub(crate) fn query(context: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> Self {
        let context = context.into();
        move |source| Self::Query { context, source }
    }
}
