use std::cell::RefCell;
use std::path::{Path, PathBuf};

use verirun_io::{OutputStore, StoreError};
use verirun_recon::TableData;

/// Retrieves one output table of one run.
pub trait TableFetcher {
    /// `run_id` is the identifier the execution service reported.
    fn fetch(&self, table: &str, run_id: &str) -> Result<TableData, StoreError>;
}

impl TableFetcher for OutputStore {
    fn fetch(&self, table: &str, run_id: &str) -> Result<TableData, StoreError> {
        let id = self.resolve_run(run_id)?;
        self.fetch_table(table, id)
    }
}

/// A version's model database, opened on first use.
///
/// The database may not exist until the version's first run finishes, so a
/// failed open is retried on the next call.
pub struct VersionStore {
    root: PathBuf,
    model: String,
    store: RefCell<Option<OutputStore>>,
}

impl VersionStore {
    pub fn new(root: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            model: model.into(),
            store: RefCell::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_table_names(&self) -> Result<Vec<String>, StoreError> {
        self.with_store(|store| store.output_table_names())
    }

    fn with_store<T>(
        &self,
        f: impl FnOnce(&OutputStore) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut slot = self.store.borrow_mut();
        if slot.is_none() {
            *slot = Some(OutputStore::open(&self.root, &self.model)?);
        }
        match slot.as_ref() {
            Some(store) => f(store),
            None => Err(StoreError::NotFound {
                root: self.root.clone(),
                model: self.model.clone(),
            }),
        }
    }
}

impl TableFetcher for VersionStore {
    fn fetch(&self, table: &str, run_id: &str) -> Result<TableData, StoreError> {
        self.with_store(|store| store.fetch(table, run_id))
    }
}
