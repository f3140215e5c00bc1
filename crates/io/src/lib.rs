// Output table store access (per-version model database)

pub mod catalog;
pub mod error;
pub mod store;
pub mod table;

pub use catalog::{ModelRun, OutputTableInfo};
pub use error::StoreError;
pub use store::OutputStore;
