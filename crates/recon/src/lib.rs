//! `verirun-recon`: cross-version table comparison engine.
//!
//! Pure engine crate: receives fully materialized output tables per version,
//! returns structured, tolerance-aware differences. No CLI or IO dependencies.

pub mod aggregate;
pub mod compare;
pub mod error;
pub mod model;
pub mod summary;

pub use aggregate::aggregate;
pub use compare::{compare, compare_data, CompareOptions, TOLERANCE};
pub use error::ReconError;
pub use model::{
    CandidateComparison, Column, ColumnDifference, ColumnValues, ComparisonSummary, DiffStats,
    Shape, SummaryRow, SummaryStatus, TableComparison, TableData, TableDataset, TableDiff,
    VersionResults, VersionSet,
};
