use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Input: output tables
// ---------------------------------------------------------------------------

/// Values of one column. Numeric columns participate in differencing,
/// text columns only count towards the table shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "values", rename_all = "snake_case")]
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match self {
            Self::Numeric(v) => Some(v),
            Self::Text(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    #[serde(flatten)]
    pub values: ColumnValues,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Text(values),
        }
    }
}

/// (rows, columns). Displays as `(100, 5)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Shape {
    pub rows: usize,
    pub columns: usize,
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.rows, self.columns)
    }
}

/// A rectangular, column-oriented result set for one run of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableData {
    columns: Vec<Column>,
    row_count: usize,
}

impl TableData {
    /// Build a table, rejecting ragged or duplicate columns.
    pub fn new(columns: Vec<Column>) -> Result<Self, ReconError> {
        let row_count = columns.first().map(|c| c.values.len()).unwrap_or(0);
        let mut seen = HashSet::new();
        for col in &columns {
            if !seen.insert(col.name.as_str()) {
                return Err(ReconError::DuplicateColumn(col.name.clone()));
            }
            if col.values.len() != row_count {
                return Err(ReconError::RaggedColumn {
                    column: col.name.clone(),
                    expected: row_count,
                    found: col.values.len(),
                });
            }
        }
        Ok(Self { columns, row_count })
    }

    /// A table with named columns but no rows (all columns untyped).
    pub fn empty(names: &[&str]) -> Self {
        Self {
            columns: names.iter().map(|n| Column::text(*n, Vec::new())).collect(),
            row_count: 0,
        }
    }

    pub fn shape(&self) -> Shape {
        Shape {
            rows: self.row_count,
            columns: self.columns.len(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// One table as retrieved for one run. `Missing` is a valid value: the fetch
/// failed, and the comparison reports it instead of aborting.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TableDataset {
    Loaded { data: TableData },
    Missing { reason: String },
}

impl TableDataset {
    pub fn loaded(data: TableData) -> Self {
        Self::Loaded { data }
    }

    pub fn missing(reason: impl Into<String>) -> Self {
        Self::Missing {
            reason: reason.into(),
        }
    }

    pub fn data(&self) -> Option<&TableData> {
        match self {
            Self::Loaded { data } => Some(data),
            Self::Missing { .. } => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing { .. })
    }
}

/// All tables gathered for one version's run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct VersionResults {
    pub version: String,
    pub tables: BTreeMap<String, TableDataset>,
}

impl VersionResults {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            tables: BTreeMap::new(),
        }
    }

    pub fn with_table(mut self, name: impl Into<String>, dataset: TableDataset) -> Self {
        self.tables.insert(name.into(), dataset);
        self
    }

    /// True when at least one table entry exists, loaded or missing.
    pub fn has_tables(&self) -> bool {
        !self.tables.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Per-pair comparison
// ---------------------------------------------------------------------------

/// Signed-difference statistics of one column (`candidate - baseline`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DiffDistribution {
    pub min_diff: f64,
    pub max_diff: f64,
    pub median_diff: f64,
    pub mean_diff: f64,
}

/// Present only for columns with at least one differing cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDifference {
    pub column: String,
    pub diff_count: usize,
    pub diff_percent: f64,
    /// `None` only when no cell pair had two defined values (nulls kept as nulls).
    #[serde(flatten)]
    pub distribution: Option<DiffDistribution>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffStats {
    pub total_values: usize,
    pub total_differences: usize,
    pub difference_percent: f64,
    pub column_differences: Vec<ColumnDifference>,
}

impl DiffStats {
    pub fn column(&self, name: &str) -> Option<&ColumnDifference> {
        self.column_differences.iter().find(|c| c.column == name)
    }
}

/// Outcome of comparing one baseline table against one candidate table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TableDiff {
    /// Either side failed to load. Not a difference.
    MissingData,
    /// Row/column counts differ. Always a difference.
    ShapeMismatch { baseline: Shape, candidate: Shape },
    /// Shapes agree but no numeric column is shared. Not a difference.
    NoNumericColumns,
    Compared(DiffStats),
}

impl TableDiff {
    pub fn has_differences(&self) -> bool {
        match self {
            Self::MissingData | Self::NoNumericColumns => false,
            Self::ShapeMismatch { .. } => true,
            Self::Compared(stats) => stats.total_differences > 0,
        }
    }

    /// Placeholder message for the non-numeric outcomes.
    pub fn error(&self) -> Option<String> {
        match self {
            Self::MissingData => Some("Missing data for comparison".to_string()),
            Self::ShapeMismatch {
                baseline,
                candidate,
            } => Some(format!("Shape mismatch: {baseline} vs {candidate}")),
            Self::NoNumericColumns => Some("No numeric columns to compare".to_string()),
            Self::Compared(_) => None,
        }
    }

    pub fn stats(&self) -> Option<&DiffStats> {
        match self {
            Self::Compared(stats) => Some(stats),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Cross-version output
// ---------------------------------------------------------------------------

/// Explicit baseline/candidate split of the participating versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionSet {
    pub baseline: String,
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateComparison {
    pub version: String,
    pub diff: TableDiff,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableComparison {
    pub table_name: String,
    pub baseline: String,
    /// Candidates in submission order.
    pub candidates: Vec<CandidateComparison>,
    pub has_differences: bool,
}

impl TableComparison {
    pub fn candidate(&self, version: &str) -> Option<&TableDiff> {
        self.candidates
            .iter()
            .find(|c| c.version == version)
            .map(|c| &c.diff)
    }
}

/// One row of the flattened view: one table x one candidate version.
/// Error rows carry `error` and leave the numeric fields empty.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryRow {
    pub table_name: String,
    pub version_comparison: String,
    /// Verdict of this baseline/candidate pair alone. The table-level flag
    /// is `TableComparison::has_differences`.
    pub has_differences: bool,
    pub error: Option<String>,
    pub total_values: Option<usize>,
    pub total_differences: Option<usize>,
    pub difference_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SummaryStatus {
    Compared,
    /// Fewer than two versions produced any table.
    InsufficientVersions { usable: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparisonSummary {
    pub status: SummaryStatus,
    pub versions: Option<VersionSet>,
    pub tables: Vec<TableComparison>,
    pub rows: Vec<SummaryRow>,
}

impl ComparisonSummary {
    pub fn insufficient(usable: usize) -> Self {
        Self {
            status: SummaryStatus::InsufficientVersions { usable },
            versions: None,
            tables: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn tables_with_differences(&self) -> usize {
        self.tables.iter().filter(|t| t.has_differences).count()
    }

    pub fn has_differences(&self) -> bool {
        self.tables.iter().any(|t| t.has_differences)
    }

    pub fn table(&self, name: &str) -> Option<&TableComparison> {
        self.tables.iter().find(|t| t.table_name == name)
    }
}
