//! Flattened tabular view of a comparison: one row per table x candidate.

use crate::model::{SummaryRow, TableComparison};

/// Column headers of the flattened view, in display order.
pub const SUMMARY_HEADERS: [&str; 7] = [
    "table_name",
    "version_comparison",
    "has_differences",
    "error",
    "total_values",
    "total_differences",
    "difference_percent",
];

const PLACEHOLDER: &str = "-";

pub fn summary_rows(tables: &[TableComparison]) -> Vec<SummaryRow> {
    let mut rows = Vec::new();
    for table in tables {
        for cand in &table.candidates {
            let stats = cand.diff.stats();
            rows.push(SummaryRow {
                table_name: table.table_name.clone(),
                version_comparison: format!("{} vs {}", table.baseline, cand.version),
                has_differences: cand.diff.has_differences(),
                error: cand.diff.error(),
                total_values: stats.map(|s| s.total_values),
                total_differences: stats.map(|s| s.total_differences),
                difference_percent: stats.map(|s| s.difference_percent),
            });
        }
    }
    rows
}

impl SummaryRow {
    /// Render every field as text. Error rows show `-` in the numeric fields.
    pub fn display_fields(&self) -> [String; 7] {
        [
            self.table_name.clone(),
            self.version_comparison.clone(),
            self.has_differences.to_string(),
            self.error.clone().unwrap_or_default(),
            self.total_values.map(format_count).unwrap_or_else(|| PLACEHOLDER.into()),
            self.total_differences.map(format_count).unwrap_or_else(|| PLACEHOLDER.into()),
            self.difference_percent
                .map(|p| format!("{p:.2}%"))
                .unwrap_or_else(|| PLACEHOLDER.into()),
        ]
    }
}

/// `1234567` → `1,234,567`.
pub fn format_count(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}
