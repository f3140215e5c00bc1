use tracing::debug;

use crate::model::{
    ColumnDifference, DiffDistribution, DiffStats, TableData, TableDataset, TableDiff,
};

/// Absolute threshold on `|candidate - baseline|` above which a cell differs.
/// This is the only equality rule; no relative tolerance is applied.
pub const TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompareOptions {
    /// Substitute zero for null cells before differencing. With this off,
    /// null-vs-null is equal and null-vs-value counts as a differing cell
    /// that is left out of the distribution statistics.
    pub treat_null_as_zero: bool,
}

impl Default for CompareOptions {
    fn default() -> Self {
        Self {
            treat_null_as_zero: true,
        }
    }
}

/// Compare one baseline dataset against one candidate dataset.
pub fn compare(
    baseline: &TableDataset,
    candidate: &TableDataset,
    opts: &CompareOptions,
) -> TableDiff {
    match (baseline.data(), candidate.data()) {
        (Some(base), Some(cand)) => compare_data(base, cand, opts),
        _ => TableDiff::MissingData,
    }
}

/// Compare two materialized tables.
///
/// Only columns that are numeric in both tables are differenced, in baseline
/// column order. Shape is checked first: mismatched shapes cannot be aligned.
pub fn compare_data(
    baseline: &TableData,
    candidate: &TableData,
    opts: &CompareOptions,
) -> TableDiff {
    let (base_shape, cand_shape) = (baseline.shape(), candidate.shape());
    if base_shape != cand_shape {
        return TableDiff::ShapeMismatch {
            baseline: base_shape,
            candidate: cand_shape,
        };
    }

    let shared: Vec<(&str, &[Option<f64>], &[Option<f64>])> = baseline
        .columns()
        .iter()
        .filter_map(|col| {
            let base_vals = col.values.as_numeric()?;
            let cand_vals = candidate.column(&col.name)?.values.as_numeric()?;
            Some((col.name.as_str(), base_vals, cand_vals))
        })
        .collect();

    if shared.is_empty() {
        return TableDiff::NoNumericColumns;
    }

    let mut total_values = 0;
    let mut total_differences = 0;
    let mut column_differences = Vec::new();

    for (name, base_vals, cand_vals) in shared {
        let col = diff_column(base_vals, cand_vals, opts);
        total_values += base_vals.len();
        total_differences += col.diff_count;

        if col.diff_count > 0 {
            debug!(column = name, diff_count = col.diff_count, "column differs");
            column_differences.push(ColumnDifference {
                column: name.to_string(),
                diff_count: col.diff_count,
                diff_percent: percent(col.diff_count, base_vals.len()),
                distribution: distribution(col.signed),
            });
        }
    }

    TableDiff::Compared(DiffStats {
        total_values,
        total_differences,
        difference_percent: percent(total_differences, total_values),
        column_differences,
    })
}

struct ColumnDiff {
    diff_count: usize,
    /// Signed differences of every cell pair with two defined values.
    signed: Vec<f64>,
}

fn diff_column(base: &[Option<f64>], cand: &[Option<f64>], opts: &CompareOptions) -> ColumnDiff {
    let mut diff_count = 0;
    let mut signed = Vec::with_capacity(base.len());

    for (b, c) in base.iter().zip(cand) {
        let pair = if opts.treat_null_as_zero {
            (Some(b.unwrap_or(0.0)), Some(c.unwrap_or(0.0)))
        } else {
            (*b, *c)
        };
        match pair {
            (Some(b), Some(c)) => {
                let d = c - b;
                if d.abs() > TOLERANCE {
                    diff_count += 1;
                }
                signed.push(d);
            }
            (None, None) => {}
            _ => diff_count += 1,
        }
    }

    ColumnDiff { diff_count, signed }
}

fn distribution(mut diffs: Vec<f64>) -> Option<DiffDistribution> {
    if diffs.is_empty() {
        return None;
    }
    diffs.sort_by(f64::total_cmp);
    let n = diffs.len();
    let median = if n % 2 == 1 {
        diffs[n / 2]
    } else {
        (diffs[n / 2 - 1] + diffs[n / 2]) / 2.0
    };
    Some(DiffDistribution {
        min_diff: diffs[0],
        max_diff: diffs[n - 1],
        median_diff: median,
        mean_diff: diffs.iter().sum::<f64>() / n as f64,
    })
}

/// `part / whole * 100`, 0 when `whole` is 0.
fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}
