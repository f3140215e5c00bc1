// Summary rendering: text table, JSON document, CSV rows

use clap::ValueEnum;
use serde::Serialize;
use verirun_recon::summary::SUMMARY_HEADERS;
use verirun_recon::{ComparisonSummary, SummaryStatus};
use verirun_runner::{RunOutcome, SkippedVersion};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Csv,
}

/// Per-version run facts shown next to the summary.
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    pub version: String,
    pub run_id: String,
    pub state: String,
    pub polls: u32,
    pub waited_secs: u64,
    pub tables: usize,
    pub missing_tables: usize,
}

impl RunRecord {
    pub fn from_outcome(outcome: &RunOutcome) -> Self {
        Self {
            version: outcome.version().to_string(),
            run_id: outcome.run.id.clone(),
            state: outcome.run.state.as_str().to_string(),
            polls: outcome.run.polls,
            waited_secs: outcome.run.waited.as_secs(),
            tables: outcome.results.tables.len(),
            missing_tables: outcome.missing_tables(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedRecord {
    pub version: String,
    pub reason: String,
}

impl From<&SkippedVersion> for SkippedRecord {
    fn from(s: &SkippedVersion) -> Self {
        Self {
            version: s.version.clone(),
            reason: s.reason.clone(),
        }
    }
}

/// Everything one command reports.
#[derive(Debug, Clone)]
pub struct Report<'a> {
    pub summary: &'a ComparisonSummary,
    pub runs: Vec<RunRecord>,
    pub skipped: Vec<SkippedRecord>,
}

pub fn render(report: &Report<'_>, format: OutputFormat) -> Result<Vec<u8>, String> {
    match format {
        OutputFormat::Text => Ok(render_text(report).into_bytes()),
        OutputFormat::Json => render_json(report),
        OutputFormat::Csv => render_csv(report.summary),
    }
}

fn render_text(report: &Report<'_>) -> String {
    let mut out = String::new();

    if !report.runs.is_empty() {
        out.push_str("runs:\n");
        for run in &report.runs {
            out.push_str(&format!(
                "  {}: run {} {} after {}s, {} tables ({} missing)\n",
                run.version, run.run_id, run.state, run.waited_secs, run.tables, run.missing_tables
            ));
        }
    }
    for skipped in &report.skipped {
        out.push_str(&format!("skipped {}: {}\n", skipped.version, skipped.reason));
    }
    if !out.is_empty() {
        out.push('\n');
    }

    let summary = report.summary;
    if let SummaryStatus::InsufficientVersions { usable } = summary.status {
        out.push_str(&format!(
            "not enough versions with data to compare ({usable} usable, 2 needed)\n"
        ));
        return out;
    }

    let rows: Vec<[String; 7]> = summary.rows.iter().map(|r| r.display_fields()).collect();
    let mut widths: Vec<usize> = SUMMARY_HEADERS.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (w, cell) in widths.iter_mut().zip(row.iter()) {
            *w = (*w).max(cell.chars().count());
        }
    }

    let header: Vec<String> = SUMMARY_HEADERS.iter().map(|h| h.to_string()).collect();
    push_aligned(&mut out, &header, &widths);
    for row in &rows {
        push_aligned(&mut out, row, &widths);
    }

    out.push_str(&format!(
        "\n{} tables compared, {} with differences\n",
        summary.tables.len(),
        summary.tables_with_differences()
    ));
    out
}

fn push_aligned(out: &mut String, cells: &[String], widths: &[usize]) {
    let line: Vec<String> = cells
        .iter()
        .zip(widths)
        .map(|(cell, w)| format!("{:<width$}", cell, width = *w))
        .collect();
    out.push_str(line.join("  ").trim_end());
    out.push('\n');
}

fn render_json(report: &Report<'_>) -> Result<Vec<u8>, String> {
    let mut doc = serde_json::to_value(report.summary).map_err(|e| e.to_string())?;
    if let Some(obj) = doc.as_object_mut() {
        obj.insert("has_differences".into(), report.summary.has_differences().into());
        let runs = serde_json::to_value(&report.runs).map_err(|e| e.to_string())?;
        let skipped = serde_json::to_value(&report.skipped).map_err(|e| e.to_string())?;
        obj.insert("runs".into(), runs);
        obj.insert("skipped".into(), skipped);
    }
    let mut bytes = serde_json::to_vec_pretty(&doc).map_err(|e| e.to_string())?;
    bytes.push(b'\n');
    Ok(bytes)
}

/// Raw values; error rows leave the numeric cells empty.
fn render_csv(summary: &ComparisonSummary) -> Result<Vec<u8>, String> {
    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(SUMMARY_HEADERS).map_err(|e| e.to_string())?;

    for row in &summary.rows {
        writer
            .write_record([
                row.table_name.clone(),
                row.version_comparison.clone(),
                row.has_differences.to_string(),
                row.error.clone().unwrap_or_default(),
                row.total_values.map(|v| v.to_string()).unwrap_or_default(),
                row.total_differences.map(|v| v.to_string()).unwrap_or_default(),
                row.difference_percent.map(|p| format!("{p:.4}")).unwrap_or_default(),
            ])
            .map_err(|e| e.to_string())?;
    }

    writer.into_inner().map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use verirun_recon::{aggregate, Column, CompareOptions, TableData, TableDataset, VersionResults};

    fn summary() -> ComparisonSummary {
        let table = |vals: &[f64]| {
            let column = Column::numeric("v", vals.iter().map(|v| Some(*v)).collect());
            TableDataset::loaded(TableData::new(vec![column]).unwrap())
        };
        let results = vec![
            VersionResults::new("v1")
                .with_table("Income", table(&[1.0, 2.0, 3.0]))
                .with_table("Wide", table(&[1.0])),
            VersionResults::new("v2")
                .with_table("Income", table(&[1.0, 2.0, 3.1]))
                .with_table("Wide", table(&[1.0, 2.0])),
        ];
        aggregate(&results, &CompareOptions::default())
    }

    fn report(summary: &ComparisonSummary) -> Report<'_> {
        Report {
            summary,
            runs: vec![],
            skipped: vec![SkippedRecord {
                version: "v3".into(),
                reason: "execution service did not start".into(),
            }],
        }
    }

    #[test]
    fn text_has_header_rows_and_footer() {
        let s = summary();
        let text = String::from_utf8(render(&report(&s), OutputFormat::Text).unwrap()).unwrap();
        assert!(text.contains("skipped v3: execution service did not start"));
        assert!(text.contains("table_name"));
        assert!(text.contains("33.33%"));
        assert!(text.contains("Shape mismatch: (1, 1) vs (2, 1)"));
        assert!(text.contains("2 tables compared, 2 with differences"));
    }

    #[test]
    fn json_carries_summary_and_extras() {
        let s = summary();
        let bytes = render(&report(&s), OutputFormat::Json).unwrap();
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["status"]["status"], "compared");
        assert_eq!(doc["has_differences"], true);
        assert_eq!(doc["rows"].as_array().unwrap().len(), 2);
        assert_eq!(doc["skipped"][0]["version"], "v3");
    }

    #[test]
    fn csv_error_rows_have_empty_numbers() {
        let s = summary();
        let csv = String::from_utf8(render(&report(&s), OutputFormat::Csv).unwrap()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], SUMMARY_HEADERS.join(","));
        assert_eq!(lines[1], "Income,v1 vs v2,true,,3,1,33.3333");
        assert_eq!(lines[2], "Wide,v1 vs v2,true,\"Shape mismatch: (1, 1) vs (2, 1)\",,,");
    }

    #[test]
    fn insufficient_text() {
        let s = ComparisonSummary::insufficient(1);
        let text = String::from_utf8(render(&report(&s), OutputFormat::Text).unwrap()).unwrap();
        assert!(text.contains("not enough versions with data to compare (1 usable, 2 needed)"));
    }
}
