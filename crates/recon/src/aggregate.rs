use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::compare::{compare, CompareOptions};
use crate::model::{
    CandidateComparison, ComparisonSummary, SummaryStatus, TableComparison, TableDataset,
    VersionResults, VersionSet,
};
use crate::summary::summary_rows;

/// Compare every version against the first one, table by table.
///
/// Versions without any table entry are dropped before the baseline is
/// chosen. Tables held by fewer than two versions are skipped; a candidate
/// lacking an entry for a compared table is reported as missing data.
/// Tables are visited in lexicographic order, candidates in input order.
pub fn aggregate(results: &[VersionResults], opts: &CompareOptions) -> ComparisonSummary {
    let usable: Vec<&VersionResults> = results.iter().filter(|r| r.has_tables()).collect();
    if usable.len() < 2 {
        info!(usable = usable.len(), "need at least 2 versions to compare");
        return ComparisonSummary::insufficient(usable.len());
    }

    let (baseline, candidates) = (usable[0], &usable[1..]);
    let versions = VersionSet {
        baseline: baseline.version.clone(),
        candidates: candidates.iter().map(|c| c.version.clone()).collect(),
    };

    let all_tables: BTreeSet<&str> = usable
        .iter()
        .flat_map(|r| r.tables.keys().map(String::as_str))
        .collect();
    info!(tables = all_tables.len(), baseline = %versions.baseline, "comparing output tables");

    let absent = TableDataset::missing("table not retrieved for this version");
    let mut tables = Vec::new();

    for name in all_tables {
        let holders = usable.iter().filter(|r| r.tables.contains_key(name)).count();
        if holders < 2 {
            debug!(table = name, "present in one version only, skipped");
            continue;
        }

        let base_data = baseline.tables.get(name).unwrap_or(&absent);
        let compared: Vec<CandidateComparison> = candidates
            .iter()
            .map(|cand| CandidateComparison {
                version: cand.version.clone(),
                diff: compare(base_data, cand.tables.get(name).unwrap_or(&absent), opts),
            })
            .collect();

        let has_differences = compared.iter().any(|c| c.diff.has_differences());
        debug!(table = name, has_differences, "table compared");
        tables.push(TableComparison {
            table_name: name.to_string(),
            baseline: baseline.version.clone(),
            candidates: compared,
            has_differences,
        });
    }

    let rows = summary_rows(&tables);
    let summary = ComparisonSummary {
        status: SummaryStatus::Compared,
        versions: Some(versions),
        tables,
        rows,
    };
    info!(
        tables = summary.tables.len(),
        with_differences = summary.tables_with_differences(),
        "comparison complete"
    );
    summary
}
