// Reconciliation of runs already present in each version's store

use tracing::info;
use verirun_io::OutputStore;
use verirun_recon::VersionResults;
use verirun_runner::{fetch_tables, Version};

use crate::CliError;

/// Fetch every table of one existing run per version.
///
/// `runs[i]` selects the run of `versions[i]`; versions without an entry use
/// their latest run. With no `tables`, the baseline's catalog is used.
pub fn collect_results(
    versions: &[Version],
    model: &str,
    runs: &[String],
    tables: &[String],
    batch_size: usize,
) -> Result<Vec<VersionResults>, CliError> {
    if runs.len() > versions.len() {
        return Err(CliError::usage(format!(
            "{} --run values for {} versions",
            runs.len(),
            versions.len()
        ))
        .with_hint("pass --run once per --om-root, in the same order"));
    }

    let mut stores = Vec::with_capacity(versions.len());
    for version in versions {
        let store = OutputStore::open(&version.root, model).map_err(CliError::store)?;
        stores.push(store);
    }

    let tables = match (tables.is_empty(), stores.first()) {
        (true, Some(baseline)) => baseline.output_table_names().map_err(CliError::store)?,
        _ => tables.to_vec(),
    };

    let mut results = Vec::with_capacity(versions.len());
    for (i, (version, store)) in versions.iter().zip(&stores).enumerate() {
        let run_id = match runs.get(i) {
            Some(run) => store.resolve_run(run),
            None => store.latest_run_id(),
        }
        .map_err(|e| {
            let hint = format!("check `verirun runs --om-root {}`", version.root.display());
            CliError::store(e).with_hint(hint)
        })?;

        info!(version = %version.label, run_id, tables = tables.len(), "reading existing run");
        let mut version_results = VersionResults::new(version.label.clone());
        version_results.tables = fetch_tables(store, &run_id.to_string(), &tables, batch_size);
        results.push(version_results);
    }
    Ok(results)
}
