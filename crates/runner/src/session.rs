//! One reconciliation session over every configured version.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{info, warn};
use verirun_io::StoreError;
use verirun_recon::{aggregate, CompareOptions, ComparisonSummary, VersionResults};
use verirun_service_client::{EngineOptions, ServiceClient, DEFAULT_SUBMIT_TIMEOUT};

use crate::clock::Clock;
use crate::error::SessionError;
use crate::fetch::{TableFetcher, VersionStore};
use crate::run::{submit_and_await, RunOutcome, RunRequest};

/// An engine installation under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub label: String,
    pub root: PathBuf,
}

impl Version {
    pub fn new(label: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            label: label.into(),
            root: root.into(),
        }
    }

    /// Label is the last path component, or the whole path when there is none.
    pub fn from_root(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let label = label_of(&root);
        Self { label, root }
    }
}

fn label_of(root: &Path) -> String {
    root.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

/// Lifecycle of the execution service process, one version at a time.
pub trait ServiceManager {
    /// Start the version's service. Returns its base URL once healthy.
    fn start(&mut self, version: &Version) -> Option<String>;

    /// Stop whatever service is running. No-op when none is.
    fn stop(&mut self);

    fn list_available_tables(
        &self,
        version: &Version,
        model: &str,
    ) -> Result<Vec<String>, StoreError> {
        VersionStore::new(&version.root, model).output_table_names()
    }

    fn table_fetcher(&self, version: &Version, model: &str) -> Box<dyn TableFetcher> {
        Box::new(VersionStore::new(&version.root, model))
    }
}

#[derive(Debug, Clone)]
pub struct SessionPlan {
    pub model: String,
    /// Baseline first.
    pub versions: Vec<Version>,
    pub parameters: EngineOptions,
    /// Empty means every table in the baseline's catalog.
    pub tables: Vec<String>,
    pub tables_per_run: usize,
    pub max_run_time: Duration,
    pub submit_timeout: Duration,
    pub compare: CompareOptions,
}

impl SessionPlan {
    pub fn new(model: impl Into<String>, versions: Vec<Version>) -> Self {
        Self {
            model: model.into(),
            versions,
            parameters: EngineOptions::default(),
            tables: Vec::new(),
            tables_per_run: 25,
            max_run_time: Duration::from_secs(86_400),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            compare: CompareOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedVersion {
    pub version: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct SessionReport {
    /// Versions that ran, in configured order.
    pub outcomes: Vec<RunOutcome>,
    pub skipped: Vec<SkippedVersion>,
    pub summary: ComparisonSummary,
}

/// Run every version in order, then compare the survivors.
///
/// A version whose service does not start or whose submission fails is
/// skipped. The session only fails when no version ran at all.
pub fn run_session(
    plan: &SessionPlan,
    manager: &mut dyn ServiceManager,
    clock: &dyn Clock,
) -> Result<SessionReport, SessionError> {
    if plan.versions.is_empty() {
        return Err(SessionError::NoRunnableVersions { attempted: 0 });
    }

    let tables = requested_tables(plan, manager);
    info!(
        model = %plan.model,
        versions = plan.versions.len(),
        tables = tables.len(),
        "starting reconciliation session"
    );

    let mut outcomes = Vec::new();
    let mut skipped = Vec::new();

    for version in &plan.versions {
        manager.stop();
        match run_version(plan, version, &tables, manager, clock) {
            Ok(outcome) => outcomes.push(outcome),
            Err(reason) => {
                warn!(version = %version.label, %reason, "version skipped");
                skipped.push(SkippedVersion {
                    version: version.label.clone(),
                    reason,
                });
            }
        }
    }
    manager.stop();

    if outcomes.is_empty() {
        return Err(SessionError::NoRunnableVersions {
            attempted: plan.versions.len(),
        });
    }

    let results: Vec<VersionResults> = outcomes.iter().map(|o| o.results.clone()).collect();
    let summary = aggregate(&results, &plan.compare);
    info!(
        compared = summary.tables.len(),
        with_differences = summary.tables_with_differences(),
        skipped = skipped.len(),
        "session finished"
    );

    Ok(SessionReport {
        outcomes,
        skipped,
        summary,
    })
}

/// Explicit tables, else the first readable catalog starting at the baseline.
fn requested_tables(plan: &SessionPlan, manager: &dyn ServiceManager) -> Vec<String> {
    if !plan.tables.is_empty() {
        return plan.tables.clone();
    }
    for version in &plan.versions {
        match manager.list_available_tables(version, &plan.model) {
            Ok(tables) => {
                info!(version = %version.label, count = tables.len(), "using output table catalog");
                return tables;
            }
            Err(e) => {
                warn!(version = %version.label, error = %e, "could not read output table catalog")
            }
        }
    }
    warn!("no output table catalog available, runs will produce all tables and none are fetched");
    Vec::new()
}

fn run_version(
    plan: &SessionPlan,
    version: &Version,
    tables: &[String],
    manager: &mut dyn ServiceManager,
    clock: &dyn Clock,
) -> Result<RunOutcome, String> {
    info!(version = %version.label, root = %version.root.display(), "processing version");

    let base_url = manager
        .start(version)
        .ok_or_else(|| "execution service did not start".to_string())?;
    let client = ServiceClient::new(base_url)
        .map_err(|e| e.to_string())?
        .with_submit_timeout(plan.submit_timeout);
    let fetcher = manager.table_fetcher(version, &plan.model);

    let request = RunRequest {
        version: &version.label,
        model: &plan.model,
        parameters: plan.parameters,
        tables,
        batch_size: plan.tables_per_run,
        deadline: plan.max_run_time,
    };
    submit_and_await(&request, &client, fetcher.as_ref(), clock).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_label_from_root() {
        assert_eq!(Version::from_root("/opt/ompp/v1.17").label, "v1.17");
        assert_eq!(Version::from_root("/").label, "/");
    }

    #[test]
    fn plan_defaults() {
        let plan = SessionPlan::new("M", vec![]);
        assert_eq!(plan.tables_per_run, 25);
        assert_eq!(plan.max_run_time, Duration::from_secs(86_400));
        assert_eq!(plan.parameters.cases, 1_000_000);
        assert!(plan.compare.treat_null_as_zero);
    }
}
