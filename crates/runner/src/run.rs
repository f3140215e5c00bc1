//! Run lifecycle controller.
//!
//! `Submitted -> Polling -> {Completed, Failed, TimedOut}`. A timed out run
//! is inconclusive rather than failed, so its tables are still fetched.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};
use verirun_recon::{TableDataset, VersionResults};
use verirun_service_client::{EngineOptions, SubmitRequest};

use crate::clock::Clock;
use crate::error::RunError;
use crate::fetch::TableFetcher;
use crate::service::ExecutionService;
use crate::status::{extract_run_id, RemoteStatus, StatusProbe};

const SHORT_WAIT: Duration = Duration::from_secs(10 * 60);
const MEDIUM_WAIT: Duration = Duration::from_secs(60 * 60);

/// Delay before the next status poll, by time already spent waiting.
pub fn poll_interval(elapsed: Duration) -> Duration {
    if elapsed < SHORT_WAIT {
        Duration::from_secs(30)
    } else if elapsed < MEDIUM_WAIT {
        Duration::from_secs(120)
    } else {
        Duration::from_secs(300)
    }
}

pub fn run_name(unix_seconds: i64) -> String {
    format!("TestRun_{unix_seconds}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Submitted,
    Polling,
    Completed,
    Failed,
    TimedOut,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed | RunState::TimedOut)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Submitted => "submitted",
            RunState::Polling => "polling",
            RunState::Completed => "completed",
            RunState::Failed => "failed",
            RunState::TimedOut => "timed_out",
        }
    }
}

/// One submitted run, owned by the controller until it is terminal.
#[derive(Debug, Clone, Serialize)]
pub struct Run {
    pub id: String,
    pub name: String,
    pub parameters: EngineOptions,
    pub state: RunState,
    /// Status reported by the service when the run failed.
    pub failure: Option<String>,
    pub polls: u32,
    pub waited: Duration,
}

/// Everything one version produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run: Run,
    /// Empty for failed runs.
    pub results: VersionResults,
}

impl RunOutcome {
    pub fn version(&self) -> &str {
        &self.results.version
    }

    pub fn missing_tables(&self) -> usize {
        self.results.tables.values().filter(|t| t.is_missing()).count()
    }
}

#[derive(Debug, Clone)]
pub struct RunRequest<'a> {
    pub version: &'a str,
    pub model: &'a str,
    pub parameters: EngineOptions,
    /// Tables to produce and fetch. Empty lets the service produce all,
    /// and nothing is fetched.
    pub tables: &'a [String],
    pub batch_size: usize,
    /// Bound on the total wait after submission.
    pub deadline: Duration,
}

/// Submit one run, wait for it, and fetch its tables.
///
/// Only submission failures are errors. Fetch failures become missing
/// datasets and a timeout still fetches.
pub fn submit_and_await(
    request: &RunRequest<'_>,
    service: &dyn ExecutionService,
    fetcher: &dyn TableFetcher,
    clock: &dyn Clock,
) -> Result<RunOutcome, RunError> {
    let name = run_name(clock.unix_seconds());
    let submit = SubmitRequest {
        model_name: request.model.to_string(),
        run_name: name.clone(),
        options: request.parameters,
        tables: request.tables.to_vec(),
    };

    let response = service.submit_run(&submit)?;
    let id = extract_run_id(&response).ok_or_else(|| RunError::MissingRunId {
        response: truncate(&response.to_string(), 200),
    })?;

    let mut run = Run {
        id,
        name,
        parameters: request.parameters,
        state: RunState::Submitted,
        failure: None,
        polls: 0,
        waited: Duration::ZERO,
    };
    info!(version = request.version, run_id = %run.id, run_name = %run.name, "run submitted");

    await_terminal(&mut run, request, service, clock);

    let mut results = VersionResults::new(request.version);
    if run.state == RunState::Failed {
        warn!(
            version = request.version,
            run_id = %run.id,
            status = run.failure.as_deref().unwrap_or(""),
            "run failed, not fetching tables"
        );
    } else {
        results.tables = fetch_tables(fetcher, &run.id, request.tables, request.batch_size);
    }

    Ok(RunOutcome { run, results })
}

fn await_terminal(
    run: &mut Run,
    request: &RunRequest<'_>,
    service: &dyn ExecutionService,
    clock: &dyn Clock,
) {
    let started = clock.now();
    run.state = RunState::Polling;

    loop {
        run.polls += 1;
        match poll_once(service, request.model, &run.id) {
            Some(RemoteStatus::Succeeded) => {
                run.state = RunState::Completed;
            }
            Some(RemoteStatus::Failed { status }) => {
                run.state = RunState::Failed;
                run.failure = Some(status);
            }
            Some(RemoteStatus::Running { progress }) => {
                debug!(run_id = %run.id, progress, "run in progress");
            }
            None => debug!(run_id = %run.id, "no status endpoint answered"),
        }

        let elapsed = clock.now().saturating_duration_since(started);
        run.waited = elapsed;
        if run.state.is_terminal() {
            info!(
                run_id = %run.id,
                state = run.state.as_str(),
                elapsed_secs = elapsed.as_secs(),
                "run finished"
            );
            return;
        }
        if elapsed >= request.deadline {
            run.state = RunState::TimedOut;
            warn!(
                run_id = %run.id,
                elapsed_secs = elapsed.as_secs(),
                "run did not finish before the deadline, fetching whatever is available"
            );
            return;
        }

        let remaining = request.deadline - elapsed;
        clock.sleep(poll_interval(elapsed).min(remaining));
    }
}

/// First recognizable answer from the status probes, in order.
fn poll_once(service: &dyn ExecutionService, model: &str, run_id: &str) -> Option<RemoteStatus> {
    for probe in StatusProbe::ALL {
        let path = probe.path(model, run_id);
        match service.get_json(&path) {
            Ok(response) => {
                if let Some(status) = probe.interpret(&response, run_id) {
                    debug!(probe = probe.name(), ?status, "status probe answered");
                    return Some(status);
                }
                debug!(probe = probe.name(), "status probe response not recognized");
            }
            Err(e) => debug!(probe = probe.name(), error = %e, "status probe failed"),
        }
    }
    None
}

/// Fetch `tables` in batches of `batch_size`. Failures become missing datasets.
pub fn fetch_tables(
    fetcher: &dyn TableFetcher,
    run_id: &str,
    tables: &[String],
    batch_size: usize,
) -> BTreeMap<String, TableDataset> {
    let mut fetched = BTreeMap::new();
    let batches: Vec<&[String]> = tables.chunks(batch_size.max(1)).collect();

    for (i, batch) in batches.iter().enumerate() {
        info!(run_id, tables = batch.len(), "batch {}/{}", i + 1, batches.len());
        for table in *batch {
            let dataset = match fetcher.fetch(table, run_id) {
                Ok(data) => TableDataset::loaded(data),
                Err(e) => {
                    warn!(table = %table, run_id, error = %e, "table fetch failed");
                    TableDataset::missing(e.to_string())
                }
            };
            fetched.insert(table.clone(), dataset);
        }
    }
    fetched
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::{json, Value};
    use std::cell::{Cell, RefCell};
    use verirun_io::StoreError;
    use verirun_recon::{Column, TableData};
    use verirun_service_client::ServiceError;

    /// Answers the submit with `submit` and every path with the first
    /// matching scripted response, or a 404.
    struct FakeService {
        submit: Result<Value, u16>,
        routes: Vec<(&'static str, Value)>,
        gets: RefCell<Vec<String>>,
    }

    impl FakeService {
        fn new(submit: Value) -> Self {
            Self {
                submit: Ok(submit),
                routes: Vec::new(),
                gets: RefCell::new(Vec::new()),
            }
        }

        fn route(mut self, prefix: &'static str, response: Value) -> Self {
            self.routes.push((prefix, response));
            self
        }
    }

    impl ExecutionService for FakeService {
        fn submit_run(&self, _request: &SubmitRequest) -> Result<Value, ServiceError> {
            self.submit.clone().map_err(|code| ServiceError::Http(code, "boom".into()))
        }

        fn get_json(&self, path: &str) -> Result<Value, ServiceError> {
            self.gets.borrow_mut().push(path.to_string());
            self.routes
                .iter()
                .find(|(prefix, _)| path.starts_with(prefix))
                .map(|(_, v)| v.clone())
                .ok_or_else(|| ServiceError::Http(404, String::new()))
        }
    }

    struct FakeFetcher {
        fail: &'static [&'static str],
        calls: Cell<usize>,
    }

    impl TableFetcher for FakeFetcher {
        fn fetch(&self, table: &str, _run_id: &str) -> Result<TableData, StoreError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail.contains(&table) {
                return Err(StoreError::InvalidTableName(table.to_string()));
            }
            TableData::new(vec![Column::numeric("v", vec![Some(1.0)])]).map_err(StoreError::from)
        }
    }

    fn fetcher() -> FakeFetcher {
        FakeFetcher {
            fail: &[],
            calls: Cell::new(0),
        }
    }

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn request<'a>(tables: &'a [String], deadline: Duration) -> RunRequest<'a> {
        RunRequest {
            version: "v1",
            model: "M",
            parameters: EngineOptions::default(),
            tables,
            batch_size: 2,
            deadline,
        }
    }

    #[test]
    fn poll_interval_tiers() {
        assert_eq!(poll_interval(Duration::ZERO), Duration::from_secs(30));
        assert_eq!(poll_interval(Duration::from_secs(599)), Duration::from_secs(30));
        assert_eq!(poll_interval(Duration::from_secs(600)), Duration::from_secs(120));
        assert_eq!(poll_interval(Duration::from_secs(3599)), Duration::from_secs(120));
        assert_eq!(poll_interval(Duration::from_secs(3600)), Duration::from_secs(300));
        assert_eq!(poll_interval(Duration::from_secs(86_400)), Duration::from_secs(300));
    }

    #[test]
    fn completed_run_fetches_every_table_in_batches() {
        let service = FakeService::new(json!({ "SubmitStamp": "st-1" }))
            .route("/api/run/log/", json!({ "IsFinal": true }));
        let fetcher = FakeFetcher {
            fail: &["B"],
            calls: Cell::new(0),
        };
        let clock = ManualClock::default();
        let names = tables(&["A", "B", "C"]);

        let req = request(&names, Duration::from_secs(3600));
        let outcome = submit_and_await(&req, &service, &fetcher, &clock).unwrap();
        assert_eq!(outcome.run.id, "st-1");
        assert_eq!(outcome.run.name, "TestRun_1700000000");
        assert_eq!(outcome.run.state, RunState::Completed);
        assert_eq!(outcome.run.polls, 1);
        assert_eq!(fetcher.calls.get(), 3);
        assert_eq!(outcome.results.tables.len(), 3);
        assert!(outcome.results.tables["B"].is_missing());
        assert!(!outcome.results.tables["A"].is_missing());
        assert_eq!(outcome.missing_tables(), 1);
        assert_eq!(clock.sleep_count(), 0);
    }

    #[test]
    fn falls_through_probes_until_one_answers() {
        let service = FakeService::new(json!({ "RunDigest": "d-9" }))
            .route("/api/run/log/", json!({ "Lines": ["starting"] }))
            .route("/api/model/M/run", json!([{ "RunDigest": "d-9", "Status": "s" }]));
        let clock = ManualClock::default();
        let req = request(&[], Duration::from_secs(60));
        let outcome = submit_and_await(&req, &service, &fetcher(), &clock).unwrap();

        assert_eq!(outcome.run.state, RunState::Completed);
        let gets = service.gets.borrow();
        assert_eq!(
            *gets,
            vec![
                "/api/run/log/model/M/stamp/d-9",
                "/api/model/M/run/d-9/status",
                "/api/run/d-9/status",
                "/api/model/M/run",
            ]
        );
    }

    #[test]
    fn failed_run_stops_polling_and_skips_fetch() {
        let service = FakeService::new(json!({ "RunStamp": "r" }))
            .route("/api/run/log/", json!({ "IsFinal": true, "Status": "e" }));
        let fetcher = fetcher();
        let clock = ManualClock::default();
        let names = tables(&["A"]);

        let req = request(&names, Duration::from_secs(3600));
        let outcome = submit_and_await(&req, &service, &fetcher, &clock).unwrap();
        assert_eq!(outcome.run.state, RunState::Failed);
        assert_eq!(outcome.run.failure.as_deref(), Some("e"));
        assert_eq!(fetcher.calls.get(), 0);
        assert!(!outcome.results.has_tables());
    }

    #[test]
    fn deadline_exceeded_still_fetches_as_timed_out() {
        let service = FakeService::new(json!({ "RunStamp": "r" }))
            .route("/api/run/log/", json!({ "IsFinal": false, "Progress": 10 }));
        let fetcher = fetcher();
        let clock = ManualClock::default();
        let names = tables(&["A", "B"]);

        let req = request(&names, Duration::from_secs(90));
        let outcome = submit_and_await(&req, &service, &fetcher, &clock).unwrap();
        assert_eq!(outcome.run.state, RunState::TimedOut);
        // Polls at 0s, 30s, 60s and 90s.
        assert_eq!(outcome.run.polls, 4);
        assert_eq!(clock.elapsed(), Duration::from_secs(90));
        assert_eq!(outcome.run.waited, Duration::from_secs(90));
        assert_eq!(fetcher.calls.get(), 2);
        assert_eq!(outcome.results.tables.len(), 2);
    }

    #[test]
    fn sleeps_never_overshoot_the_deadline() {
        let service = FakeService::new(json!({ "RunStamp": "r" }));
        let clock = ManualClock::default();
        let req = request(&[], Duration::from_secs(45));
        let outcome = submit_and_await(&req, &service, &fetcher(), &clock).unwrap();
        assert_eq!(outcome.run.state, RunState::TimedOut);
        assert_eq!(clock.elapsed(), Duration::from_secs(45));
        assert_eq!(clock.sleep_count(), 2);
    }

    #[test]
    fn submission_http_error() {
        let mut service = FakeService::new(Value::Null);
        service.submit = Err(503);
        let req = request(&[], Duration::ZERO);
        let clock = ManualClock::default();
        let err = submit_and_await(&req, &service, &fetcher(), &clock).unwrap_err();
        assert!(matches!(err, RunError::Submission(ServiceError::Http(503, _))));
    }

    #[test]
    fn submission_without_run_id() {
        let service = FakeService::new(json!({ "Name": "TestRun_1" }));
        let req = request(&[], Duration::ZERO);
        let clock = ManualClock::default();
        let err = submit_and_await(&req, &service, &fetcher(), &clock).unwrap_err();
        assert!(matches!(err, RunError::MissingRunId { .. }));
        assert!(err.to_string().contains("TestRun_1"));
    }

    #[test]
    fn truncate_on_char_boundary() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }
}
