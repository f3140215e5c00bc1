//! Run lifecycle and reconciliation session.
//!
//! A session runs the same model under each configured version, one at a
//! time, then hands every version's fetched tables to the aggregator:
//!
//! ```text
//! for version: stop service -> start service -> submit -> poll -> fetch
//! aggregate(outcomes) -> ComparisonSummary
//! ```

mod clock;
mod error;
mod fetch;
mod run;
mod service;
mod session;
mod status;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{RunError, SessionError};
pub use fetch::{TableFetcher, VersionStore};
pub use run::{
    fetch_tables, poll_interval, run_name, submit_and_await, Run, RunOutcome, RunRequest, RunState,
};
pub use service::ExecutionService;
pub use session::{
    run_session, ServiceManager, SessionPlan, SessionReport, SkippedVersion, Version,
};
pub use status::{extract_run_id, RemoteStatus, StatusProbe, RUN_ID_FIELDS};
