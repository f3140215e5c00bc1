//! Interpreting execution service responses.
//!
//! Service versions disagree on where the run identifier lives in a submit
//! response and on which endpoint reports run status. Both are handled as
//! ordered strategy lists; the first strategy that yields an answer wins.

use serde_json::Value;

/// Submit response fields that may carry the run identifier, in order.
pub const RUN_ID_FIELDS: &[&str] = &[
    "RunStamp",
    "SubmitStamp",
    "RunDigest",
    "run_id",
    "RunId",
    "Digest",
    "Stamp",
];

/// Run list entry fields compared against the run identifier.
const RUN_LIST_MATCH_FIELDS: &[&str] = &["RunStamp", "RunDigest", "SubmitStamp", "Name", "run_id"];

const SUCCESS: &[&str] = &["s", "success", "completed", "done"];
const FAILURE: &[&str] = &["e", "error", "failed", "x", "exit"];

/// First non-empty run identifier in a submit response.
pub fn extract_run_id(response: &Value) -> Option<String> {
    RUN_ID_FIELDS.iter().find_map(|field| match response.get(*field)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// One poll answer.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteStatus {
    Running { progress: Option<f64> },
    Succeeded,
    Failed { status: String },
}

impl RemoteStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RemoteStatus::Running { .. })
    }
}

/// Status endpoints, tried in this order on every poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusProbe {
    /// Run log with an `IsFinal` flag.
    RunLog,
    /// Per-run status record.
    RunStatus,
    /// Status record of older services, keyed by run only.
    LegacyStatus,
    /// Full run list searched for the run.
    RunList,
}

impl StatusProbe {
    pub const ALL: [StatusProbe; 4] = [
        StatusProbe::RunLog,
        StatusProbe::RunStatus,
        StatusProbe::LegacyStatus,
        StatusProbe::RunList,
    ];

    pub fn name(self) -> &'static str {
        match self {
            StatusProbe::RunLog => "run-log",
            StatusProbe::RunStatus => "run-status",
            StatusProbe::LegacyStatus => "legacy-status",
            StatusProbe::RunList => "run-list",
        }
    }

    /// Request path with `model` and `run_id` percent-encoded as segments.
    pub fn path(self, model: &str, run_id: &str) -> String {
        let (model, run_id) = (urlencoding::encode(model), urlencoding::encode(run_id));
        match self {
            StatusProbe::RunLog => format!("/api/run/log/model/{model}/stamp/{run_id}"),
            StatusProbe::RunStatus => format!("/api/model/{model}/run/{run_id}/status"),
            StatusProbe::LegacyStatus => format!("/api/run/{run_id}/status"),
            StatusProbe::RunList => format!("/api/model/{model}/run"),
        }
    }

    /// `None` when the response carries no recognizable signal.
    pub fn interpret(self, response: &Value, run_id: &str) -> Option<RemoteStatus> {
        match self {
            StatusProbe::RunLog | StatusProbe::RunStatus | StatusProbe::LegacyStatus => {
                interpret_record(response)
            }
            StatusProbe::RunList => {
                let runs = match response {
                    Value::Array(runs) => runs,
                    Value::Object(obj) => obj.get("runs")?.as_array()?,
                    _ => return None,
                };
                let entry = runs.iter().find(|run| run_matches(run, run_id))?;
                interpret_record(entry)
            }
        }
    }
}

fn interpret_record(record: &Value) -> Option<RemoteStatus> {
    let obj = record.as_object()?;
    let status = ["Status", "status"]
        .iter()
        .find_map(|key| obj.get(*key)?.as_str())
        .map(|s| s.trim().to_ascii_lowercase());
    let is_final = ["IsFinal", "isFinal", "is_final"]
        .iter()
        .find_map(|key| obj.get(*key)?.as_bool());

    // A failed run is also final, so failure wins over the flag.
    if let Some(status) = &status {
        if FAILURE.contains(&status.as_str()) {
            return Some(RemoteStatus::Failed { status: status.clone() });
        }
        if SUCCESS.contains(&status.as_str()) {
            return Some(RemoteStatus::Succeeded);
        }
    }
    if is_final == Some(true) {
        return Some(RemoteStatus::Succeeded);
    }
    if status.is_some() || is_final.is_some() {
        let progress = ["Progress", "progress"]
            .iter()
            .find_map(|key| obj.get(*key)?.as_f64());
        return Some(RemoteStatus::Running { progress });
    }
    None
}

fn run_matches(run: &Value, run_id: &str) -> bool {
    RUN_LIST_MATCH_FIELDS.iter().any(|field| match run.get(*field) {
        Some(Value::String(s)) => s == run_id,
        Some(Value::Number(n)) => n.to_string() == run_id,
        _ => false,
    })
}
