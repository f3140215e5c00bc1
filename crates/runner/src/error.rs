use thiserror::Error;
use verirun_service_client::ServiceError;

/// Version-level failure. The session skips the version and carries on.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("run submission failed: {0}")]
    Submission(#[from] ServiceError),

    #[error("run submission returned no run identifier: {response}")]
    MissingRunId { response: String },
}

/// Conditions that make the whole session meaningless.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no runnable versions ({attempted} attempted)")]
    NoRunnableVersions { attempted: usize },
}
