//! Remote execution service client.
//!
//! Blocking reqwest client (no Tokio runtime required). Covers run
//! submission, raw JSON probes used for status polling, and the health check.
//!
//! No retries and no interpretation of status payloads: the run lifecycle
//! controller owns both.

mod client;

pub use client::{EngineOptions, ServiceClient, ServiceError, SubmitRequest, DEFAULT_SUBMIT_TIMEOUT};
