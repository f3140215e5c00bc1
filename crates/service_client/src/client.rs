//! Execution service HTTP client.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Long simulations may hold the submit request open until the run is queued.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(300);
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);
const HEALTH_PATH: &str = "/api/model-list";
const SUBMIT_PATH: &str = "/api/run";

/// Execution service API client (blocking).
#[derive(Clone)]
pub struct ServiceClient {
    http: reqwest::blocking::Client,
    base_url: String,
    submit_timeout: Duration,
}

/// Error type for service operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Connection refused, timeout, TLS, ...
    #[error("network error: {0}")]
    Network(String),
    /// Non-2xx response with its body
    #[error("HTTP {0}: {1}")]
    Http(u16, String),
    /// Body was not JSON
    #[error("parse error: {0}")]
    Parse(String),
}

/// Engine options passed through unmodified to the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineOptions {
    pub cases: u64,
    pub threads: u32,
    pub sub_samples: u32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            cases: 1_000_000,
            threads: 8,
            sub_samples: 8,
        }
    }
}

/// One run submission.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub model_name: String,
    pub run_name: String,
    pub options: EngineOptions,
    /// Subset of output tables to produce; empty = all.
    pub tables: Vec<String>,
}

impl SubmitRequest {
    /// Wire body of `POST /api/run`. Option values are strings.
    pub fn to_json(&self) -> serde_json::Value {
        let opts = serde_json::json!({
            "OpenM.RunName": self.run_name,
            "Parameter.SimulationCases": self.options.cases.to_string(),
            "OpenM.Threads": self.options.threads.to_string(),
            "OpenM.SubValues": self.options.sub_samples.to_string(),
        });

        let mut body = serde_json::json!({
            "ModelName": self.model_name,
            "Name": self.run_name,
            "Opts": opts,
        });
        if !self.tables.is_empty() {
            body["Tables"] = serde_json::json!(self.tables);
        }
        body
    }
}

impl ServiceClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(format!("verirun/{}", env!("CARGO_PKG_VERSION")))
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
        })
    }

    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Submit a run. Returns the raw response; its shape varies by version.
    pub fn submit_run(&self, request: &SubmitRequest) -> Result<serde_json::Value, ServiceError> {
        let url = self.url(SUBMIT_PATH);
        debug!(%url, model = %request.model_name, run_name = %request.run_name, "submitting run");
        let response = self
            .http
            .post(&url)
            .timeout(self.submit_timeout)
            .json(&request.to_json())
            .send()
            .map_err(|e| ServiceError::Network(e.to_string()))?;
        read_json(response)
    }

    /// GET a path relative to the base URL and parse the body as JSON.
    pub fn get_json(&self, path: &str) -> Result<serde_json::Value, ServiceError> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .map_err(|e| ServiceError::Network(e.to_string()))?;
        read_json(response)
    }

    /// True when the service answers its model list endpoint.
    pub fn check_health(&self) -> bool {
        match self.http.get(self.url(HEALTH_PATH)).timeout(Duration::from_secs(5)).send() {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn read_json(response: reqwest::blocking::Response) -> Result<serde_json::Value, ServiceError> {
    let status = response.status().as_u16();
    if !response.status().is_success() {
        let body = response.text().unwrap_or_default();
        return Err(ServiceError::Http(status, body));
    }

    let text = response.text().map_err(|e| ServiceError::Network(e.to_string()))?;
    let trimmed = text.trim_start_matches('\u{feff}');
    serde_json::from_str(trimmed)
        .map_err(|e| ServiceError::Parse(format!("{} (body: {})", e, snippet(trimmed, 200))))
}

/// At most `max_chars` characters of `text`, cut on a character boundary.
fn snippet(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn request() -> SubmitRequest {
        SubmitRequest {
            model_name: "RiskPaths".into(),
            run_name: "TestRun_1700000000".into(),
            options: EngineOptions {
                cases: 5000,
                threads: 4,
                sub_samples: 2,
            },
            tables: vec![],
        }
    }

    #[test]
    fn snippet_cuts_on_char_boundary() {
        let text = format!("{}é tail", "a".repeat(199));
        assert_eq!(snippet(&text, 200), format!("{}é", "a".repeat(199)));
        assert_eq!(snippet("short", 200), "short");
    }

    #[test]
    fn non_ascii_non_json_body_is_parse_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/run");
            then.status(200).body(format!("{}é tail", "a".repeat(199)));
        });

        let client = ServiceClient::new(server.base_url()).unwrap();
        match client.submit_run(&request()) {
            Err(ServiceError::Parse(msg)) => assert!(msg.contains('é'), "{msg}"),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn submit_body_shape() {
        let body = request().to_json();
        assert_eq!(body["ModelName"], "RiskPaths");
        assert_eq!(body["Name"], "TestRun_1700000000");
        assert_eq!(body["Opts"]["Parameter.SimulationCases"], "5000");
        assert_eq!(body["Opts"]["OpenM.Threads"], "4");
        assert_eq!(body["Opts"]["OpenM.SubValues"], "2");
        assert!(body.get("Tables").is_none());

        let with_tables = SubmitRequest {
            tables: vec!["Income".into()],
            ..request()
        };
        assert_eq!(with_tables.to_json()["Tables"], serde_json::json!(["Income"]));
    }

    #[test]
    fn submit_returns_raw_json() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/run")
                .header("content-type", "application/json");
            then.status(200)
                .header("content-type", "application/json")
                .json_body(serde_json::json!({ "SubmitStamp": "2026_01_01_00_00_00_000" }));
        });

        let client = ServiceClient::new(server.base_url()).unwrap();
        let body = client.submit_run(&request()).unwrap();
        mock.assert();
        assert_eq!(body["SubmitStamp"], "2026_01_01_00_00_00_000");
    }

    #[test]
    fn submit_http_error_keeps_status_and_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/run");
            then.status(500).body("model not found");
        });

        let client = ServiceClient::new(server.base_url()).unwrap();
        match client.submit_run(&request()) {
            Err(ServiceError::Http(500, body)) => assert_eq!(body, "model not found"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn non_json_body_is_parse_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/run/abc/status");
            then.status(200).body("<html>ok</html>");
        });

        let client = ServiceClient::new(server.base_url()).unwrap();
        assert!(matches!(client.get_json("/api/run/abc/status"), Err(ServiceError::Parse(_))));
    }

    #[test]
    fn bom_prefixed_json_parses() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/x");
            then.status(200).body("\u{feff}{\"IsFinal\": true}");
        });

        let client = ServiceClient::new(format!("{}/", server.base_url())).unwrap();
        assert_eq!(client.get_json("/api/x").unwrap()["IsFinal"], true);
    }

    #[test]
    fn health_check() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/model-list");
            then.status(200).json_body(serde_json::json!([]));
        });
        assert!(ServiceClient::new(server.base_url()).unwrap().check_health());

        // Nothing listening on this port.
        assert!(!ServiceClient::new("http://127.0.0.1:9").unwrap().check_health());
    }
}
