// src/relay/result.rs
use reqwest::Method;
use serde_json::Value;
use url::Url;

/// One inbound call to be re-issued upstream. Built per request, never
/// persisted.
#[derive(Debug, Clone)]
pub struct RelayRequest {
    pub method: Method,
    pub target: Url,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RelayRequest {
    pub fn get(target: Url) -> Self {
        Self {
            method: Method::GET,
            target,
            headers: Vec::new(),
            body: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Timeout,
    Connect,
    UpstreamStatus,
}

#[derive(Debug)]
pub enum RelayOutcome {
    /// Upstream answered. Bodies that are not valid JSON are wrapped as a
    /// JSON string, so callers must handle both shapes.
    Success { status: u16, body: Value },
    Failure { kind: FailureKind, message: String },
}

/// Outcome of one relay, after retries. The worker always returns one of
/// these; no error crosses the relay boundary.
#[derive(Debug)]
pub struct RelayResult {
    /// Source address used by the final attempt.
    pub address: String,
    /// The pool had no healthy or unknown address left when the final
    /// attempt acquired its lease.
    pub degraded: bool,
    pub attempts: u32,
    pub outcome: RelayOutcome,
}

impl RelayResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, RelayOutcome::Success { .. })
    }
}
