// src/gateway/mod.rs
use crate::relay::{RelayOutcome, RelayRequest, RelayResult, RelayWorker};
use hyper::{header, Body, Method, Request, Response, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};
use url::Url;
use uuid::Uuid;

/// The caller-facing failure message. The external contract is a 200 with
/// either an `{"ip": ...}` object or this bare JSON string; richer failure
/// detail stays in logs and metrics.
pub const RELAY_FAILURE_MESSAGE: &str = "Fail to fetch IP address";

/// Translates inbound HTTP into relay requests and shapes the response.
/// Always answers 200: internal faults never surface as a 5xx to our own
/// caller.
pub struct Gateway {
    worker: Arc<RelayWorker>,
    target: Url,
}

impl Gateway {
    pub fn new(worker: Arc<RelayWorker>, target: Url) -> Self {
        Self { worker, target }
    }

    pub async fn handle(&self, req: Request<Body>) -> Response<Body> {
        let request_id = Uuid::new_v4();

        // One route: GET on the root path. Anything else is a permanent
        // request error, answered without a relay attempt.
        if req.method() != Method::GET || req.uri().path() != "/" {
            warn!(
                %request_id,
                method = %req.method(),
                path = %req.uri().path(),
                "unsupported inbound request"
            );
            let message = format!("Unsupported request: {} {}", req.method(), req.uri().path());
            return json_response(&Value::String(message));
        }

        let relay_request = RelayRequest::get(self.target.clone());
        let worker = self.worker.clone();

        // The relay runs as its own task: if the caller disconnects, the
        // in-flight attempt still completes and its outcome still reaches
        // the pool's health tracking.
        let joined = tokio::spawn(async move { worker.relay(relay_request).await }).await;

        match joined {
            Ok(result) => self.render(request_id, result),
            Err(join_error) => {
                error!(%request_id, %join_error, "relay task failed to complete");
                json_response(&Value::String(RELAY_FAILURE_MESSAGE.to_string()))
            }
        }
    }

    fn render(&self, request_id: Uuid, result: RelayResult) -> Response<Body> {
        match result.outcome {
            RelayOutcome::Success { status, body } => {
                info!(
                    %request_id,
                    address = %result.address,
                    upstream_status = status,
                    attempts = result.attempts,
                    degraded = result.degraded,
                    "relay succeeded"
                );
                json_response(&body)
            }
            RelayOutcome::Failure { kind, message } => {
                warn!(
                    %request_id,
                    address = %result.address,
                    attempts = result.attempts,
                    degraded = result.degraded,
                    ?kind,
                    %message,
                    "relay failed"
                );
                json_response(&Value::String(RELAY_FAILURE_MESSAGE.to_string()))
            }
        }
    }
}

fn json_response(body: &Value) -> Response<Body> {
    let payload = serde_json::to_string(body).unwrap_or_else(|_| "null".to_string());
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(payload))
        .unwrap()
}
