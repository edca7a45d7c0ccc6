// src/relay/worker.rs
use crate::config::{RetryConfig, TargetConfig};
use crate::metrics::MetricsCollector;
use crate::pool::AddressPool;
use crate::relay::{FailureKind, RelayOutcome, RelayRequest, RelayResult};
use crate::retry::{is_transient_status, RetryDecision, RetryStrategy};
use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Failures of a single attempt. Every variant is transient by
/// construction; non-transient upstream statuses are carried through as a
/// success outcome with their status code.
#[derive(Debug, thiserror::Error)]
enum AttemptError {
    #[error("request timed out via {address}")]
    Timeout { address: String, degraded: bool },

    #[error("connection failed via {address}: {source}")]
    Connect {
        address: String,
        degraded: bool,
        #[source]
        source: reqwest::Error,
    },

    #[error("upstream returned {status} via {address}")]
    UpstreamStatus {
        address: String,
        degraded: bool,
        status: StatusCode,
    },
}

impl AttemptError {
    fn address(&self) -> &str {
        match self {
            Self::Timeout { address, .. }
            | Self::Connect { address, .. }
            | Self::UpstreamStatus { address, .. } => address,
        }
    }

    fn degraded(&self) -> bool {
        match self {
            Self::Timeout { degraded, .. }
            | Self::Connect { degraded, .. }
            | Self::UpstreamStatus { degraded, .. } => *degraded,
        }
    }

    fn kind(&self) -> FailureKind {
        match self {
            Self::Timeout { .. } => FailureKind::Timeout,
            Self::Connect { .. } => FailureKind::Connect,
            Self::UpstreamStatus { .. } => FailureKind::UpstreamStatus,
        }
    }
}

struct AttemptSuccess {
    address: String,
    degraded: bool,
    status: u16,
    body: Value,
}

/// Performs the outbound call bound to a pool-assigned source address.
/// One client per address, built once at startup, so connection pools and
/// the local-address binding stay stable for the process lifetime.
pub struct RelayWorker {
    pool: Arc<AddressPool>,
    retry: RetryStrategy,
    clients: HashMap<String, Client>,
    metrics: Option<Arc<MetricsCollector>>,
}

impl RelayWorker {
    pub fn new(
        pool: Arc<AddressPool>,
        target: &TargetConfig,
        retry: RetryConfig,
        metrics: Option<Arc<MetricsCollector>>,
    ) -> Result<Self> {
        let mut clients = HashMap::new();
        for address in pool.addresses() {
            let client = Client::builder()
                .timeout(target.timeout())
                .local_address(address.ip)
                .build()
                .with_context(|| format!("failed to build client bound to {}", address.ip))?;
            clients.insert(address.id, client);
        }

        Ok(Self {
            pool,
            retry: RetryStrategy::new(retry),
            clients,
            metrics,
        })
    }

    /// Relay one request upstream. Always returns a result; any failure is
    /// converted at this boundary so the gateway's response shape stays
    /// uniform. Each attempt re-acquires a source address, so a failing
    /// address is not retried with itself.
    pub async fn relay(&self, request: RelayRequest) -> RelayResult {
        let start = Instant::now();
        let attempts = AtomicU32::new(0);

        let outcome = self
            .retry
            .execute_with_decision(
                || {
                    let attempt = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                    self.attempt(&request, attempt)
                },
                |_: &AttemptError| RetryDecision::Retry,
            )
            .await;

        let attempts = attempts.load(Ordering::SeqCst);
        let result = match outcome {
            Ok(success) => RelayResult {
                address: success.address,
                degraded: success.degraded,
                attempts,
                outcome: RelayOutcome::Success {
                    status: success.status,
                    body: success.body,
                },
            },
            Err(error) => {
                warn!(
                    address = %error.address(),
                    attempts,
                    "relay exhausted its retry budget: {}",
                    error
                );
                RelayResult {
                    address: error.address().to_string(),
                    degraded: error.degraded(),
                    attempts,
                    outcome: RelayOutcome::Failure {
                        kind: error.kind(),
                        message: error.to_string(),
                    },
                }
            }
        };

        if let Some(metrics) = &self.metrics {
            let label = if result.is_success() { "success" } else { "failure" };
            metrics.record_relay(label, start.elapsed());
        }

        result
    }

    async fn attempt(
        &self,
        request: &RelayRequest,
        attempt: u32,
    ) -> Result<AttemptSuccess, AttemptError> {
        let lease = self.pool.acquire();
        let address = lease.address.id.clone();

        if let Some(metrics) = &self.metrics {
            if lease.degraded {
                metrics.record_degraded_acquire();
            }
        }

        debug!(
            %address,
            attempt,
            target = %request.target,
            "issuing outbound call"
        );

        // Invariant: the pool is static after startup and clients were built
        // from the same address list.
        let client = self
            .clients
            .get(&address)
            .expect("client exists for every pooled address");

        let mut outbound = client.request(request.method.clone(), request.target.clone());
        for (name, value) in &request.headers {
            outbound = outbound.header(name, value);
        }
        if let Some(body) = &request.body {
            outbound = outbound.body(body.clone());
        }

        let outcome = match outbound.send().await {
            Ok(response) => {
                let status = response.status();
                if is_transient_status(status) {
                    Err(AttemptError::UpstreamStatus {
                        address: address.clone(),
                        degraded: lease.degraded,
                        status,
                    })
                } else {
                    match response.text().await {
                        Ok(text) => {
                            // A malformed body does not fail the relay; wrap
                            // the raw text as a JSON string instead.
                            let body = serde_json::from_str(&text)
                                .unwrap_or_else(|_| Value::String(text));
                            Ok(AttemptSuccess {
                                address: address.clone(),
                                degraded: lease.degraded,
                                status: status.as_u16(),
                                body,
                            })
                        }
                        Err(source) => Err(AttemptError::Connect {
                            address: address.clone(),
                            degraded: lease.degraded,
                            source,
                        }),
                    }
                }
            }
            Err(source) if source.is_timeout() => Err(AttemptError::Timeout {
                address: address.clone(),
                degraded: lease.degraded,
            }),
            Err(source) => Err(AttemptError::Connect {
                address: address.clone(),
                degraded: lease.degraded,
                source,
            }),
        };

        // Health is reported for every attempt, success or not, before the
        // retry machinery decides what happens next.
        let success = outcome.is_ok();
        self.pool.report_outcome(&address, success);
        if let Some(metrics) = &self.metrics {
            metrics.record_attempt(&address, success);
        }

        outcome
    }
}
