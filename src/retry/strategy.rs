// src/retry/strategy.rs

use crate::config::RetryConfig;
use reqwest::StatusCode;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryStrategy {
    config: RetryConfig,
}

#[derive(Debug)]
pub enum RetryDecision {
    Retry,
    NoRetry,
}

/// Upstream statuses worth another attempt: server-side faults. Client
/// errors are the caller's problem and are passed through as-is.
pub fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
}

impl RetryStrategy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Re-invoke `f` until it succeeds, the decision callback declines, or
    /// the attempt budget runs out. The caller's closure is responsible for
    /// acquiring fresh resources per attempt (the relay worker re-acquires
    /// a source address each time, so a failing address is never retried
    /// with itself).
    pub async fn execute_with_decision<F, Fut, T, E>(
        &self,
        mut f: F,
        should_retry: impl Fn(&E) -> RetryDecision,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match f().await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if let RetryDecision::NoRetry = should_retry(&error) {
                        debug!("Error is non-retryable: {}", error);
                        return Err(error);
                    }

                    if attempt >= self.config.max_attempts {
                        warn!("Giving up after {} attempts: {}", attempt, error);
                        return Err(error);
                    }

                    let backoff = self.calculate_backoff(attempt);
                    debug!(
                        "Attempt {} failed: {}. Retrying in {:?}",
                        attempt, error, backoff
                    );

                    sleep(backoff).await;
                }
            }
        }
    }

    /// Exponential backoff with jitter
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let base = self.config.backoff_base().as_millis() as u64;
        let max = self.config.backoff_max().as_millis() as u64;

        let exponential = base.saturating_mul(2u64.saturating_pow(attempt - 1));
        let capped = exponential.min(max);

        // Jitter: 0-25% of the calculated backoff
        let jitter = (capped as f64 * rand::random::<f64>() * 0.25) as u64;

        Duration::from_millis(capped + jitter)
    }
}
