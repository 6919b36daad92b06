//! HTTP execution with bounded retry.
//!
//! The upstream API fails transiently often enough that every call goes
//! through this wrapper: a fixed number of extra attempts with a fixed
//! inter-attempt delay (no exponential backoff, matching the observed
//! recovery behavior of the endpoints). Cancellation aborts immediately,
//! both between attempts and during the delay.

use crate::errors::HarvestError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How much of a failed response body is kept for diagnostics.
const BODY_CONTEXT_LIMIT: usize = 2048;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Extra attempts beyond the first (total attempts = max_retries + 1).
    pub max_retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_secs(10),
        }
    }
}

/// HTTP client that retries on transport failures and non-2xx statuses.
pub struct RetryingClient {
    client: reqwest::Client,
    policy: RetryPolicy,
}

impl RetryingClient {
    pub fn new(timeout_sec: u64, policy: RetryPolicy) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()
            .expect("Failed to create HTTP client");

        Self { client, policy }
    }

    /// The underlying client, for building requests.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Execute a request, retrying per policy.
    ///
    /// On exhaustion the last failure is surfaced including response body
    /// context. Transient per-attempt failures are logged, not surfaced.
    pub async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, HarvestError> {
        let max_attempts = self.policy.max_retries + 1;
        let mut last_failure = String::new();

        for attempt in 1..=max_attempts {
            if cancel.is_cancelled() {
                return Err(HarvestError::Cancelled);
            }

            let outcome = match request.try_clone() {
                Some(cloned) => cloned.send().await,
                None => {
                    return Err(HarvestError::Request {
                        attempts: 0,
                        context: "request is not cloneable for retry".to_string(),
                    })
                }
            };

            match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    last_failure = format!("status {}: {}", status, truncate(&body));
                }
                Err(e) => {
                    last_failure = format!("transport error: {}", e);
                }
            }

            warn!(
                "Request failed {}/{}: {}",
                attempt, max_attempts, last_failure
            );

            if attempt < max_attempts {
                info!("Retry in {:?}...", self.policy.retry_delay);
                tokio::select! {
                    _ = tokio::time::sleep(self.policy.retry_delay) => {}
                    _ = cancel.cancelled() => return Err(HarvestError::Cancelled),
                }
            }
        }

        Err(HarvestError::Request {
            attempts: max_attempts,
            context: last_failure,
        })
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(BODY_CONTEXT_LIMIT) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
