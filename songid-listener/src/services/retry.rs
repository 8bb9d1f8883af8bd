//! Remote call retry policy
//!
//! Typed failure classification for remote identification plus the linear
//! backoff loop that acts on it.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Remote identification failure, classified by the transport layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Network/server hiccup worth retrying
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Provider quota or client-side rate limit exhausted
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Request rejected for a reason a retry won't fix (auth, bad request)
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// Provider answered with something that isn't the expected JSON shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl RemoteError {
    /// Only transient failures are retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Transient(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RemoteError::Transient(_) => "transient",
            RemoteError::QuotaExceeded(_) => "quota_exceeded",
            RemoteError::Permanent(_) => "permanent",
            RemoteError::MalformedResponse(_) => "malformed_response",
        }
    }
}

/// Retry cap and linear backoff step
///
/// Attempt `n` (1-based) that fails transiently is followed by a sleep of
/// `backoff_step * n`: 2s, 4s, 6s with the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_step: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_step: Duration) -> Self {
        Self {
            max_retries,
            backoff_step,
        }
    }

    /// Total attempts including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay after failed attempt `attempt` (1-based)
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    /// Run `operation` until it succeeds, fails non-transiently, or the cap is hit
    ///
    /// **Algorithm:**
    /// 1. Attempt operation
    /// 2. Success or non-retryable error: return it
    /// 3. Transient error with retries left: log WARN, sleep, retry
    /// 4. Transient error with no retries left: return the last error
    pub async fn run<F, Fut, T>(&self, operation_name: &str, mut operation: F) -> Result<T, RemoteError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 0;

        loop {
            attempt += 1;

            match operation(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        tracing::debug!(operation = operation_name, attempt, "Succeeded after retry");
                    }
                    return Ok(result);
                }
                Err(err) if !err.is_retryable() => {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        kind = err.kind(),
                        "Not retrying"
                    );
                    return Err(err);
                }
                Err(err) => {
                    if attempt >= self.max_attempts() {
                        tracing::warn!(
                            operation = operation_name,
                            attempt,
                            error = %err,
                            "Giving up after max retries"
                        );
                        return Err(err);
                    }

                    let delay = self.backoff_for(attempt);
                    tracing::warn!(
                        operation = operation_name,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
