//! Bounded retry with linearly growing backoff for remote calls.

use std::future::Future;
use std::time::Duration;

use crate::config::HttpSettings;
use crate::error::{Error, Result};

/// How often and how patiently a remote call is retried.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub retries: u32,
    /// Delay before retry `n` is `backoff * n`
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const fn new(retries: u32, backoff: Duration) -> Self {
        Self { retries, backoff }
    }

    pub const fn from_http(settings: &HttpSettings) -> Self {
        Self::new(settings.retries, settings.retry_backoff)
    }

    pub const fn max_attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

/// Run `call` until it succeeds, fails permanently, or attempts run out.
///
/// Only errors where [`Error::is_transient`] holds are retried; anything else
/// is returned as-is on the first occurrence. Exhaustion yields
/// [`Error::RetriesExhausted`] carrying the last failure.
pub async fn with_retries<T, F, Fut>(policy: RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max_attempts = policy.max_attempts();
    let mut attempt = 1u32;

    loop {
        match call().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(operation, attempt, "Remote call succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if !error.is_transient() => return Err(error),
            Err(error) if attempt >= max_attempts => {
                tracing::error!(
                    operation,
                    attempts = attempt,
                    "All attempts failed: {}",
                    error
                );
                return Err(Error::RetriesExhausted {
                    operation: operation.to_string(),
                    attempts: attempt,
                    last_error: error.to_string(),
                });
            }
            Err(error) => {
                let delay = policy.delay_after(attempt);
                tracing::warn!(
                    operation,
                    attempt,
                    max_attempts,
                    "Transient failure, retrying in {}ms: {}",
                    delay.as_millis(),
                    error
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
