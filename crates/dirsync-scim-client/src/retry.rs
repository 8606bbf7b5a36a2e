//! Exponential backoff retry for directory calls.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::{ScimClientError, ScimClientResult};

/// Retry policy configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (0 = no retries).
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn should_retry(&self, attempt: u32, error: &ScimClientError) -> bool {
        attempt < self.max_retries && error.is_retryable()
    }

    /// Delay before the retry following `attempt`.
    ///
    /// A 429 with `Retry-After` uses that value; everything else is
    /// `base_delay * 2^attempt`. Both are capped at `max_delay`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32, error: &ScimClientError) -> Duration {
        let delay = match error {
            ScimClientError::RateLimited {
                retry_after_secs: Some(secs),
                ..
            } => Duration::from_secs(*secs),
            _ => self
                .base_delay
                .saturating_mul(2u32.saturating_pow(attempt.min(31))),
        };
        delay.min(self.max_delay)
    }

    /// Run `f` until it succeeds, fails with a non-retryable error, or the
    /// retry budget is spent.
    pub async fn execute<F, Fut, T>(&self, operation: &str, mut f: F) -> ScimClientResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ScimClientResult<T>>,
    {
        let mut attempt: u32 = 0;
        loop {
            match f().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(operation, attempt = attempt + 1, "Succeeded after retries");
                    }
                    return Ok(value);
                }
                Err(error) if self.should_retry(attempt, &error) => {
                    let delay = self.delay_for(attempt, &error);
                    debug!(
                        operation,
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        delay_ms = millis(delay),
                        error = %error,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) if attempt > 0 && error.is_retryable() => {
                    warn!(operation, attempts = attempt + 1, error = %error, "Max retries exceeded");
                    return Err(ScimClientError::MaxRetriesExceeded {
                        attempts: attempt + 1,
                        message: format!(
                            "{operation} failed after {} attempt(s): {error}",
                            attempt + 1
                        ),
                    });
                }
                Err(error) => return Err(error),
            }
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
