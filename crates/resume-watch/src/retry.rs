//! Bounded retry for single request/response store calls.
//!
//! Wraps one-shot calls such as the resume-token probe. The long-lived watch
//! stream is never retried here; reconnects belong to the reconciliation loop.

use crate::backoff::ReconnectBackoff;
use crate::error::StoreError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Retry policy with capped exponential delay between attempts.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200), Duration::from_secs(5))
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first call; zero is treated as one.
    #[must_use]
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
        }
    }

    /// Exactly one attempt.
    #[must_use]
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    /// Run `op`, retrying transient failures until attempts are exhausted.
    ///
    /// Expiry and decode failures are returned immediately.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, StoreError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = ReconnectBackoff::delay_for_attempt(
                        attempt,
                        self.initial_delay,
                        self.max_delay,
                    );
                    debug!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Retrying store call"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
