//! # Reconnect Backoff
//!
//! Provides a capped exponential backoff for reopening watch streams.
//!
//! A watch that was delivering notifications reconnects immediately: servers
//! close healthy watches on their own timeout, and that is not a failure.
//! Only consecutive sessions that delivered nothing back off, so an
//! unreachable store is not hammered in a hot loop.
//!
//! Sequence for consecutive unproductive sessions with `initial = 500ms`,
//! `max = 30s`: 0, 500ms, 1s, 2s, 4s, ... 30s (max).

use std::time::Duration;

/// Reconnect backoff calculator
///
/// Tracks how many sessions in a row ended without delivering a notification
/// and derives the delay before the next reconnect from that count.
#[derive(Debug, Clone)]
pub struct ReconnectBackoff {
    /// Delay after the second consecutive unproductive session
    initial: Duration,
    /// Upper bound for any delay
    max: Duration,
    /// Sessions in a row that delivered nothing
    consecutive_failures: u32,
}

impl Default for ReconnectBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(30))
    }
}

impl ReconnectBackoff {
    /// Create a new backoff with the given initial and maximum delays
    #[must_use]
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            consecutive_failures: 0,
        }
    }

    /// Backoff that always reconnects without delay
    #[must_use]
    pub fn immediate() -> Self {
        Self::new(Duration::ZERO, Duration::ZERO)
    }

    /// Get the delay before the next reconnect and advance the sequence
    ///
    /// `productive` reports whether the session that just ended delivered at
    /// least one notification; a productive session resets the sequence.
    pub fn next_delay(&mut self, productive: bool) -> Duration {
        if productive {
            self.reset();
        }
        let delay = Self::delay_for_attempt(self.consecutive_failures, self.initial, self.max);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        delay
    }

    /// Reset the backoff to the initial state
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Calculate the delay for a given attempt number (stateless)
    ///
    /// Attempt 0 is immediate; attempt `n` waits `initial * 2^(n-1)`, capped at `max`.
    #[must_use]
    pub fn delay_for_attempt(attempt: u32, initial: Duration, max: Duration) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        1u32.checked_shl(attempt - 1)
            .and_then(|factor| initial.checked_mul(factor))
            .map_or(max, |delay| delay.min(max))
    }
}
