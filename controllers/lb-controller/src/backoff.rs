//! # Fibonacci Backoff
//!
//! Retry delays for failed reconciles. The sequence grows more slowly than
//! an exponential backoff: 1s, 1s, 2s, 3s, 5s, 8s ... capped at the maximum.
//! A reconciler keeps one instance per failing trigger and drops it on
//! success, which restarts the sequence.

use std::time::Duration;

/// Minimum delay in seconds.
pub const DEFAULT_MIN_SECONDS: u64 = 1;
/// Maximum delay in seconds.
pub const DEFAULT_MAX_SECONDS: u64 = 300;

/// Fibonacci backoff calculator
///
/// Each backoff is the sum of the previous two backoffs.
#[derive(Debug, Clone)]
pub struct FibonacciBackoff {
    /// Previous backoff value in seconds
    prev_seconds: u64,
    /// Current backoff value in seconds
    current_seconds: u64,
    /// Maximum backoff value in seconds
    max_seconds: u64,
}

impl Default for FibonacciBackoff {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_SECONDS, DEFAULT_MAX_SECONDS)
    }
}

impl FibonacciBackoff {
    /// Create a new Fibonacci backoff with specified minimum and maximum values in seconds
    ///
    /// # Arguments
    ///
    /// * `min_seconds` - Minimum backoff duration (used for the first two values)
    /// * `max_seconds` - Maximum backoff duration (caps the sequence)
    #[must_use]
    pub fn new(min_seconds: u64, max_seconds: u64) -> Self {
        Self {
            prev_seconds: 0,
            current_seconds: min_seconds,
            max_seconds,
        }
    }

    /// Get the next backoff duration in seconds and advance the sequence
    pub fn next_backoff_seconds(&mut self) -> u64 {
        let result = self.current_seconds;
        let next = self.prev_seconds.saturating_add(self.current_seconds);
        self.prev_seconds = self.current_seconds;
        self.current_seconds = std::cmp::min(next, self.max_seconds);
        result
    }

    /// Get the next backoff duration as a `Duration` and advance the sequence
    #[must_use]
    pub fn next_backoff(&mut self) -> Duration {
        Duration::from_secs(self.next_backoff_seconds())
    }
}
