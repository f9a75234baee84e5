//! Exponential backoff for polling in-flight builds.

use std::time::Duration;

/// Doubling delay sequence, capped at a maximum.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl ExponentialBackoff {
    /// Creates a backoff starting at `initial` and capping at `max`.
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.min(max);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    /// Returns the delay to wait now and advances to the next one.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Returns the next delay without advancing.
    pub fn peek(&self) -> Duration {
        self.current
    }

    /// Restarts the sequence.
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
