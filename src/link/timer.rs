//! Interval timer used for debouncing and periodic polling

use std::time::Duration;
use tokio::time::Instant;

/// Fires at most once per `interval`
///
/// A timer that has never fired is due immediately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timer {
    interval: Duration,
    last_fired: Option<Instant>,
}

impl Timer {
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_fired: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_fired {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    /// Returns true and restarts the interval if the timer is due
    pub fn due_and_reset(&mut self, now: Instant) -> bool {
        if self.is_due(now) {
            self.last_fired = Some(now);
            true
        } else {
            false
        }
    }
}
