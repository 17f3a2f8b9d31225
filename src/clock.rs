//! Monotonic time source for every interval comparison in the agent
//!
//! All timestamps are expressed as [`Duration`] elapsed since the clock was
//! created, so they never jump when the wall clock is adjusted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Source of monotonic elapsed time
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock started
    fn now(&self) -> Duration;
}

/// Clock backed by [`Instant`]
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced clock; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock already advanced to `start`
    pub fn starting_at(start: Duration) -> Self {
        let clock = Self::new();
        clock.set(start);
        clock
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, to: Duration) {
        self.millis.store(to.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

/// Strict "more than `interval` has passed since `since`" check
///
/// A `since` in the future (clock reset) never counts as elapsed.
pub fn elapsed_more_than(now: Duration, since: Duration, interval: Duration) -> bool {
    now.saturating_sub(since) > interval
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances_and_shares_time() {
        let clock = ManualClock::new();
        let other = clock.clone();

        clock.advance(Duration::from_millis(1500));

        assert_eq!(other.now(), Duration::from_millis(1500));
    }

    #[test]
    fn test_manual_clock_starting_at() {
        let clock = ManualClock::starting_at(Duration::from_secs(7));
        assert_eq!(clock.now(), Duration::from_secs(7));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }

    #[test]
    fn test_elapsed_is_strict() {
        let interval = Duration::from_secs(1);
        assert!(!elapsed_more_than(
            Duration::from_secs(1),
            Duration::ZERO,
            interval
        ));
        assert!(elapsed_more_than(
            Duration::from_millis(1001),
            Duration::ZERO,
            interval
        ));
    }

    #[test]
    fn test_elapsed_with_future_timestamp_is_false() {
        assert!(!elapsed_more_than(
            Duration::from_secs(1),
            Duration::from_secs(5),
            Duration::ZERO
        ));
    }
}
