//! Clock abstraction for admission control.
//!
//! Every admission component reads time from one injected [`Clock`], so a
//! process uses a single monotonic source and tests can drive time by hand.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

/// Real monotonic clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually driven clock for tests and simulations.
///
/// Time starts at an arbitrary origin and only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    /// Create a clock positioned at its origin.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// The instant `offset` after the origin.
    pub fn at(&self, offset: Duration) -> Instant {
        self.origin + offset
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }

    /// Position the clock at `offset` after the origin.
    pub fn set(&self, offset: Duration) {
        *self.offset.lock() = offset;
    }

    /// Time elapsed since the origin.
    pub fn elapsed(&self) -> Duration {
        *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.offset.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_manual_clock_starts_at_origin() {
        let clock = ManualClock::new();
        assert_eq!(clock.now(), clock.at(Duration::ZERO));
    }

    #[test]
    fn test_manual_clock_advance_and_set() {
        let clock = ManualClock::new();

        clock.advance(Duration::from_secs(5));
        clock.advance(Duration::from_secs(10));
        assert_eq!(clock.elapsed(), Duration::from_secs(15));
        assert_eq!(clock.now(), clock.at(Duration::from_secs(15)));

        clock.set(Duration::from_secs(2));
        assert_eq!(clock.now(), clock.at(Duration::from_secs(2)));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let t1 = clock.now();
        let t2 = clock.now();
        assert!(t2 >= t1);
    }

    #[test]
    fn test_clock_trait_object() {
        let manual = Arc::new(ManualClock::new());
        let clock: Arc<dyn Clock> = manual.clone();

        manual.advance(Duration::from_secs(1));
        assert_eq!(clock.now(), manual.at(Duration::from_secs(1)));
    }
}
