//! Periodic eviction of expired admission records.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::clock::Clock;

use super::cooldown::CooldownGate;
use super::window::WindowCounter;

/// Records removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Window records removed
    pub window_evicted: usize,
    /// Cooldown records removed
    pub cooldown_evicted: usize,
}

impl SweepStats {
    /// Total records removed.
    pub fn total(&self) -> usize {
        self.window_evicted + self.cooldown_evicted
    }
}

/// Sweeps both admission stores on a fixed period to bound memory.
///
/// Eviction never changes a decision: every store read already compares
/// against the stored expiry, and a missing record reads as fresh.
pub struct Reaper {
    window: Arc<WindowCounter>,
    cooldown: Arc<CooldownGate>,
    clock: Arc<dyn Clock>,
    interval: Duration,
}

impl Reaper {
    /// Create a reaper over the given stores.
    pub fn new(
        window: Arc<WindowCounter>,
        cooldown: Arc<CooldownGate>,
        clock: Arc<dyn Clock>,
        interval: Duration,
    ) -> Self {
        Self {
            window,
            cooldown,
            clock,
            interval,
        }
    }

    /// Sweep period.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Evict every record that is expired at `now`.
    pub fn sweep(&self, now: Instant) -> SweepStats {
        let stats = SweepStats {
            window_evicted: self.window.evict_expired(now),
            cooldown_evicted: self.cooldown.evict_expired(now),
        };

        debug!(
            window_evicted = stats.window_evicted,
            cooldown_evicted = stats.cooldown_evicted,
            window_remaining = self.window.len(),
            cooldown_remaining = self.cooldown.len(),
            "Sweep complete"
        );

        stats
    }

    /// Run [`Reaper::sweep`] every interval on the tokio runtime.
    ///
    /// The first sweep happens one full interval after spawning. Abort the
    /// returned handle to stop the reaper.
    pub fn spawn(self) -> JoinHandle<()> {
        info!(interval_secs = self.interval.as_secs(), "Starting reaper");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                self.sweep(self.clock.now());
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    struct Fixture {
        window: Arc<WindowCounter>,
        cooldown: Arc<CooldownGate>,
        clock: Arc<ManualClock>,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                window: Arc::new(WindowCounter::new(3, secs(30), secs(120))),
                cooldown: Arc::new(CooldownGate::new(secs(30))),
                clock: Arc::new(ManualClock::new()),
            }
        }

        fn reaper(&self, interval: Duration) -> Reaper {
            Reaper::new(
                self.window.clone(),
                self.cooldown.clone(),
                self.clock.clone(),
                interval,
            )
        }
    }

    #[test]
    fn test_sweep_removes_only_expired_records() {
        let f = Fixture::new();
        let t = |n| f.clock.at(secs(n));

        f.window.observe("idle", t(0));
        f.window.observe("active", t(50));
        for _ in 0..4 {
            f.window.observe("blocked", t(0));
        }
        f.cooldown.arm("cooled", t(0));
        f.cooldown.arm("cooling", t(40));

        let stats = f.reaper(secs(300)).sweep(t(60));

        assert_eq!(
            stats,
            SweepStats {
                window_evicted: 1,
                cooldown_evicted: 1,
            }
        );
        assert_eq!(stats.total(), 2);
        assert!(f.window.record("idle").is_none());
        assert!(f.window.record("active").is_some());
        assert!(f.window.record("blocked").is_some());
        assert_eq!(f.cooldown.len(), 1);
        assert!(f.cooldown.check("cooling", t(60)).is_some());
    }

    #[test]
    fn test_sweep_after_block_ends() {
        let f = Fixture::new();
        let t = |n| f.clock.at(secs(n));

        for _ in 0..4 {
            f.window.observe("blocked", t(0));
        }
        let reaper = f.reaper(secs(300));

        assert_eq!(reaper.sweep(t(119)).window_evicted, 0);
        assert_eq!(reaper.sweep(t(120)).window_evicted, 1);
        assert!(f.window.is_empty());
    }

    #[test]
    fn test_sweep_on_empty_stores() {
        let f = Fixture::new();
        let stats = f.reaper(secs(300)).sweep(f.clock.now());
        assert_eq!(stats, SweepStats::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_reaper_sweeps_periodically() {
        let f = Fixture::new();
        f.window.observe("idle", f.clock.now());
        f.cooldown.arm("cooled", f.clock.now());
        f.clock.advance(secs(31));

        let handle = f.reaper(secs(300)).spawn();

        tokio::time::sleep(secs(1)).await;
        assert_eq!(f.window.len(), 1, "no sweep before the first interval");

        tokio::time::sleep(secs(300)).await;
        assert!(f.window.is_empty());
        assert!(f.cooldown.is_empty());

        handle.abort();
    }
}
