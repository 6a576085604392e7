//! Post-scan cooldown gate.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Holds, per identity, the instant until which further scans are refused.
///
/// Records are only ever removed by [`CooldownGate::evict_expired`]; reads
/// compare against the stored instant, so a stale record never gates.
#[derive(Debug)]
pub struct CooldownGate {
    cooldown: Duration,
    active_until: RwLock<HashMap<String, Instant>>,
}

impl CooldownGate {
    /// Create a gate with the given cooldown length.
    pub fn new(cooldown: Duration) -> Self {
        Self {
            cooldown,
            active_until: RwLock::new(HashMap::new()),
        }
    }

    /// Length of a cooldown.
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Time left on `identity`'s cooldown, or `None` if it is not gated.
    pub fn check(&self, identity: &str, now: Instant) -> Option<Duration> {
        let active_until = self.active_until.read();
        active_until
            .get(identity)
            .filter(|until| now < **until)
            .map(|until| *until - now)
    }

    /// Start a cooldown for `identity` at `now`, replacing any existing one.
    pub fn arm(&self, identity: &str, now: Instant) {
        let until = now + self.cooldown;
        self.active_until.write().insert(identity.to_string(), until);
        debug!(
            identity = %identity,
            cooldown_secs = self.cooldown.as_secs(),
            "Cooldown armed"
        );
    }

    /// Remove every record whose cooldown has ended at `now`.
    /// Returns the number removed.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let mut active_until = self.active_until.write();
        let before = active_until.len();
        active_until.retain(|_, until| now < *until);
        before - active_until.len()
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        self.active_until.read().len()
    }

    /// Whether no identities are tracked.
    pub fn is_empty(&self) -> bool {
        self.active_until.read().is_empty()
    }

    /// Drop all records.
    pub fn clear(&self) {
        self.active_until.write().clear();
    }
}
