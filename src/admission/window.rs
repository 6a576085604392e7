//! Per-identity request window with block escalation.

use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::decision::DenyReason;

/// Window state for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientRecord {
    /// Requests counted in the current window
    pub count: u32,
    /// When the current window began
    pub window_start: Instant,
    /// Whether the identity is serving a block
    pub blocked: bool,
    /// End of the block; meaningful only while `blocked`
    pub block_until: Instant,
}

impl ClientRecord {
    fn fresh(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            blocked: false,
            block_until: now,
        }
    }

    fn reset_window(&mut self, now: Instant) {
        self.count = 0;
        self.window_start = now;
    }

    /// Whether the record carries no live state at `now`.
    pub fn is_expired(&self, now: Instant, window: Duration) -> bool {
        if self.blocked {
            now >= self.block_until
        } else {
            now.saturating_duration_since(self.window_start) > window
        }
    }
}

/// Result of counting one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Request fits in the window.
    Allowed {
        /// Requests left in the window
        remaining: u32,
        /// When the window resets
        window_reset_at: Instant,
    },
    /// Request refused.
    Denied {
        /// `Blocked` or `RateLimitExceeded`
        reason: DenyReason,
        /// Time until the block lifts
        retry_after: Duration,
    },
}

/// Read-only projection of a record at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowSnapshot {
    /// Requests counted in the live window
    pub count: u32,
    /// Time until the live window resets
    pub reset_after: Duration,
    /// Time left on an active block, if any
    pub block_remaining: Option<Duration>,
}

/// Counts requests per identity inside a fixed-length window and
/// escalates to a longer block once the budget is exceeded.
///
/// Each identity's read-modify-write runs under its map shard's write
/// lock, so concurrent requests from one identity are serialized.
#[derive(Debug)]
pub struct WindowCounter {
    max_requests: u32,
    window: Duration,
    block: Duration,
    records: DashMap<String, ClientRecord>,
}

impl WindowCounter {
    /// Create a counter.
    pub fn new(max_requests: u32, window: Duration, block: Duration) -> Self {
        Self {
            max_requests,
            window,
            block,
            records: DashMap::new(),
        }
    }

    /// Requests allowed per window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Length of the counting window.
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Length of an escalated block.
    pub fn block(&self) -> Duration {
        self.block
    }

    /// Count one request from `identity` at `now`.
    pub fn observe(&self, identity: &str, now: Instant) -> Observation {
        let mut record = self
            .records
            .entry(identity.to_string())
            .or_insert_with(|| ClientRecord::fresh(now));

        if record.blocked {
            if now < record.block_until {
                let retry_after = record.block_until - now;
                trace!(identity = %identity, ?retry_after, "Request from blocked client");
                return Observation::Denied {
                    reason: DenyReason::Blocked,
                    retry_after,
                };
            }

            debug!(identity = %identity, "Block expired");
            record.blocked = false;
            record.reset_window(now);
        }

        if now.saturating_duration_since(record.window_start) > self.window {
            record.reset_window(now);
        }

        record.count += 1;

        if record.count > self.max_requests {
            record.blocked = true;
            record.block_until = now + self.block;
            debug!(
                identity = %identity,
                count = record.count,
                limit = self.max_requests,
                block_secs = self.block.as_secs(),
                "Window budget exceeded, blocking client"
            );
            return Observation::Denied {
                reason: DenyReason::RateLimitExceeded,
                retry_after: self.block,
            };
        }

        Observation::Allowed {
            remaining: self.max_requests - record.count,
            window_reset_at: record.window_start + self.window,
        }
    }

    /// Project the state of `identity` at `now` without mutating it.
    ///
    /// Returns `None` for identities with no record.
    pub fn snapshot(&self, identity: &str, now: Instant) -> Option<WindowSnapshot> {
        let record = *self.records.get(identity)?;

        if record.blocked && now < record.block_until {
            return Some(WindowSnapshot {
                count: record.count,
                reset_after: Duration::ZERO,
                block_remaining: Some(record.block_until - now),
            });
        }

        if record.is_expired(now, self.window) {
            return Some(WindowSnapshot::default());
        }

        let reset_at = record.window_start + self.window;
        Some(WindowSnapshot {
            count: record.count,
            reset_after: reset_at.saturating_duration_since(now),
            block_remaining: None,
        })
    }

    /// Copy of the raw record for `identity`.
    pub fn record(&self, identity: &str) -> Option<ClientRecord> {
        self.records.get(identity).map(|r| *r)
    }

    /// Remove every record that is expired at `now`. Returns the number removed.
    pub fn evict_expired(&self, now: Instant) -> usize {
        let before = self.records.len();
        self.records
            .retain(|_, record| !record.is_expired(now, self.window));
        before.saturating_sub(self.records.len())
    }

    /// Number of tracked identities.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no identities are tracked.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drop all records.
    pub fn clear(&self) {
        self.records.clear();
    }
}
