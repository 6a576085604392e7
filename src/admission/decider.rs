//! Admission decider: combines the allow-list, cooldown gate and window
//! counter into one decision per request.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

use crate::clock::Clock;
use crate::config::AdmissionConfig;

use super::cooldown::CooldownGate;
use super::decision::{ceil_secs, ClientStatus, Decision, DenyReason, Outcome, RateLimitTelemetry};
use super::identity::TransportMetadata;
use super::window::{Observation, WindowCounter};

/// Decides whether a client may run the expensive scan path.
///
/// Checks run in a fixed order: allow-list, cooldown, window. A client
/// refused by its cooldown is never charged against its window.
pub struct AdmissionDecider {
    allow_list: HashSet<String>,
    window: Arc<WindowCounter>,
    cooldown: Arc<CooldownGate>,
    clock: Arc<dyn Clock>,
}

impl AdmissionDecider {
    /// Create a decider with fresh stores built from `config`.
    pub fn new(config: &AdmissionConfig, clock: Arc<dyn Clock>) -> Self {
        let window = Arc::new(WindowCounter::new(
            config.max_requests,
            config.window(),
            config.block(),
        ));
        let cooldown = Arc::new(CooldownGate::new(config.cooldown()));
        Self::with_stores(config.allow_list.iter().cloned(), window, cooldown, clock)
    }

    /// Create a decider over existing stores.
    pub fn with_stores<I>(
        allow_list: I,
        window: Arc<WindowCounter>,
        cooldown: Arc<CooldownGate>,
        clock: Arc<dyn Clock>,
    ) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let allow_list: HashSet<String> = allow_list
            .into_iter()
            .map(|entry| entry.trim().to_string())
            .filter(|entry| !entry.is_empty())
            .collect();

        Self {
            allow_list,
            window,
            cooldown,
            clock,
        }
    }

    /// Decide on a request described by its transport metadata.
    pub fn admit(&self, meta: &TransportMetadata) -> Decision {
        let identity = meta.resolve();
        self.decide(&identity, self.clock.now())
    }

    /// Decide on a request from an already-resolved identity.
    pub fn admit_identity(&self, identity: &str) -> Decision {
        self.decide(identity, self.clock.now())
    }

    /// Decide on a request from `identity` at `now`.
    pub fn decide(&self, identity: &str, now: Instant) -> Decision {
        let decision = self.evaluate(identity, now);

        match &decision {
            Decision::Allowed { telemetry, .. } => trace!(
                identity = %identity,
                remaining = telemetry.remaining,
                "Request admitted"
            ),
            Decision::Denied {
                reason,
                retry_after,
                ..
            } => debug!(
                identity = %identity,
                reason = %reason,
                retry_after_secs = ceil_secs(*retry_after),
                "Request denied"
            ),
        }

        decision
    }

    fn evaluate(&self, identity: &str, now: Instant) -> Decision {
        if !self.allow_list.is_empty() && !self.allow_list.contains(identity) {
            return Decision::Denied {
                identity: identity.to_string(),
                reason: DenyReason::NotAllowed,
                retry_after: Duration::ZERO,
            };
        }

        if let Some(retry_after) = self.cooldown.check(identity, now) {
            return Decision::Denied {
                identity: identity.to_string(),
                reason: DenyReason::CooldownActive,
                retry_after,
            };
        }

        match self.window.observe(identity, now) {
            Observation::Allowed {
                remaining,
                window_reset_at,
            } => Decision::Allowed {
                identity: identity.to_string(),
                telemetry: RateLimitTelemetry {
                    limit: self.window.max_requests(),
                    remaining,
                    reset_after: window_reset_at.saturating_duration_since(now),
                },
            },
            Observation::Denied {
                reason,
                retry_after,
            } => Decision::Denied {
                identity: identity.to_string(),
                reason,
                retry_after,
            },
        }
    }

    /// Report how the expensive operation ended for `identity`.
    ///
    /// Success and upstream OCR failures arm the cooldown; other failures
    /// do not. Returns whether a cooldown was armed.
    pub fn record_outcome(&self, identity: &str, outcome: Outcome) -> bool {
        if !outcome.arms_cooldown() {
            debug!(identity = %identity, ?outcome, "Outcome does not arm cooldown");
            return false;
        }

        self.cooldown.arm(identity, self.clock.now());
        info!(identity = %identity, ?outcome, "Scan finished, cooldown started");
        true
    }

    /// Arm the cooldown after a successful scan.
    pub fn mark_success(&self, identity: &str) {
        self.record_outcome(identity, Outcome::Success);
    }

    /// Current admission state for `identity`. Does not count as a request.
    pub fn status(&self, identity: &str) -> ClientStatus {
        let now = self.clock.now();
        let limit = self.window.max_requests();
        let window = self.window.snapshot(identity, now).unwrap_or_default();
        let cooldown = self.cooldown.check(identity, now).unwrap_or_default();

        ClientStatus {
            identity: identity.to_string(),
            count: window.count,
            limit,
            remaining: limit.saturating_sub(window.count),
            reset_after_secs: ceil_secs(window.reset_after),
            blocked: window.block_remaining.is_some(),
            block_remaining_secs: window.block_remaining.map(ceil_secs).unwrap_or(0),
            cooldown_remaining_secs: ceil_secs(cooldown),
        }
    }

    /// The window counter store.
    pub fn window_counter(&self) -> &Arc<WindowCounter> {
        &self.window
    }

    /// The cooldown store.
    pub fn cooldown_gate(&self) -> &Arc<CooldownGate> {
        &self.cooldown
    }

    /// The clock decisions are made against.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn secs(n: u64) -> Duration {
        Duration::from_secs(n)
    }

    fn decider_with(config: AdmissionConfig) -> (AdmissionDecider, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let decider = AdmissionDecider::new(&config, clock.clone());
        (decider, clock)
    }

    fn decider() -> (AdmissionDecider, Arc<ManualClock>) {
        decider_with(AdmissionConfig::default())
    }

    fn assert_denied(decision: &Decision, reason: DenyReason, retry_secs: u64) {
        assert_eq!(decision.reason(), Some(reason), "decision: {:?}", decision);
        assert_eq!(decision.retry_after_secs(), retry_secs);
    }

    fn remaining(decision: &Decision) -> u32 {
        match decision {
            Decision::Allowed { telemetry, .. } => telemetry.remaining,
            other => panic!("expected Allowed, got {:?}", other),
        }
    }

    #[test]
    fn test_window_and_block_scenario() {
        let (decider, clock) = decider();

        for (t, left) in [(0, 2), (5, 1), (10, 0)] {
            clock.set(secs(t));
            assert_eq!(remaining(&decider.admit_identity("a")), left);
        }

        clock.set(secs(15));
        let decision = decider.admit_identity("a");
        assert_denied(&decision, DenyReason::RateLimitExceeded, 120);
        assert_eq!(decision.status_code(), 429);

        clock.set(secs(16));
        assert_denied(&decider.admit_identity("a"), DenyReason::Blocked, 119);

        clock.set(secs(125));
        assert_denied(&decider.admit_identity("a"), DenyReason::Blocked, 10);

        clock.set(secs(135));
        assert_eq!(remaining(&decider.admit_identity("a")), 2);
    }

    #[test]
    fn test_cooldown_scenario() {
        let (decider, clock) = decider();

        decider.mark_success("a");

        clock.set(secs(20));
        let decision = decider.admit_identity("a");
        assert_denied(&decision, DenyReason::CooldownActive, 10);
        assert_eq!(decision.status_code(), 429);

        clock.set(secs(31));
        assert!(decider.admit_identity("a").is_allowed());
    }

    #[test]
    fn test_cooldown_requests_not_charged_to_window() {
        let (decider, clock) = decider();

        decider.mark_success("a");
        for t in 1..20 {
            clock.set(secs(t));
            assert!(!decider.admit_identity("a").is_allowed());
        }
        assert!(decider.window_counter().record("a").is_none());

        clock.set(secs(30));
        assert_eq!(remaining(&decider.admit_identity("a")), 2);
    }

    #[test]
    fn test_cooldown_overrides_open_window() {
        let (decider, clock) = decider();

        assert!(decider.admit_identity("a").is_allowed());
        decider.mark_success("a");

        clock.set(secs(1));
        assert_denied(&decider.admit_identity("a"), DenyReason::CooldownActive, 29);
        assert_eq!(decider.window_counter().record("a").unwrap().count, 1);
    }

    #[test]
    fn test_outcomes() {
        let (decider, _clock) = decider();

        assert!(decider.record_outcome("ok", Outcome::Success));
        assert!(decider.record_outcome("ocr", Outcome::UpstreamFailure));
        assert!(!decider.record_outcome("other", Outcome::Failure));

        assert_eq!(decider.admit_identity("ok").reason(), Some(DenyReason::CooldownActive));
        assert_eq!(decider.admit_identity("ocr").reason(), Some(DenyReason::CooldownActive));
        assert!(decider.admit_identity("other").is_allowed());
    }

    #[test]
    fn test_allow_list() {
        let config = AdmissionConfig {
            allow_list: vec!["10.0.0.1".to_string(), " 10.0.0.2 ".to_string()],
            ..AdmissionConfig::default()
        };
        let (decider, _clock) = decider_with(config);

        let decision = decider.admit_identity("203.0.113.9");
        assert_denied(&decision, DenyReason::NotAllowed, 0);
        assert_eq!(decision.status_code(), 403);
        assert!(decider.window_counter().is_empty());

        assert!(decider.admit_identity("10.0.0.1").is_allowed());
        assert!(decider.admit_identity("10.0.0.2").is_allowed());
    }

    #[test]
    fn test_empty_allow_list_admits_everyone() {
        let config = AdmissionConfig {
            allow_list: vec![String::new()],
            ..AdmissionConfig::default()
        };
        let (decider, _clock) = decider_with(config);
        assert!(decider.admit_identity("203.0.113.9").is_allowed());
    }

    #[test]
    fn test_admit_resolves_identity() {
        let (decider, _clock) = decider();
        let meta = TransportMetadata {
            forwarded_for: Some("203.0.113.7, 10.0.0.1".to_string()),
            real_ip: None,
            remote_addr: Some("127.0.0.1:4000".parse().unwrap()),
        };

        let decision = decider.admit(&meta);
        assert_eq!(decision.identity(), "203.0.113.7");
        assert!(decider.window_counter().record("203.0.113.7").is_some());
    }

    #[test]
    fn test_missing_identity_shares_bucket() {
        let (decider, _clock) = decider();
        let meta = TransportMetadata::default();

        for _ in 0..3 {
            assert!(decider.admit(&meta).is_allowed());
        }
        assert_eq!(
            decider.admit(&meta).reason(),
            Some(DenyReason::RateLimitExceeded)
        );
    }

    #[test]
    fn test_allowed_telemetry() {
        let (decider, clock) = decider();

        decider.admit_identity("a");
        clock.set(secs(12));
        match decider.admit_identity("a") {
            Decision::Allowed { telemetry, .. } => {
                assert_eq!(telemetry.limit, 3);
                assert_eq!(telemetry.remaining, 1);
                assert_eq!(telemetry.reset_after, secs(18));
            }
            other => panic!("expected Allowed, got {:?}", other),
        }
    }

    #[test]
    fn test_status() {
        let (decider, clock) = decider();

        let status = decider.status("a");
        assert_eq!(status.count, 0);
        assert_eq!(status.remaining, 3);
        assert!(!status.blocked);

        decider.admit_identity("a");
        decider.mark_success("a");
        clock.set(secs(5));

        let status = decider.status("a");
        assert_eq!(status.count, 1);
        assert_eq!(status.limit, 3);
        assert_eq!(status.remaining, 2);
        assert_eq!(status.reset_after_secs, 25);
        assert_eq!(status.cooldown_remaining_secs, 25);
        assert!(!status.blocked);

        // Status queries are not counted.
        assert_eq!(decider.window_counter().record("a").unwrap().count, 1);
    }

    #[test]
    fn test_status_while_blocked() {
        let (decider, clock) = decider();

        for _ in 0..4 {
            decider.admit_identity("a");
        }
        clock.set(secs(20));

        let status = decider.status("a");
        assert!(status.blocked);
        assert_eq!(status.block_remaining_secs, 100);
        assert_eq!(status.remaining, 0);
    }

    #[test]
    fn test_concurrent_admissions() {
        let (decider, _clock) = decider();
        let decider = Arc::new(decider);
        let attempts = 3 + 5;

        let handles: Vec<_> = (0..attempts)
            .map(|_| {
                let decider = Arc::clone(&decider);
                std::thread::spawn(move || decider.admit_identity("shared"))
            })
            .collect();

        let decisions: Vec<Decision> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let allowed = decisions.iter().filter(|d| d.is_allowed()).count();

        assert_eq!(allowed, 3);
        assert!(decisions
            .iter()
            .filter(|d| !d.is_allowed())
            .all(|d| matches!(
                d.reason(),
                Some(DenyReason::RateLimitExceeded) | Some(DenyReason::Blocked)
            )));
    }

    #[test]
    fn test_longest_accepted_durations() {
        let year = 365 * 24 * 60 * 60;
        let config = AdmissionConfig {
            block_secs: year,
            cooldown_secs: year,
            ..AdmissionConfig::default()
        };
        config.validate().unwrap();
        let (decider, _clock) = decider_with(config);

        for _ in 0..3 {
            assert!(decider.admit_identity("a").is_allowed());
        }
        assert_denied(&decider.admit_identity("a"), DenyReason::RateLimitExceeded, year);

        decider.mark_success("b");
        assert_denied(&decider.admit_identity("b"), DenyReason::CooldownActive, year);
    }
}
