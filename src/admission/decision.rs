//! Admission decisions and the values reported alongside them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// Identity is not on the configured allow-list
    NotAllowed,
    /// Identity is serving a post-scan cooldown
    CooldownActive,
    /// Identity is serving an escalated block
    Blocked,
    /// This request pushed the identity over its window budget
    RateLimitExceeded,
}

impl DenyReason {
    /// Machine-readable reason code.
    pub fn code(&self) -> &'static str {
        match self {
            DenyReason::NotAllowed => "not_allowed",
            DenyReason::CooldownActive => "cooldown_active",
            DenyReason::Blocked => "blocked",
            DenyReason::RateLimitExceeded => "rate_limit_exceeded",
        }
    }

    /// HTTP status code a caller should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            DenyReason::NotAllowed => 403,
            _ => 429,
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Rate limit figures surfaced on an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitTelemetry {
    /// Requests allowed per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Time until the current window resets
    pub reset_after: Duration,
}

/// The result of one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// The expensive operation may proceed.
    Allowed {
        /// Resolved client identity
        identity: String,
        /// Window figures for response metadata
        telemetry: RateLimitTelemetry,
    },
    /// The request must be refused.
    Denied {
        /// Resolved client identity
        identity: String,
        /// Why the request was refused
        reason: DenyReason,
        /// How long the client should wait before retrying
        retry_after: Duration,
    },
}

impl Decision {
    /// Whether the request was admitted.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }

    /// The identity the decision was made for.
    pub fn identity(&self) -> &str {
        match self {
            Decision::Allowed { identity, .. } | Decision::Denied { identity, .. } => identity,
        }
    }

    /// The denial reason, if denied.
    pub fn reason(&self) -> Option<DenyReason> {
        match self {
            Decision::Allowed { .. } => None,
            Decision::Denied { reason, .. } => Some(*reason),
        }
    }

    /// Retry delay in whole seconds, rounded up. Zero when allowed.
    pub fn retry_after_secs(&self) -> u64 {
        match self {
            Decision::Allowed { .. } => 0,
            Decision::Denied { retry_after, .. } => ceil_secs(*retry_after),
        }
    }

    /// HTTP status code for this decision.
    pub fn status_code(&self) -> u16 {
        match self {
            Decision::Allowed { .. } => 200,
            Decision::Denied { reason, .. } => reason.status_code(),
        }
    }

    /// Human-readable explanation.
    pub fn message(&self) -> String {
        let secs = self.retry_after_secs();
        match self.reason() {
            None => "Request admitted".to_string(),
            Some(DenyReason::NotAllowed) => "Access denied: client is not allowed".to_string(),
            Some(DenyReason::CooldownActive) => format!(
                "Please wait {} seconds before scanning again",
                secs
            ),
            Some(DenyReason::Blocked) => format!(
                "Too many requests: client is blocked for another {} seconds",
                secs
            ),
            Some(DenyReason::RateLimitExceeded) => format!(
                "Too many requests: rate limit exceeded, blocked for {} seconds",
                secs
            ),
        }
    }
}

/// What happened to the expensive operation after an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The scan completed
    Success,
    /// The scan failed inside the OCR dependency
    UpstreamFailure,
    /// The scan failed for any other reason
    Failure,
}

impl Outcome {
    /// Whether this outcome starts a cooldown for the client.
    pub fn arms_cooldown(&self) -> bool {
        matches!(self, Outcome::Success | Outcome::UpstreamFailure)
    }
}

/// Read-only view of one identity's admission state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientStatus {
    /// The identity queried
    pub identity: String,
    /// Requests counted in the current window
    pub count: u32,
    /// Requests allowed per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Seconds until the current window resets
    pub reset_after_secs: u64,
    /// Whether the identity is serving a block
    pub blocked: bool,
    /// Seconds left on the block
    pub block_remaining_secs: u64,
    /// Seconds left on the cooldown
    pub cooldown_remaining_secs: u64,
}

/// Round a duration up to whole seconds.
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    if duration.subsec_nanos() > 0 {
        duration.as_secs() + 1
    } else {
        duration.as_secs()
    }
}
