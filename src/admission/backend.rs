//! Admission backend trait for abstracting the decider behind the HTTP layer.

use async_trait::async_trait;

use super::decider::AdmissionDecider;
use super::decision::{ClientStatus, Decision, Outcome};
use super::identity::TransportMetadata;

/// Trait for admission backend implementations.
///
/// The HTTP service is generic over this trait so handlers can be driven
/// by the in-process decider or by a test double.
#[async_trait]
pub trait AdmissionBackend: Send + Sync {
    /// Decide whether the request described by `meta` may proceed.
    async fn admit(&self, meta: &TransportMetadata) -> Decision;

    /// Report how the expensive operation ended. Returns whether a
    /// cooldown was armed.
    async fn record_outcome(&self, identity: &str, outcome: Outcome) -> bool;

    /// Read-only state for `identity`.
    async fn status(&self, identity: &str) -> ClientStatus;
}

#[async_trait]
impl AdmissionBackend for AdmissionDecider {
    async fn admit(&self, meta: &TransportMetadata) -> Decision {
        AdmissionDecider::admit(self, meta)
    }

    async fn record_outcome(&self, identity: &str, outcome: Outcome) -> bool {
        AdmissionDecider::record_outcome(self, identity, outcome)
    }

    async fn status(&self, identity: &str) -> ClientStatus {
        AdmissionDecider::status(self, identity)
    }
}
