//! Per-client admission control in front of the scan pipeline.

mod backend;
mod cooldown;
mod decider;
mod decision;
mod identity;
mod reaper;
mod window;

pub use backend::AdmissionBackend;
pub use cooldown::CooldownGate;
pub use decider::AdmissionDecider;
pub(crate) use decision::ceil_secs;
pub use decision::{ClientStatus, Decision, DenyReason, Outcome, RateLimitTelemetry};
pub use identity::{TransportMetadata, FORWARDED_FOR_HEADER, REAL_IP_HEADER, UNKNOWN_IDENTITY};
pub use reaper::{Reaper, SweepStats};
pub use window::{ClientRecord, Observation, WindowCounter, WindowSnapshot};
