//! Admission service HTTP handlers.

use axum::extract::{Path, Request, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{info, instrument};

use super::response::{decision_response, transport_metadata};
use crate::admission::{AdmissionBackend, ClientStatus, Outcome, UNKNOWN_IDENTITY};

/// Completion report for an admitted request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeReport {
    /// Identity returned by `/v1/admit`
    pub identity: String,
    /// How the scan ended
    pub outcome: Outcome,
}

/// Acknowledgement of an outcome report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutcomeAck {
    /// Identity the outcome was recorded against
    pub identity: String,
    /// Outcome as reported
    pub outcome: Outcome,
    /// Whether the report started a cooldown
    pub cooldown_armed: bool,
}

/// Build the admission service router.
///
/// The routes trust their caller: `/v1/outcome` arms a cooldown for any
/// identity it is given, and `/v1/status/{identity}` reports on any
/// identity. Bind the router where only the application running scans can
/// reach it, never on a client-facing listener.
pub fn router<B: AdmissionBackend + 'static>(backend: Arc<B>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/admit", post(admit::<B>))
        .route("/v1/outcome", post(outcome::<B>))
        .route("/v1/status", get(own_status::<B>))
        .route("/v1/status/{identity}", get(status::<B>))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(backend)
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Decide whether the calling client may run a scan.
#[instrument(skip_all)]
async fn admit<B: AdmissionBackend + 'static>(
    State(backend): State<Arc<B>>,
    request: Request,
) -> Response {
    let meta = transport_metadata(&request);
    let decision = backend.admit(&meta).await;

    info!(
        identity = %decision.identity(),
        allowed = decision.is_allowed(),
        reason = ?decision.reason(),
        "Admission decision made"
    );

    decision_response(&decision)
}

/// Record how an admitted scan ended.
///
/// The identity is not checked against the window store; the caller is
/// trusted to report only identities it admitted.
#[instrument(skip_all)]
async fn outcome<B: AdmissionBackend + 'static>(
    State(backend): State<Arc<B>>,
    Json(report): Json<OutcomeReport>,
) -> Json<OutcomeAck> {
    let identity = match report.identity.trim() {
        "" => UNKNOWN_IDENTITY.to_string(),
        trimmed => trimmed.to_string(),
    };

    let cooldown_armed = backend.record_outcome(&identity, report.outcome).await;

    Json(OutcomeAck {
        identity,
        outcome: report.outcome,
        cooldown_armed,
    })
}

/// Status of the calling client.
#[instrument(skip_all)]
async fn own_status<B: AdmissionBackend + 'static>(
    State(backend): State<Arc<B>>,
    request: Request,
) -> Json<ClientStatus> {
    let identity = transport_metadata(&request).resolve();
    Json(backend.status(&identity).await)
}

/// Status of an arbitrary identity.
#[instrument(skip_all)]
async fn status<B: AdmissionBackend + 'static>(
    State(backend): State<Arc<B>>,
    Path(identity): Path<String>,
) -> Json<ClientStatus> {
    Json(backend.status(&identity).await)
}
