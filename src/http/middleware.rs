//! Admission guard for routes that run the expensive scan path.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/analyze-product", post(analyze))
//!     .route_layer(axum::middleware::from_fn_with_state(decider.clone(), guard::<AdmissionDecider>));
//! ```
//!
//! Handlers may insert an [`Outcome`] into their response extensions to
//! say how the scan ended. Without one, a 2xx response counts as
//! [`Outcome::Success`] and anything else as [`Outcome::Failure`].

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use tracing::debug;

use super::response::{apply_rate_limit_headers, decision_response, transport_metadata};
use crate::admission::{AdmissionBackend, Decision, Outcome};

/// Admit the request before the inner handler runs and report its
/// outcome afterwards.
pub async fn guard<B: AdmissionBackend + 'static>(
    State(backend): State<Arc<B>>,
    request: Request,
    next: Next,
) -> Response {
    let meta = transport_metadata(&request);
    let decision = backend.admit(&meta).await;

    let (identity, telemetry) = match decision {
        Decision::Allowed {
            identity,
            telemetry,
        } => (identity, telemetry),
        denied => return decision_response(&denied),
    };

    let mut response = next.run(request).await;

    let outcome = response
        .extensions_mut()
        .remove::<Outcome>()
        .unwrap_or_else(|| {
            if response.status().is_success() {
                Outcome::Success
            } else {
                Outcome::Failure
            }
        });

    debug!(
        identity = %identity,
        status = response.status().as_u16(),
        ?outcome,
        "Guarded request finished"
    );
    backend.record_outcome(&identity, outcome).await;

    apply_rate_limit_headers(response.headers_mut(), &telemetry);
    response
}
