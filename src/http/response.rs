//! Translation of admission decisions into HTTP responses.

use axum::extract::{ConnectInfo, Request};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::net::SocketAddr;

use crate::admission::{Decision, RateLimitTelemetry, TransportMetadata};

/// Requests allowed per window.
pub const RATE_LIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
/// Requests left in the current window.
pub const RATE_LIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
/// Seconds until the current window resets.
pub const RATE_LIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Body returned when a request is admitted through `/v1/admit`.
#[derive(Debug, Serialize)]
pub struct AdmittedBody {
    /// Always `true`
    pub success: bool,
    /// Resolved client identity, to be echoed back in `/v1/outcome`
    pub identity: String,
    /// Requests allowed per window
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// Seconds until the current window resets
    pub reset_after: u64,
}

/// Body returned when a request is refused.
#[derive(Debug, Serialize)]
pub struct DeniedBody {
    /// Always `false`
    pub success: bool,
    /// Human-readable refusal message
    pub error: String,
    /// Machine-readable reason code
    pub code: &'static str,
    /// Seconds until a retry may succeed; 0 when retrying will not help
    pub retry_after: u64,
}

/// Gather identity sources from an inbound request.
pub fn transport_metadata(request: &Request) -> TransportMetadata {
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    TransportMetadata::from_headers(request.headers(), remote_addr)
}

/// Write the `X-RateLimit-*` headers for an admitted request.
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, telemetry: &RateLimitTelemetry) {
    headers.insert(RATE_LIMIT_LIMIT, HeaderValue::from(telemetry.limit));
    headers.insert(RATE_LIMIT_REMAINING, HeaderValue::from(telemetry.remaining));
    headers.insert(
        RATE_LIMIT_RESET,
        HeaderValue::from(crate::admission::ceil_secs(telemetry.reset_after)),
    );
}

/// Build the response for a decision.
pub fn decision_response(decision: &Decision) -> Response {
    match decision {
        Decision::Allowed {
            identity,
            telemetry,
        } => {
            let mut headers = HeaderMap::new();
            apply_rate_limit_headers(&mut headers, telemetry);
            let body = AdmittedBody {
                success: true,
                identity: identity.clone(),
                limit: telemetry.limit,
                remaining: telemetry.remaining,
                reset_after: crate::admission::ceil_secs(telemetry.reset_after),
            };
            (StatusCode::OK, headers, Json(body)).into_response()
        }
        Decision::Denied { reason, .. } => {
            let status =
                StatusCode::from_u16(reason.status_code()).unwrap_or(StatusCode::TOO_MANY_REQUESTS);
            let retry_after = decision.retry_after_secs();

            let mut headers = HeaderMap::new();
            if retry_after > 0 {
                headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
            }

            let body = DeniedBody {
                success: false,
                error: decision.message(),
                code: reason.code(),
                retry_after,
            };
            (status, headers, Json(body)).into_response()
        }
    }
}
