//! HTTP surface for the admission service.

mod middleware;
mod response;
mod server;
mod service;

pub use middleware::guard;
pub use response::{
    apply_rate_limit_headers, decision_response, transport_metadata, AdmittedBody, DeniedBody,
    RATE_LIMIT_LIMIT, RATE_LIMIT_REMAINING, RATE_LIMIT_RESET,
};
pub use server::HttpServer;
pub use service::{router, OutcomeAck, OutcomeReport};
