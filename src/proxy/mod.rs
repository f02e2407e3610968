//! Request dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → server.rs (axum handler, per-request pipeline)
//!         1. longest-prefix route match        → 404 on miss
//!         2. upstream lookup                   → 503 on miss
//!         3. protocol tag (headers.rs)
//!         4. policy resolution (override → rule default)
//!         5. live-backend snapshot
//!         6. balancer selection                → 503 when exhausted
//!         7. forwarded-header injection (headers.rs)
//!         8. account, proxy upstream, stream response back
//!     → 502 on transport failure (one retry for idempotent methods)
//! ```
//!
//! # Design Decisions
//! - The dispatch state (config, registry, routes) is one ArcSwap
//!   snapshot; a request holds its snapshot for its whole lifetime
//! - The connection guard rides inside the response body, so the gauge
//!   decrements only when the response has fully streamed (or failed)
//! - Request bodies are buffered up to a fixed cap so an idempotent
//!   retry can resend them

pub mod headers;
pub mod server;

pub use server::{AppState, DispatchState, ProxyServer};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Everything the dispatch pipeline can refuse a request with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("Not Found")]
    RoutingMiss,

    #[error("Service Unavailable")]
    UpstreamUnknown,

    #[error("Service Unavailable")]
    NoLiveBackends,

    #[error("Service Unavailable (All backends at connection limit)")]
    AllBackendsAtLimit,

    #[error("Payload Too Large")]
    BodyTooLarge,

    #[error("Bad Gateway")]
    UpstreamTransport,
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::RoutingMiss => StatusCode::NOT_FOUND,
            Self::UpstreamUnknown | Self::NoLiveBackends | Self::AllBackendsAtLimit => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            Self::BodyTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UpstreamTransport => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
