//! Policy RAG Server
//!
//! HTTP API wiring for the policy RAG chat core: chat, streaming chat,
//! cache admin, audit admin, and health/readiness/metrics endpoints.

pub mod auth;
pub mod http;
pub mod metrics;
pub mod rate_limit;
pub mod state;

pub use auth::auth_middleware;
pub use http::create_router;
pub use metrics::{init_metrics, record_cache_hit, record_error, record_pipeline_latency, record_request, record_total_latency};
pub use rate_limit::{RateLimitError, RateLimiter};
pub use state::AppState;

use thiserror::Error;

/// Server errors.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("authentication error: {0}")]
    Auth(String),

    #[error("rate limit exceeded")]
    RateLimit,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl From<ServerError> for axum::http::StatusCode {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Auth(_) => axum::http::StatusCode::UNAUTHORIZED,
            ServerError::RateLimit => axum::http::StatusCode::TOO_MANY_REQUESTS,
            ServerError::InvalidRequest(_) => axum::http::StatusCode::BAD_REQUEST,
            ServerError::Internal(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Persistence(_) => axum::http::StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
