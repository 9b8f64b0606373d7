//! Central error type shared across the pipeline crates.
//!
//! Each crate defines its own `thiserror` enum for the errors it can
//! produce locally, then bridges into this type with a `From` impl so
//! callers that only care about pipeline-level outcomes do not need to
//! match on every crate's error type.

use thiserror::Error;

/// Pipeline-wide error type.
///
/// This is not the mechanism used to represent "not found", "blocked", or
/// "clarification needed" — those are valid `Response` outcomes, not
/// errors (see [Response](crate::types::Response)). `Error` is reserved
/// for failures that prevent a stage from producing any outcome at all:
/// a collaborator is unreachable, a config table failed to load, a
/// cancellation fired.
#[derive(Error, Debug)]
pub enum Error {
    #[error("policy index error: {0}")]
    Index(String),

    #[error("reranker error: {0}")]
    Rerank(String),

    #[error("generator error: {0}")]
    Llm(String),

    #[error("grounding critique error: {0}")]
    Critique(String),

    #[error("audit sink error: {0}")]
    Audit(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

impl Error {
    /// Whether this error represents a transient condition worth retrying
    /// under the bounded backoff policy, as opposed to a permanent one
    /// that should surface directly as an "unavailable" response.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Index(msg) | Error::Rerank(msg) | Error::Llm(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("timeout")
                    || lower.contains("timed out")
                    || lower.contains("rate limit")
                    || lower.contains("rate-limit")
                    || lower.contains("connection")
                    || lower.contains("temporarily unavailable")
            }
            Error::Timeout(_) => true,
            Error::Cancelled
            | Error::Critique(_)
            | Error::Audit(_)
            | Error::Cache(_)
            | Error::Configuration(_) => false,
        }
    }
}

/// Convenience alias used throughout the pipeline crates.
pub type Result<T> = std::result::Result<T, Error>;
