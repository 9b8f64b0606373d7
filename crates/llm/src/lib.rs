//! Generator backend: zero-temperature completion against an
//! assembled context, with a fixed answer-only-from-context system
//! prompt and a max-token cap that scales with query breadth.
//!
//! Ingestion, tool calling, and multi-turn session state are out of
//! scope here — each call is a single stateless completion.

pub mod backend;
pub mod generator;

pub use backend::{FinishReason, GenerationResult, LlmBackend, OllamaBackend, OllamaConfig, OpenAIBackend, OpenAIConfig};
pub use generator::PromptGenerator;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("generation error: {0}")]
    Generation(String),

    #[error("api error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("request timed out")]
    Timeout,

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for policyrag_core::Error {
    fn from(err: LlmError) -> Self {
        policyrag_core::Error::Llm(err.to_string())
    }
}
