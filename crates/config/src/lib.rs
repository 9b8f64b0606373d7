//! Configuration management for the policy RAG chat core.
//!
//! Supports loading configuration from TOML files and environment
//! variables (`POLICY_RAG__` prefix). Two independent surfaces:
//!
//! - `settings`: the numeric/operational configuration surface named in
//!   the interface contract (cache sizes, thresholds, timeouts).
//! - `patterns`: the content tables (ambiguity map, adversarial
//!   patterns, hint rules, phrase catalogs) that drive gate and safety
//!   decisions. Kept config-driven and separate from `settings` since
//!   they change far more often and are reviewed by different people.

pub mod constants;
pub mod patterns;
pub mod settings;

pub use patterns::{AmbiguityEntry, HintRule, PatternTables, PatternTablesSource};
pub use settings::{
    load_settings, AuditConfig, AuthConfig, CacheConfig, GenerationConfig, PersistenceConfig,
    RankingConfig, RateLimitConfig, RerankConfig, RetrievalConfig, RuntimeEnvironment,
    SafetyConfig, ServerConfig, Settings,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    #[error("failed to parse configuration: {0}")]
    ParseError(String),

    #[error("missing required field: {0}")]
    MissingField(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

impl From<ConfigError> for policyrag_core::Error {
    fn from(err: ConfigError) -> Self {
        policyrag_core::Error::Configuration(err.to_string())
    }
}
