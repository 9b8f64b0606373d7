//! Centralized constants: generic operational defaults only.
//!
//! Domain content (ambiguity maps, adversarial patterns, hint tables,
//! phrase catalogs) is NOT here — it lives in `patterns` and is
//! config-driven so it can be externalized without a recompile. This
//! module only holds the numeric/timing defaults named in the
//! configuration surface.

/// Retrieval defaults.
pub mod retrieval {
    pub const DEFAULT_TOP_K: usize = 100;
    pub const DEFAULT_FILTER_ENABLED: bool = true;
    pub const TIMEOUT_SECS: u64 = 30;
}

/// Reranker defaults.
pub mod rerank {
    pub const DEFAULT_TOP_N: usize = 7;
    pub const SHORT_QUERY_TOP_N: usize = 5;
    pub const MULTI_POLICY_TOP_N: usize = 10;
    pub const SHORT_QUERY_WORD_LIMIT: usize = 3;
    pub const DEFAULT_MIN_SCORE: f64 = 0.35;
    pub const RETRY_MIN_SCORE: f64 = 0.0;
    pub const TIMEOUT_SECS: u64 = 30;
}

/// Ranking adjustment defaults.
pub mod ranking {
    pub const FORCED_BOOST_MULTIPLIER: f64 = 1.5;
    pub const FORCED_SCORE_FLOOR: f64 = 0.5;
    pub const FORCED_RECOVERY_FLOOR: f64 = 0.35;
    pub const SURGE_PENALTY: f64 = 0.2;
    pub const PEDIATRIC_BOOST: f64 = 1.3;
    pub const ADULT_BOOST: f64 = 1.2;
    pub const LOCATION_BOOST: f64 = 1.25;
    pub const MMR_LAMBDA: f64 = 0.6;
    pub const MMR_MAX_RESULTS: usize = 10;
    pub const SCORE_WINDOW: f64 = 0.6;
    pub const SCORE_WINDOW_MIN_COUNT: usize = 3;
}

/// Safety and citation verification defaults.
pub mod safety {
    /// Hallucination scores at or above this block the response outright.
    pub const HALLUCINATION_BLOCK_THRESHOLD: f64 = 0.5;
    /// Risk scores at or above this route to human review instead of blocking.
    pub const HUMAN_REVIEW_RISK_THRESHOLD: f64 = 0.3;
    pub const FACT_VERIFICATION_STRICT: bool = true;
    pub const MULTI_POLICY_UNVERIFIED_ALLOWANCE: usize = 2;
    pub const HALLUCINATION_CITATION_WEIGHT: f64 = 0.4;
    pub const HALLUCINATION_SPECULATION_WEIGHT: f64 = 0.2;
    pub const HALLUCINATION_UNGROUNDED_WEIGHT: f64 = 0.4;
}

/// Generation defaults.
pub mod generation {
    pub const TEMPERATURE: f32 = 0.0;
    pub const MAX_TOKENS_SINGLE: usize = 500;
    pub const MAX_TOKENS_MULTI: usize = 800;
    pub const TIMEOUT_SECS_MIN: u64 = 45;
    pub const TIMEOUT_SECS_MAX: u64 = 60;
    pub const MAX_RETRIES: u32 = 3;
}

/// Query expansion defaults.
pub mod expansion {
    pub const MIN_EXPANDED_WORDS: usize = 6;
    pub const MAX_EXPANSION_RATIO: usize = 2;
    pub const SHORT_QUERY_WORD_LIMIT: usize = 2;
}

/// Formatter defaults.
pub mod formatter {
    pub const MULTI_POLICY_EVIDENCE_LIMIT: usize = 10;
    pub const SINGLE_INTENT_EVIDENCE_LIMIT: usize = 5;
    pub const EVIDENCE_SNIPPET_CHARS: usize = 400;
}

/// Cache defaults.
pub mod cache {
    pub const EXPANSION_SIZE: usize = 2_000;
    pub const RESPONSE_SIZE: usize = 1_000;
    pub const SEARCH_SIZE: usize = 1_000;
    pub const RESPONSE_TTL_SECS: u64 = 3_600;
    pub const SEARCH_TTL_SECS: u64 = 900;
}

/// Audit defaults.
pub mod audit {
    pub const BUFFER_SIZE: usize = 256;
    pub const FLUSH_INTERVAL_SECS: u64 = 5;
    pub const MAX_QUESTION_LENGTH: usize = 500;
    pub const MAX_RESPONSE_LENGTH: usize = 2_000;
}

/// Service endpoints, env-overridable (no business meaning, pure infra).
pub mod endpoints {
    use once_cell::sync::Lazy;

    pub static POLICY_INDEX_URL: Lazy<String> =
        Lazy::new(|| std::env::var("POLICY_INDEX_URL").unwrap_or_else(|_| "http://127.0.0.1:6333".to_string()));

    pub static RERANKER_URL: Lazy<String> =
        Lazy::new(|| std::env::var("RERANKER_URL").unwrap_or_else(|_| "http://127.0.0.1:8088".to_string()));

    pub static GENERATOR_URL: Lazy<String> =
        Lazy::new(|| std::env::var("GENERATOR_URL").unwrap_or_else(|_| "http://localhost:11434".to_string()));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_are_valid_probabilities() {
        assert!((0.0..=1.0).contains(&rerank::DEFAULT_MIN_SCORE));
        assert!((0.0..=1.0).contains(&safety::HALLUCINATION_BLOCK_THRESHOLD));
        assert!(safety::HUMAN_REVIEW_RISK_THRESHOLD < safety::HALLUCINATION_BLOCK_THRESHOLD);
    }

    #[test]
    fn multi_policy_token_cap_exceeds_single() {
        assert!(generation::MAX_TOKENS_MULTI > generation::MAX_TOKENS_SINGLE);
    }
}
