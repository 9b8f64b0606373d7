//! Data model for the query-to-response pipeline.
//!
//! Types here are intentionally inert: they carry data and small derived
//! predicates (`should_cache`, `is_terminal`) but no stage logic. Stage
//! logic lives in `policyrag-rag`, `policyrag-llm`, and
//! `policyrag-orchestrator`.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A set of institution entity codes, e.g. `{A, B, C}`.
///
/// Using a `BTreeSet` keeps iteration order deterministic, which matters
/// for building stable cache keys from a filter.
pub type EntitySet = BTreeSet<String>;

/// The incoming request: free text plus an optional entity filter.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Query {
    pub text: String,
    #[serde(default)]
    pub entity_filter: EntitySet,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            entity_filter: EntitySet::new(),
        }
    }

    pub fn with_filter(mut self, filter: EntitySet) -> Self {
        self.entity_filter = filter;
        self
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Which expansion rule produced a given term, kept for audit/debugging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExpansionRule {
    Abbreviation,
    Compound,
    SingleTerm,
    ContextPad,
}

/// A term added to the query by an expansion rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandedTerm {
    pub term: String,
    pub rule: ExpansionRule,
}

/// The result of query expansion: original text, the canonicalized cache
/// key (derived only from the original text), the expanded retrieval
/// text, and which rules fired.
///
/// Invariant (P1): `words(expanded) <= max(6, 2 * words(original))`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandedQuery {
    pub original: String,
    pub canonical_key: String,
    pub expanded: String,
    pub fired_rules: Vec<ExpandedTerm>,
    pub truncated: bool,
}

impl ExpandedQuery {
    pub fn expanded_word_count(&self) -> usize {
        self.expanded.split_whitespace().count()
    }
}

/// A policy reference number that a topic-keyword rule requires to be
/// present in the final output.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ForcedReference {
    pub reference_number: String,
    /// First-seen order among forced references for this request; lower
    /// sorts first when references are otherwise tied on score.
    pub rank: usize,
    /// The short hint appended to the retrieval text for this match.
    pub hint: String,
}

/// One retrieved chunk before reranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub id: String,
    pub content: String,
    pub title: String,
    pub reference_number: String,
    pub section: String,
    pub source_file: String,
    pub page_number: Option<u32>,
    pub applies_to: EntitySet,
    pub score: f64,
}

impl SearchResult {
    /// Logical identity for deduplication: (reference number, section,
    /// page), not the chunk id.
    pub fn logical_key(&self) -> (String, String, Option<u32>) {
        (
            normalize_reference(&self.reference_number),
            self.section.clone(),
            self.page_number,
        )
    }
}

/// Strip leading zeros from a reference number so `"0486"` and `"486"`
/// compare equal.
pub fn normalize_reference(reference_number: &str) -> String {
    let trimmed = reference_number.trim_start_matches('0');
    if trimmed.is_empty() {
        "0".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A `SearchResult` plus a normalized relevance score and a pointer back
/// to its position in the pre-rerank candidate list. Never mutated in
/// place; adjustment stages produce new values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankResult {
    pub result: SearchResult,
    pub relevance_score: f64,
    pub original_index: usize,
}

/// A citation-ready view over an approved `RerankResult`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub snippet: String,
    pub title: String,
    pub reference_number: String,
    pub section: String,
    pub page_number: Option<u32>,
    pub applies_to: EntitySet,
    pub score: f64,
    pub match_type: String,
}

impl Evidence {
    pub fn verified(result: &RerankResult, snippet_len: usize) -> Self {
        let content = &result.result.content;
        let snippet = if content.chars().count() > snippet_len {
            content.chars().take(snippet_len).collect::<String>() + "..."
        } else {
            content.clone()
        };
        Self {
            snippet,
            title: result.result.title.clone(),
            reference_number: result.result.reference_number.clone(),
            section: result.result.section.clone(),
            page_number: result.result.page_number,
            applies_to: result.result.applies_to.clone(),
            score: result.relevance_score,
            match_type: "verified".to_string(),
        }
    }
}

/// A deduplicated source listing derived from evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub reference_number: String,
}

/// Confidence band attached to a delivered response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    ClarificationNeeded,
}

impl ConfidenceLevel {
    /// Map a numeric confidence score to a band: high >= 0.7, medium
    /// >= 0.5, else low.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            ConfidenceLevel::High
        } else if score >= 0.5 {
            ConfidenceLevel::Medium
        } else {
            ConfidenceLevel::Low
        }
    }
}

/// A clarification prompt with at least two disambiguating options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clarification {
    pub message: String,
    pub options: Vec<String>,
}

/// The final pipeline outcome.
///
/// Invariants enforced by construction helpers, not by the caller:
/// - `found = false` implies `evidence` and `sources` are empty.
/// - `confidence = ClarificationNeeded` implies `text` is the
///   clarification payload and no evidence is attached.
/// - any blocking safety flag implies `found = false` and empty
///   evidence/sources regardless of what retrieval produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub text: String,
    pub summary: String,
    pub evidence: Vec<Evidence>,
    pub sources: Vec<Source>,
    pub chunks_used: usize,
    pub found: bool,
    pub confidence: ConfidenceLevel,
    pub confidence_score: f64,
    pub needs_human_review: bool,
    pub safety_flags: Vec<String>,
    pub clarification: Option<Clarification>,
}

impl Response {
    /// A terminal "not found" response: no evidence, `found = false`.
    pub fn not_found(text: impl Into<String>, flag: &str) -> Self {
        Self {
            text: text.into(),
            summary: String::new(),
            evidence: Vec::new(),
            sources: Vec::new(),
            chunks_used: 0,
            found: false,
            confidence: ConfidenceLevel::Low,
            confidence_score: 0.0,
            needs_human_review: false,
            safety_flags: vec![flag.to_string()],
            clarification: None,
        }
    }

    /// A terminal clarification response.
    pub fn clarification(message: impl Into<String>, options: Vec<String>, flag: &str) -> Self {
        let message = message.into();
        Self {
            text: message.clone(),
            summary: String::new(),
            evidence: Vec::new(),
            sources: Vec::new(),
            chunks_used: 0,
            found: false,
            confidence: ConfidenceLevel::ClarificationNeeded,
            confidence_score: 0.0,
            needs_human_review: false,
            safety_flags: vec![flag.to_string()],
            clarification: Some(Clarification { message, options }),
        }
    }

    /// A terminal refusal response (adversarial / out-of-scope).
    pub fn refused(text: impl Into<String>, flag: &str) -> Self {
        Self::not_found(text, flag)
    }

    /// A blocked response produced by the Safety Gate: fixed fallback
    /// text, always flagged for human review.
    pub fn blocked(fallback_text: impl Into<String>, flags: Vec<String>) -> Self {
        Self {
            text: fallback_text.into(),
            summary: String::new(),
            evidence: Vec::new(),
            sources: Vec::new(),
            chunks_used: 0,
            found: false,
            confidence: ConfidenceLevel::Low,
            confidence_score: 0.0,
            needs_human_review: true,
            safety_flags: flags,
            clarification: None,
        }
    }

    /// A "service temporarily unavailable" response for permanent
    /// retrieval/generation failures. Never cached.
    pub fn unavailable(text: impl Into<String>) -> Self {
        Self::not_found(text, "SERVICE_UNAVAILABLE")
    }

    /// Eligible for the response cache only when fully delivered
    /// with non-empty evidence.
    pub fn should_cache(&self) -> bool {
        self.found && !self.evidence.is_empty() && self.confidence != ConfidenceLevel::ClarificationNeeded
    }
}

/// Outcome of the Quality Assessor.
#[derive(Debug, Clone)]
pub enum CorrectiveAction {
    /// Quality is sufficient; pass the set through unchanged.
    Proceed,
    /// Keep only the candidates at these indices into the input set.
    Filter(Vec<usize>),
    /// Issue additional secondary queries and union the results with the
    /// original candidate set.
    Retry(Vec<String>),
    /// Low aggregate quality, but not fatal: pass the original set
    /// (truncated to K) through to the reranker regardless. Blocking is
    /// the Safety Gate's job, not the assessor's.
    Refuse,
}

/// A single named event in a streamed response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Status { stage: String, message: String },
    AnswerChunk { text: String },
    Evidence { items: Vec<Evidence> },
    Sources { items: Vec<Source> },
    Metadata {
        confidence: ConfidenceLevel,
        confidence_score: f64,
        safety_flags: Vec<String>,
        needs_human_review: bool,
        chunks_used: usize,
    },
    Clarification { message: String, options: Vec<String> },
    Error { message: String },
    Done,
}

impl StreamEvent {
    /// Terminal events per P8: every successful stream yields exactly
    /// one of these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StreamEvent::Done | StreamEvent::Clarification { .. } | StreamEvent::Error { .. }
        )
    }
}

/// Per-stage timing and counts, used for audit only — never affects
/// response correctness.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageMetric {
    pub stage: String,
    pub duration: Duration,
    pub cache_hit: Option<bool>,
}

/// Which orchestration variant served a request, recorded in the audit
/// trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineVariant {
    FullRag,
    InstanceSearch,
    CacheHit,
    GatedTerminal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_normalization_strips_leading_zeros() {
        assert_eq!(normalize_reference("0486"), "486");
        assert_eq!(normalize_reference("486"), "486");
        assert_eq!(normalize_reference("000"), "0");
    }

    #[test]
    fn not_found_response_has_no_evidence() {
        let r = Response::not_found("could not find in policies", "OUT_OF_SCOPE");
        assert!(!r.found);
        assert!(r.evidence.is_empty());
        assert!(r.sources.is_empty());
        assert!(!r.should_cache());
    }

    #[test]
    fn clarification_response_is_not_cacheable() {
        let r = Response::clarification("which device?", vec!["A".into(), "B".into()], "AMBIGUOUS_TERM");
        assert_eq!(r.confidence, ConfidenceLevel::ClarificationNeeded);
        assert!(!r.should_cache());
    }

    #[test]
    fn confidence_band_thresholds() {
        assert_eq!(ConfidenceLevel::from_score(0.9), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.7), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::from_score(0.6), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::from_score(0.2), ConfidenceLevel::Low);
    }

    #[test]
    fn stream_terminal_events() {
        assert!(StreamEvent::Done.is_terminal());
        assert!(StreamEvent::Error { message: "x".into() }.is_terminal());
        assert!(!StreamEvent::Status { stage: "s".into(), message: "m".into() }.is_terminal());
    }
}
