//! Citation & Safety Gate: a ten-step ordered pipeline over the
//! generator's raw answer text. Any blocking step short-circuits with a
//! fixed fallback `Response` and the relevant flags; non-blocking flags
//! accumulate and influence `needs_human_review`.

use std::collections::HashSet;

use regex::Regex;

use policyrag_config::{constants::safety as safety_constants, PatternTables};
use policyrag_core::{ConfidenceLevel, Evidence, RerankResult, Response, Source};

const FALLBACK_TEXT: &str =
    "I'm not able to confidently answer that from our policies. Please consult the policy \
binder on the intranet or contact the policy office directly.";

/// Advisory second-pass grounding signal. Produced by an
/// optional `GroundingCritic`; absent when no critic is configured.
#[derive(Debug, Clone, Copy)]
pub struct CritiqueSignal {
    pub is_grounded: bool,
    pub confidence: f64,
}

pub struct SafetyGate<'a> {
    tables: &'a PatternTables,
    reference_pattern: Regex,
    numeric_pattern: Regex,
    phone_pattern: Regex,
}

impl<'a> SafetyGate<'a> {
    pub fn new(tables: &'a PatternTables) -> Self {
        Self {
            tables,
            reference_pattern: Regex::new(r"(?i)(?:reference|ref\.?|policy)\s*#?\s*(\d{2,6})").unwrap(),
            numeric_pattern: Regex::new(
                r"(?i)\b\d+(?:\.\d+)?\s*(?:mg|ml|mcg|g|units?|%|percent|minutes?|mins?|hours?|hrs?|days?|seconds?|secs?)\b",
            )
            .unwrap(),
            phone_pattern: Regex::new(r"\b\d{3}[-.]\d{3}[-.]\d{4}\b").unwrap(),
        }
    }

    /// Validates a generated answer against the candidate set it was
    /// grounded on, producing the final delivered or blocked `Response`.
    pub fn validate(
        &self,
        answer_text: &str,
        candidates: &[RerankResult],
        query_text: &str,
        is_multi_policy: bool,
        critique: Option<CritiqueSignal>,
    ) -> Response {
        let lower_answer = answer_text.to_lowercase();

        // Step 1: strip citations from an answer that reads as negative,
        // so the formatter cannot attach contradictory evidence to it.
        let signals_not_found = self.tables.not_found_phrases.iter().any(|p| lower_answer.contains(p.as_str()));
        let signals_refusal = self.tables.refusal_phrases.iter().any(|p| lower_answer.contains(p.as_str()));
        let cited_refs = if signals_not_found || signals_refusal {
            HashSet::new()
        } else {
            self.extract_cited_references(answer_text)
        };

        // Step 2: not-found override.
        if signals_not_found && candidates.is_empty() {
            return Response::not_found(answer_text, "LLM_NOT_FOUND");
        }

        // Step 3: refusal detection forces found=false regardless of retrieval.
        if signals_refusal {
            return Response::refused(answer_text, "LLM_REFUSAL");
        }

        // Step 4: confidence score from reranker top scores + evidence presence.
        let top_score = candidates.first().map(|c| c.relevance_score).unwrap_or(0.0);
        let has_evidence = !candidates.is_empty();
        let mut confidence_score = top_score;
        if has_evidence && cited_refs.len() >= 1 {
            confidence_score = (confidence_score + 0.05).min(1.0);
        }
        let confidence = ConfidenceLevel::from_score(confidence_score);

        // Step 5: citation verification — fabricated refs + hallucination risk.
        let retrieved_refs: HashSet<String> =
            candidates.iter().map(|c| policyrag_core::normalize_reference(&c.result.reference_number)).collect();
        let normalized_cited: HashSet<String> = cited_refs.iter().map(|r| policyrag_core::normalize_reference(r)).collect();
        let fabricated: Vec<&String> = normalized_cited.iter().filter(|r| !retrieved_refs.contains(*r)).collect();
        let citation_inaccuracy = if normalized_cited.is_empty() {
            0.0
        } else {
            fabricated.len() as f64 / normalized_cited.len() as f64
        };

        let speculation_phrases = ["probably", "i think", "likely", "might be", "i believe"];
        let speculation_count = speculation_phrases.iter().filter(|p| lower_answer.contains(**p)).count();
        let speculation_score = (speculation_count as f64 / 3.0).min(1.0);

        let ungrounded_absolutes = ["always", "never"];
        let combined_context: String =
            candidates.iter().map(|c| c.result.content.to_lowercase()).collect::<Vec<_>>().join(" ");
        let ungrounded_claim_count = ungrounded_absolutes
            .iter()
            .filter(|w| lower_answer.contains(**w) && !combined_context.contains(**w))
            .count();
        let ungrounded_score = (ungrounded_claim_count as f64 / 2.0).min(1.0);

        let hallucination_risk = citation_inaccuracy * safety_constants::HALLUCINATION_CITATION_WEIGHT
            + speculation_score * safety_constants::HALLUCINATION_SPECULATION_WEIGHT
            + ungrounded_score * safety_constants::HALLUCINATION_UNGROUNDED_WEIGHT;

        // Step 6: exact-match fact verification.
        let unverified_count = self.count_unverified_facts(answer_text, candidates, is_multi_policy);
        let allowance = if is_multi_policy { safety_constants::MULTI_POLICY_UNVERIFIED_ALLOWANCE } else { 0 };
        let mut flags: Vec<String> = Vec::new();
        if unverified_count > allowance {
            return Response::blocked(FALLBACK_TEXT, vec!["BLOCKED_UNVERIFIED_FACTS".to_string()]);
        } else if unverified_count > 0 {
            flags.push("UNVERIFIED_FACTS_PRESENT".to_string());
        }

        // Step 7: any cited ref not in retrieval blocks outright.
        if !fabricated.is_empty() {
            return Response::blocked(FALLBACK_TEXT, vec!["BLOCKED_FABRICATED_REFS".to_string()]);
        }

        // Step 8: composite safety validator.
        let missing_citation = has_evidence && cited_refs.is_empty();
        if missing_citation {
            flags.push("MISSING_CITATION".to_string());
        }
        let medication_tokens_ungrounded = self.numeric_pattern.find_iter(answer_text).any(|m| {
            let token = m.as_str().to_lowercase();
            !combined_context.contains(&token)
        });
        if medication_tokens_ungrounded {
            flags.push("UNGROUNDED_NUMERIC_CLAIM".to_string());
        }
        if speculation_count > 0 {
            flags.push("SPECULATIVE_HEDGING".to_string());
        }
        if confidence == ConfidenceLevel::Low {
            flags.push("LOW_CONFIDENCE".to_string());
        }
        if ungrounded_claim_count > 0 {
            flags.push("UNGROUNDED_ABSOLUTE_CLAIM".to_string());
        }
        let is_unsafe = medication_tokens_ungrounded && confidence == ConfidenceLevel::Low;
        if is_unsafe {
            return Response::blocked(FALLBACK_TEXT, vec!["BLOCKED_BY_SAFETY_CHECK".to_string()]);
        }

        // Step 9: hallucination-risk block.
        if hallucination_risk > safety_constants::HALLUCINATION_BLOCK_THRESHOLD {
            return Response::blocked(FALLBACK_TEXT, vec!["BLOCKED_HALLUCINATION_RISK".to_string()]);
        }

        // Step 10: advisory self-reflective critique.
        let mut needs_human_review = !flags.is_empty()
            || confidence == ConfidenceLevel::Low
            || hallucination_risk > safety_constants::HUMAN_REVIEW_RISK_THRESHOLD;
        if let Some(signal) = critique {
            if !signal.is_grounded || signal.confidence < 0.5 {
                needs_human_review = true;
            }
        }

        let evidence: Vec<Evidence> = candidates
            .iter()
            .filter(|c| normalized_cited.is_empty() || normalized_cited.contains(&policyrag_core::normalize_reference(&c.result.reference_number)))
            .map(|c| Evidence::verified(c, 400))
            .collect();
        let evidence = if evidence.is_empty() && !candidates.is_empty() {
            candidates.iter().map(|c| Evidence::verified(c, 400)).collect()
        } else {
            evidence
        };

        let mut seen = HashSet::new();
        let sources: Vec<Source> = evidence
            .iter()
            .filter(|e| seen.insert((e.title.clone(), e.reference_number.clone())))
            .map(|e| Source { title: e.title.clone(), reference_number: e.reference_number.clone() })
            .collect();

        let _ = query_text;
        Response {
            text: answer_text.to_string(),
            summary: String::new(),
            chunks_used: evidence.len(),
            found: true,
            confidence,
            confidence_score,
            needs_human_review,
            safety_flags: flags,
            clarification: None,
            sources,
            evidence,
        }
    }

    fn extract_cited_references(&self, text: &str) -> HashSet<String> {
        self.reference_pattern
            .captures_iter(text)
            .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
            .collect()
    }

    /// Every numeric/dosage/time/percentage/phone token in the answer
    /// must appear verbatim (case-insensitive, whitespace-normalized) in
    /// the combined context; for multi-policy queries a single chunk's
    /// context is also accepted.
    fn count_unverified_facts(&self, answer_text: &str, candidates: &[RerankResult], is_multi_policy: bool) -> usize {
        let normalize = |s: &str| s.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ");
        let combined = normalize(&candidates.iter().map(|c| c.result.content.as_str()).collect::<Vec<_>>().join(" "));

        let tokens: Vec<String> = self
            .numeric_pattern
            .find_iter(answer_text)
            .map(|m| normalize(m.as_str()))
            .chain(self.phone_pattern.find_iter(answer_text).map(|m| normalize(m.as_str())))
            .collect();

        tokens
            .iter()
            .filter(|token| {
                let in_combined = combined.contains(token.as_str());
                let in_any_chunk = is_multi_policy && candidates.iter().any(|c| normalize(&c.result.content).contains(token.as_str()));
                !in_combined && !in_any_chunk
            })
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policyrag_core::{EntitySet, SearchResult};

    fn candidate(reference_number: &str, content: &str, score: f64) -> RerankResult {
        RerankResult {
            result: SearchResult {
                id: "c1".into(),
                content: content.into(),
                title: "Hand Hygiene Policy".into(),
                reference_number: reference_number.into(),
                section: "2".into(),
                source_file: "hh.pdf".into(),
                page_number: Some(3),
                applies_to: EntitySet::new(),
                score,
            },
            relevance_score: score,
            original_index: 0,
        }
    }

    #[test]
    fn grounded_answer_with_valid_citation_is_delivered() {
        let tables = PatternTables::default_tables();
        let gate = SafetyGate::new(&tables);
        let candidates = vec![candidate("214", "Hand hygiene must be performed for 30 seconds.", 0.9)];
        let response = gate.validate(
            "Per reference 214, hand hygiene must be performed for 30 seconds.",
            &candidates,
            "hand hygiene",
            false,
            None,
        );
        assert!(response.found);
        assert!(response.safety_flags.iter().all(|f| !f.starts_with("BLOCKED")));
    }

    #[test]
    fn fabricated_reference_is_blocked() {
        let tables = PatternTables::default_tables();
        let gate = SafetyGate::new(&tables);
        let candidates = vec![candidate("214", "Hand hygiene must be performed.", 0.9)];
        let response = gate.validate("Per reference 999, hand hygiene is optional.", &candidates, "hand hygiene", false, None);
        assert!(!response.found);
        assert_eq!(response.safety_flags, vec!["BLOCKED_FABRICATED_REFS".to_string()]);
    }

    #[test]
    fn not_found_phrase_with_no_evidence_yields_not_found() {
        let tables = PatternTables::default_tables();
        let gate = SafetyGate::new(&tables);
        let response = gate.validate("I could not find that in our policies.", &[], "unrelated question", false, None);
        assert!(!response.found);
        assert_eq!(response.safety_flags, vec!["LLM_NOT_FOUND".to_string()]);
    }

    #[test]
    fn refusal_phrase_forces_not_found_even_with_evidence() {
        let tables = PatternTables::default_tables();
        let gate = SafetyGate::new(&tables);
        let candidates = vec![candidate("214", "Hand hygiene content.", 0.9)];
        let response = gate.validate("I can only answer questions about hospital policies.", &candidates, "weather", false, None);
        assert!(!response.found);
        assert_eq!(response.safety_flags, vec!["LLM_REFUSAL".to_string()]);
        assert!(response.evidence.is_empty());
    }

    #[test]
    fn unverified_numeric_claim_blocks_single_policy_query() {
        let tables = PatternTables::default_tables();
        let gate = SafetyGate::new(&tables);
        let candidates = vec![candidate("214", "Hand hygiene must be performed before contact.", 0.9)];
        let response = gate.validate("Per reference 214, wait 45 minutes between applications.", &candidates, "hand hygiene", false, None);
        assert!(!response.found);
        assert_eq!(response.safety_flags, vec!["BLOCKED_UNVERIFIED_FACTS".to_string()]);
    }
}
