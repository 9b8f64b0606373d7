//! Response Formatter: given an approved answer and its
//! evidence, produces the display response, a short summary, a
//! deduplicated source list, and the evidence cap appropriate to the
//! query's breadth.

use std::collections::HashSet;

use policyrag_config::constants::formatter as formatter_constants;
use policyrag_core::{Response, Source};

pub struct ResponseFormatter;

impl ResponseFormatter {
    pub fn format(&self, mut response: Response, is_multi_policy: bool) -> Response {
        if !response.found || response.clarification.is_some() {
            return response;
        }

        let limit = if is_multi_policy {
            formatter_constants::MULTI_POLICY_EVIDENCE_LIMIT
        } else {
            formatter_constants::SINGLE_INTENT_EVIDENCE_LIMIT
        };
        response.evidence.truncate(limit);

        let mut seen = HashSet::new();
        response.sources = response
            .evidence
            .iter()
            .filter(|e| seen.insert((e.title.clone(), e.reference_number.clone())))
            .map(|e| Source { title: e.title.clone(), reference_number: e.reference_number.clone() })
            .collect();

        response.summary = Self::summarize(&response.text);
        response.chunks_used = response.evidence.len();

        let citation_block = response
            .sources
            .iter()
            .map(|s| format!("- {} (Reference {})", s.title, s.reference_number))
            .collect::<Vec<_>>()
            .join("\n");
        if !citation_block.is_empty() {
            response.text = format!("{}\n\nSources:\n{}", response.text, citation_block);
        }

        response
    }

    fn summarize(text: &str) -> String {
        let first_sentence_end = text.find(['.', '!', '?']).map(|i| i + 1).unwrap_or(text.len());
        text[..first_sentence_end].trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use policyrag_core::{ConfidenceLevel, EntitySet, Evidence};

    fn approved_response(evidence_count: usize) -> Response {
        let evidence = (0..evidence_count)
            .map(|i| Evidence {
                snippet: format!("snippet {}", i),
                title: format!("Policy {}", i),
                reference_number: i.to_string(),
                section: "1".into(),
                page_number: None,
                applies_to: EntitySet::new(),
                score: 0.9,
                match_type: "verified".into(),
            })
            .collect();
        Response {
            text: "Hand hygiene must be performed before and after patient contact.".into(),
            summary: String::new(),
            evidence,
            sources: Vec::new(),
            chunks_used: 0,
            found: true,
            confidence: ConfidenceLevel::High,
            confidence_score: 0.9,
            needs_human_review: false,
            safety_flags: Vec::new(),
            clarification: None,
        }
    }

    #[test]
    fn multi_policy_caps_evidence_at_ten() {
        let formatter = ResponseFormatter;
        let response = formatter.format(approved_response(15), true);
        assert_eq!(response.evidence.len(), 10);
    }

    #[test]
    fn single_intent_caps_evidence_at_five() {
        let formatter = ResponseFormatter;
        let response = formatter.format(approved_response(15), false);
        assert_eq!(response.evidence.len(), 5);
    }

    #[test]
    fn summary_is_first_sentence() {
        let formatter = ResponseFormatter;
        let response = formatter.format(approved_response(1), false);
        assert_eq!(response.summary, "Hand hygiene must be performed before and after patient contact.");
    }

    #[test]
    fn clarification_response_passes_through_unchanged() {
        let formatter = ResponseFormatter;
        let response = Response::clarification("which one?", vec!["A".into(), "B".into()], "AMBIGUOUS_TERM");
        let formatted = formatter.format(response.clone(), false);
        assert_eq!(formatted.text, response.text);
    }
}
