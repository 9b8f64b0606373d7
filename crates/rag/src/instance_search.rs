//! Instance Search Handler: "find X in policy Y" queries bypass
//! the main RAG pipeline entirely — no expansion, caching, reranking, or
//! generation. The policy identifier is resolved via the index, then the
//! search term is matched (exact, case-insensitive) against that one
//! policy's content.

use std::sync::Arc;

use policyrag_config::PatternTables;
use policyrag_core::traits::{IndexFilter, PolicyIndex};
use policyrag_core::{ConfidenceLevel, Evidence, EntitySet, Response, Result, Source};

pub struct InstanceSearchHandler<'a> {
    index: Arc<dyn PolicyIndex>,
    tables: &'a PatternTables,
}

impl<'a> InstanceSearchHandler<'a> {
    pub fn new(index: Arc<dyn PolicyIndex>, tables: &'a PatternTables) -> Self {
        Self { index, tables }
    }

    /// Returns `Some((search_term, policy_identifier))` when the query
    /// matches the "find X in policy Y" intent.
    pub fn matches(&self, query_text: &str) -> Option<(String, String)> {
        let caps = self.tables.instance_search_pattern.captures(query_text)?;
        Some((caps.get(1)?.as_str().to_string(), caps.get(2)?.as_str().to_string()))
    }

    pub async fn handle(&self, search_term: &str, policy_identifier: &str) -> Result<Response> {
        let resolved = self.resolve_policy(policy_identifier).await?;
        let Some(reference_number) = resolved else {
            return Ok(Response::not_found(
                "could not find that policy",
                "INSTANCE_SEARCH_POLICY_NOT_FOUND",
            ));
        };

        let filter = IndexFilter::from_entities(&EntitySet::new());
        let results = self
            .index
            .search(policy_identifier, 50, &filter, false)
            .await?;

        let located: Vec<_> = results
            .into_iter()
            .filter(|r| r.reference_number == reference_number)
            .filter(|r| r.content.to_lowercase().contains(&search_term.to_lowercase()))
            .collect();

        if located.is_empty() {
            return Ok(Response::not_found(
                format!("could not find \"{}\" in that policy", search_term),
                "INSTANCE_SEARCH_TERM_NOT_FOUND",
            ));
        }

        let evidence: Vec<Evidence> = located
            .iter()
            .map(|r| Evidence {
                snippet: highlight(&r.content, search_term),
                title: r.title.clone(),
                reference_number: r.reference_number.clone(),
                section: r.section.clone(),
                page_number: r.page_number,
                applies_to: r.applies_to.clone(),
                score: 1.0,
                match_type: "located".to_string(),
            })
            .collect();

        let sources: Vec<Source> = {
            let mut seen = std::collections::HashSet::new();
            evidence
                .iter()
                .filter(|e| seen.insert((e.title.clone(), e.reference_number.clone())))
                .map(|e| Source {
                    title: e.title.clone(),
                    reference_number: e.reference_number.clone(),
                })
                .collect()
        };

        Ok(Response {
            text: format!(
                "Found {} mention(s) of \"{}\" in {}.",
                evidence.len(),
                search_term,
                located[0].title
            ),
            summary: format!("{} match(es) found", evidence.len()),
            chunks_used: evidence.len(),
            found: true,
            confidence: ConfidenceLevel::High,
            confidence_score: 1.0,
            needs_human_review: false,
            safety_flags: Vec::new(),
            clarification: None,
            sources,
            evidence,
        })
    }

    async fn resolve_policy(&self, identifier: &str) -> Result<Option<String>> {
        // A bare reference number resolves to itself.
        if identifier.chars().all(|c| c.is_ascii_digit()) {
            return Ok(Some(identifier.to_string()));
        }
        let metadata = self.index.metadata_by_source_file(identifier).await?;
        Ok(metadata.map(|m| m.reference_number))
    }
}

/// The largest byte index `<= idx` that lands on a UTF-8 char boundary.
fn floor_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

/// The smallest byte index `>= idx` that lands on a UTF-8 char boundary.
fn ceil_char_boundary(s: &str, mut idx: usize) -> usize {
    idx = idx.min(s.len());
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

fn highlight(content: &str, term: &str) -> String {
    let lower = content.to_lowercase();
    let term_lower = term.to_lowercase();
    if let Some(pos) = lower.find(&term_lower) {
        let start = floor_char_boundary(content, pos.saturating_sub(60));
        let end = ceil_char_boundary(content, pos + term_lower.len() + 60);
        format!("...{}...", &content[start..end])
    } else {
        content.chars().take(120).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use policyrag_core::traits::SourceMetadata;
    use policyrag_core::SearchResult;

    struct StubIndex;

    #[async_trait]
    impl PolicyIndex for StubIndex {
        async fn search(
            &self,
            _query: &str,
            _top_k: usize,
            _filter: &IndexFilter,
            _use_semantic: bool,
        ) -> Result<Vec<SearchResult>> {
            Ok(vec![SearchResult {
                id: "c1".into(),
                content: "Hand hygiene must be performed before and after patient contact.".into(),
                title: "Hand Hygiene Policy".into(),
                reference_number: "214".into(),
                section: "2".into(),
                source_file: "hh.pdf".into(),
                page_number: Some(3),
                applies_to: EntitySet::new(),
                score: 1.0,
            }])
        }

        async fn metadata_by_source_file(&self, _source_file: &str) -> Result<Option<SourceMetadata>> {
            Ok(None)
        }
    }

    #[test]
    fn matches_find_in_policy_intent() {
        let tables = PatternTables::default_tables();
        let handler = InstanceSearchHandler::new(Arc::new(StubIndex), &tables);
        let matched = handler.matches("find hand hygiene in policy 214").unwrap();
        assert_eq!(matched.0, "hand hygiene");
        assert_eq!(matched.1, "214");
    }

    #[tokio::test]
    async fn handle_returns_located_evidence() {
        let tables = PatternTables::default_tables();
        let handler = InstanceSearchHandler::new(Arc::new(StubIndex), &tables);
        let response = handler.handle("hand hygiene", "214").await.unwrap();
        assert!(response.found);
        assert_eq!(response.evidence.len(), 1);
        assert_eq!(response.evidence[0].match_type, "located");
    }

    #[tokio::test]
    async fn handle_returns_not_found_when_term_absent() {
        let tables = PatternTables::default_tables();
        let handler = InstanceSearchHandler::new(Arc::new(StubIndex), &tables);
        let response = handler.handle("nonexistent term", "214").await.unwrap();
        assert!(!response.found);
        assert!(response.evidence.is_empty());
    }

    #[test]
    fn highlight_does_not_panic_on_multibyte_content_near_window_edge() {
        let filler = "é".repeat(60);
        let content = format!("{filler}hand hygiene{filler}");
        let snippet = highlight(&content, "hand hygiene");
        assert!(snippet.contains("hand hygiene"));
    }
}
