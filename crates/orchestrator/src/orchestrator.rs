//! Orchestrator: the state machine wiring every pipeline stage
//! together. There is no global singleton — the orchestrator owns
//! explicit handles to every collaborator and is constructed once per
//! deployment (or once per test).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use policyrag_config::constants::{generation as generation_constants, rerank as rerank_constants, retrieval as retrieval_constants};
use policyrag_config::PatternTables;
use policyrag_core::traits::{AuditCitation, AuditRecord, AuditSink, GroundingCritic, IndexFilter, PolicyIndex};
use policyrag_core::{traits::Generator, traits::RerankDocument, traits::Reranker};
use policyrag_core::{CorrectiveAction, Query, Response};
use policyrag_llm::generator as llm_generator;
use policyrag_rag::{hash_key, InstanceSearchHandler, PolicyCache, PolicyHintInjector, QualityAssessor, QueryExpander, RankingAdjuster, RankingAdjusterConfig, RetrievalStage};

use crate::formatter::ResponseFormatter;
use crate::gate::RequestGate;
use crate::safety::{CritiqueSignal, SafetyGate};
use crate::streaming::StreamingAdapter;

pub struct Orchestrator {
    pub tables: PatternTables,
    pub index: Arc<dyn PolicyIndex>,
    pub reranker: Arc<dyn Reranker>,
    pub generator: Arc<dyn Generator>,
    pub critic: Option<Arc<dyn GroundingCritic>>,
    pub audit: Option<Arc<dyn AuditSink>>,
    pub cache: Arc<PolicyCache>,
    pub top_k: usize,
}

impl Orchestrator {
    pub fn new(index: Arc<dyn PolicyIndex>, reranker: Arc<dyn Reranker>, generator: Arc<dyn Generator>) -> Self {
        Self {
            tables: PatternTables::default_tables(),
            index,
            reranker,
            generator,
            critic: None,
            audit: None,
            cache: Arc::new(PolicyCache::new(
                policyrag_config::constants::cache::EXPANSION_SIZE,
                policyrag_config::constants::cache::RESPONSE_SIZE,
                policyrag_config::constants::cache::SEARCH_SIZE,
                std::time::Duration::from_secs(policyrag_config::constants::cache::RESPONSE_TTL_SECS),
                std::time::Duration::from_secs(policyrag_config::constants::cache::SEARCH_TTL_SECS),
            )),
            top_k: retrieval_constants::DEFAULT_TOP_K,
        }
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn with_critic(mut self, critic: Arc<dyn GroundingCritic>) -> Self {
        self.critic = Some(critic);
        self
    }

    /// Drives one request through the full state machine and returns the
    /// terminal `Response`. Streaming callers additionally pass the
    /// result through `StreamingAdapter::emit`.
    pub async fn handle(&self, query: Query) -> Response {
        let start = Instant::now();

        // Received -> Gated.
        let gate = RequestGate::new(&self.tables);
        if let Some(response) = gate.check(&query.text) {
            self.audit_if_configured(&query, &response, start, "gated_terminal", "").await;
            return response;
        }

        // Instance search bypasses the main pipeline entirely.
        let instance_handler = InstanceSearchHandler::new(self.index.clone(), &self.tables);
        if let Some((search_term, policy_identifier)) = instance_handler.matches(&query.text) {
            let response = match instance_handler.handle(&search_term, &policy_identifier).await {
                Ok(response) => response,
                Err(_) => Response::unavailable("The policy index is temporarily unavailable."),
            };
            self.audit_if_configured(&query, &response, start, "instance_search", "").await;
            return response;
        }

        // Gated -> Cached?
        let canonical_key = QueryExpander::canonical_key(&query.text);
        let filter_key: Vec<&str> = query.entity_filter.iter().map(|s| s.as_str()).collect();
        let response_key = hash_key(&[&canonical_key, &filter_key.join(",")]);
        if let Some(cached) = self.cache.get_response(&response_key) {
            return cached;
        }

        // Cached? -> Expanded.
        let expander = QueryExpander::new(&self.tables);
        let expanded = expander.expand(&query.text);

        let injector = PolicyHintInjector::new(&self.tables);
        let hints = injector.inject(&expanded.expanded);

        // Expanded -> Retrieved, search-cache wraps this edge.
        let retrieval = RetrievalStage::new(self.index.clone(), self.cache.clone(), self.top_k);
        let retrieved = match retrieval.retrieve(&hints.retrieval_text, &query.entity_filter).await {
            Ok(results) => results,
            Err(_) => {
                let response = Response::unavailable("The policy index is temporarily unavailable.");
                self.audit_if_configured(&query, &response, start, "full_rag", &expanded.expanded).await;
                return response;
            }
        };

        // Quality Assessor (Corrective Retrieval) — non-fatal on internal failure.
        let assessor = QualityAssessor::default();
        let candidate_set = match assessor.assess(&retrieved, &hints.forced_references) {
            CorrectiveAction::Proceed | CorrectiveAction::Refuse => retrieved.clone(),
            CorrectiveAction::Filter(indices) => indices.into_iter().filter_map(|i| retrieved.get(i).cloned()).collect(),
            CorrectiveAction::Retry(missing_reference_numbers) => {
                let mut merged = retrieved.clone();
                let filter = IndexFilter::from_entities(&query.entity_filter);
                for reference_number in &missing_reference_numbers {
                    if let Ok(secondary) = self.index.search(reference_number, self.top_k, &filter, true).await {
                        for candidate in secondary {
                            if !merged.iter().any(|r| r.logical_key() == candidate.logical_key()) {
                                merged.push(candidate);
                            }
                        }
                    }
                }
                merged
            }
        };

        if candidate_set.is_empty() {
            let response = Response::not_found("I could not find anything matching that in our policies.", "NO_RESULTS");
            self.audit_if_configured(&query, &response, start, "full_rag", &expanded.expanded).await;
            return response;
        }

        let distinct_references: HashSet<&str> = candidate_set.iter().map(|r| r.reference_number.as_str()).collect();
        let is_multi_policy = distinct_references.len() > 1 || hints.forced_references.len() > 1;

        // Retrieved -> Reranked.
        let documents: Vec<RerankDocument> = candidate_set
            .iter()
            .map(|r| RerankDocument {
                title: r.title.clone(),
                reference_number: r.reference_number.clone(),
                applies_to: r.applies_to.iter().cloned().collect::<Vec<_>>().join(","),
                section: r.section.clone(),
                owner: String::new(),
                effective_date: String::new(),
                content: r.content.clone(),
            })
            .collect();

        let top_n = if expanded.original.split_whitespace().count() <= rerank_constants::SHORT_QUERY_WORD_LIMIT {
            rerank_constants::SHORT_QUERY_TOP_N
        } else if is_multi_policy {
            rerank_constants::MULTI_POLICY_TOP_N
        } else {
            rerank_constants::DEFAULT_TOP_N
        };

        let scores = match policyrag_rag::rerank_with_retry(
            self.reranker.as_ref(),
            &hints.retrieval_text,
            &documents,
            top_n,
            rerank_constants::DEFAULT_MIN_SCORE,
            rerank_constants::RETRY_MIN_SCORE,
        )
        .await
        {
            Ok(scores) => scores,
            Err(_) => {
                let response = Response::unavailable("The reranking service is temporarily unavailable.");
                self.audit_if_configured(&query, &response, start, "full_rag", &expanded.expanded).await;
                return response;
            }
        };

        let reranked: Vec<policyrag_core::RerankResult> = scores
            .into_iter()
            .filter_map(|s| {
                candidate_set.get(s.original_index).map(|r| policyrag_core::RerankResult {
                    result: r.clone(),
                    relevance_score: s.relevance_score,
                    original_index: s.original_index,
                })
            })
            .collect();

        // Reranked -> Adjusted.
        let adjuster = RankingAdjuster::new(
            RankingAdjusterConfig {
                forced_boost_multiplier: policyrag_config::constants::ranking::FORCED_BOOST_MULTIPLIER,
                forced_score_floor: policyrag_config::constants::ranking::FORCED_SCORE_FLOOR,
                forced_recovery_floor: policyrag_config::constants::ranking::FORCED_RECOVERY_FLOOR,
                surge_penalty: policyrag_config::constants::ranking::SURGE_PENALTY,
                pediatric_boost: policyrag_config::constants::ranking::PEDIATRIC_BOOST,
                adult_boost: policyrag_config::constants::ranking::ADULT_BOOST,
                location_boost: policyrag_config::constants::ranking::LOCATION_BOOST,
                mmr_lambda: policyrag_config::constants::ranking::MMR_LAMBDA,
                score_window: policyrag_config::constants::ranking::SCORE_WINDOW,
            },
            &self.tables,
        );
        let adjusted = adjuster.adjust(reranked, &candidate_set, &hints.forced_references, &query.text, is_multi_policy);

        if adjusted.is_empty() {
            let response = Response::not_found("I could not find anything matching that in our policies.", "NO_RESULTS");
            self.audit_if_configured(&query, &response, start, "full_rag", &expanded.expanded).await;
            return response;
        }

        // Adjusted -> Generated.
        let context_evidence: Vec<policyrag_core::Evidence> =
            adjusted.iter().map(|r| policyrag_core::Evidence::verified(r, 1_000)).collect();
        let context = llm_generator::assemble_context(&context_evidence);
        let prompt = llm_generator::user_prompt(&query.text, &context);
        let max_tokens = llm_generator::max_tokens_for(is_multi_policy);

        let answer_text = match self
            .generator
            .complete(llm_generator::SYSTEM_PROMPT, &prompt, generation_constants::TEMPERATURE, max_tokens)
            .await
        {
            Ok(text) => text,
            Err(_) => {
                let response = Response::unavailable("The answer generation service is temporarily unavailable.");
                self.audit_if_configured(&query, &response, start, "full_rag", &expanded.expanded).await;
                return response;
            }
        };

        // Generated -> Validated.
        let critique = match &self.critic {
            Some(critic) => {
                let contexts: Vec<String> = adjusted.iter().map(|r| r.result.content.clone()).collect();
                critic
                    .critique(&answer_text, &query.text, &contexts)
                    .await
                    .ok()
                    .map(|c| CritiqueSignal { is_grounded: c.is_grounded, confidence: c.confidence })
            }
            None => None,
        };

        let safety_gate = SafetyGate::new(&self.tables);
        let validated = safety_gate.validate(&answer_text, &adjusted, &query.text, is_multi_policy, critique);

        // Validated -> Formatted -> Delivered.
        let formatter = ResponseFormatter;
        let formatted = formatter.format(validated, is_multi_policy);

        if formatted.should_cache() {
            self.cache.set_response(&response_key, &formatted);
        }

        self.audit_if_configured(&query, &formatted, start, "full_rag", &expanded.expanded).await;
        formatted
    }

    pub async fn handle_streaming(&self, query: Query, tx: tokio::sync::mpsc::Sender<policyrag_core::StreamEvent>) {
        let response = self.handle(query).await;
        StreamingAdapter.emit(&response, &tx).await;
    }

    async fn audit_if_configured(&self, query: &Query, response: &Response, start: Instant, variant: &str, expanded_query: &str) {
        let Some(ref audit) = self.audit else { return };
        let record = AuditRecord {
            audit_id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            question: query.text.clone(),
            entity_filter: query.entity_filter.clone(),
            response_text: response.text.clone(),
            summary: response.summary.clone(),
            citations: response
                .sources
                .iter()
                .map(|s| AuditCitation {
                    title: s.title.clone(),
                    reference_number: s.reference_number.clone(),
                    section: String::new(),
                    source_file: String::new(),
                    score: response.confidence_score,
                })
                .collect(),
            chunks_used: response.chunks_used,
            confidence_level: format!("{:?}", response.confidence),
            confidence_score: response.confidence_score,
            needs_human_review: response.needs_human_review,
            safety_flags: response.safety_flags.clone(),
            latency_ms: start.elapsed().as_millis() as u64,
            pipeline_variant: variant.to_string(),
            expanded_query: expanded_query.to_string(),
        };
        if let Err(e) = audit.record(record).await {
            tracing::warn!(error = %e, "audit record failed, continuing");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use policyrag_core::traits::SourceMetadata;
    use policyrag_core::{EntitySet, SearchResult};

    struct StubIndex;

    #[async_trait]
    impl PolicyIndex for StubIndex {
        async fn search(
            &self,
            _query: &str,
            _top_k: usize,
            _filter: &IndexFilter,
            _use_semantic: bool,
        ) -> policyrag_core::Result<Vec<SearchResult>> {
            Ok(vec![SearchResult {
                id: "c1".into(),
                content: "Hand hygiene must be performed before and after patient contact.".into(),
                title: "Hand Hygiene Policy".into(),
                reference_number: "214".into(),
                section: "2".into(),
                source_file: "hh.pdf".into(),
                page_number: Some(3),
                applies_to: EntitySet::new(),
                score: 0.9,
            }])
        }

        async fn metadata_by_source_file(&self, _source_file: &str) -> policyrag_core::Result<Option<SourceMetadata>> {
            Ok(None)
        }
    }

    struct StubReranker;

    #[async_trait]
    impl Reranker for StubReranker {
        async fn rerank(
            &self,
            _query: &str,
            documents: &[RerankDocument],
            top_n: usize,
            _min_score: f64,
        ) -> policyrag_core::Result<Vec<policyrag_core::traits::RerankScore>> {
            Ok(documents
                .iter()
                .enumerate()
                .map(|(i, _)| policyrag_core::traits::RerankScore { original_index: i, relevance_score: 0.8 })
                .take(top_n)
                .collect())
        }
    }

    struct StubGenerator;

    #[async_trait]
    impl Generator for StubGenerator {
        async fn complete(&self, _system_prompt: &str, _user_prompt: &str, _temperature: f32, _max_tokens: usize) -> policyrag_core::Result<String> {
            Ok("Per reference 214, hand hygiene must be performed before and after patient contact.".to_string())
        }
    }

    fn orchestrator() -> Orchestrator {
        Orchestrator::new(Arc::new(StubIndex), Arc::new(StubReranker), Arc::new(StubGenerator))
    }

    #[tokio::test]
    async fn unclear_query_short_circuits_at_the_gate() {
        let orchestrator = orchestrator();
        let response = orchestrator.handle(Query::new("")).await;
        assert!(response.clarification.is_some());
    }

    #[tokio::test]
    async fn ordinary_query_is_delivered_with_citation() {
        let orchestrator = orchestrator();
        let response = orchestrator.handle(Query::new("what is the hand hygiene policy")).await;
        assert!(response.found);
        assert!(response.text.contains("214"));
    }

    #[tokio::test]
    async fn instance_search_bypasses_main_pipeline() {
        let orchestrator = orchestrator();
        let response = orchestrator.handle(Query::new("find hand hygiene in policy 214")).await;
        assert!(response.found);
        assert_eq!(response.evidence[0].match_type, "located");
    }

    #[tokio::test]
    async fn second_identical_query_is_served_from_cache() {
        let orchestrator = orchestrator();
        let first = orchestrator.handle(Query::new("what is the hand hygiene policy")).await;
        let second = orchestrator.handle(Query::new("what is the hand hygiene policy")).await;
        assert_eq!(first.text, second.text);
        assert_eq!(orchestrator.cache.stats().response.hits, 1);
    }

    #[tokio::test]
    async fn same_text_with_different_entity_filter_does_not_share_a_cache_entry() {
        let orchestrator = orchestrator();
        let filter_a: EntitySet = ["A".to_string()].into_iter().collect();
        let filter_b: EntitySet = ["B".to_string()].into_iter().collect();
        orchestrator
            .handle(Query::new("what is the hand hygiene policy").with_filter(filter_a))
            .await;
        orchestrator
            .handle(Query::new("what is the hand hygiene policy").with_filter(filter_b))
            .await;
        assert_eq!(orchestrator.cache.stats().response.hits, 0);
    }
}
