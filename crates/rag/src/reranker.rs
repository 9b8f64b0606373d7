//! Reranker: cross-encoder-style relevance reordering.
//!
//! `SimpleScorer` is a deterministic TF-IDF-like fallback, used when no
//! external reranker is configured (tests, local dev, or as a degraded
//! mode). `HttpReranker` is a thin HTTP client satisfying the
//! `Reranker` trait against an external service; its wire shape mirrors
//! a Cohere-style rerank endpoint.

use async_trait::async_trait;

use policyrag_core::traits::{RerankDocument, RerankScore, Reranker};
use policyrag_core::{Error, Result};

/// Deterministic keyword-overlap scorer used as a stubbable fallback.
pub struct SimpleScorer;

impl SimpleScorer {
    const STOPWORDS: &'static [&'static str] = &[
        "the", "a", "an", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "do", "does", "did", "will", "would", "could", "should", "may", "might", "must", "to",
        "of", "in", "for", "on", "with", "at", "by", "from", "as", "and", "but", "if", "or",
        "what", "which", "who", "this", "that", "these", "those",
    ];

    /// Score a query against rendered scorer text, using term frequency,
    /// a length-based IDF approximation, position weighting, and a
    /// coverage bonus. Normalized into `[0, 1]`.
    pub fn score(query: &str, document: &str) -> f64 {
        let query_lower = query.to_lowercase();
        let doc_lower = document.to_lowercase();
        let stopwords: std::collections::HashSet<&str> = Self::STOPWORDS.iter().copied().collect();

        let query_terms: Vec<&str> = query_lower
            .split_whitespace()
            .filter(|w| w.len() > 1 && !stopwords.contains(*w))
            .collect();
        if query_terms.is_empty() {
            return 0.0;
        }

        let doc_words: Vec<&str> = doc_lower.split_whitespace().collect();
        let doc_len = doc_words.len().max(1) as f64;

        let mut total = 0.0f64;
        let mut matched = 0usize;
        for (pos, term) in query_terms.iter().enumerate() {
            let tf = doc_words.iter().filter(|w| **w == *term).count() as f64;
            if tf > 0.0 {
                matched += 1;
                let tf_score = tf.sqrt();
                let idf_approx = (1.0 + term.len() as f64).ln();
                let position_weight = 1.0 / (1.0 + pos as f64 * 0.1);
                let length_norm = 1.0 / (1.0 + (doc_len / 50.0).sqrt());
                total += tf_score * idf_approx * position_weight * length_norm;
            }
        }

        let coverage = matched as f64 / query_terms.len() as f64;
        let raw = total + coverage * 0.3;
        (raw / (raw + 1.0)).min(1.0)
    }
}

/// Reranks using `SimpleScorer` only. Deterministic, dependency-free;
/// used in tests and as a degraded-mode fallback.
pub struct SimpleReranker;

#[async_trait]
impl Reranker for SimpleReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[RerankDocument],
        top_n: usize,
        min_score: f64,
    ) -> Result<Vec<RerankScore>> {
        rerank_with(documents, top_n, min_score, |doc| {
            SimpleScorer::score(query, &doc.to_scorer_text())
        })
    }
}

/// Calls an external cross-encoder-style rerank service over HTTP.
pub struct HttpReranker {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpReranker {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[derive(serde::Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    documents: Vec<String>,
    top_n: usize,
}

#[derive(serde::Deserialize)]
struct RerankResponseItem {
    index: usize,
    relevance_score: f64,
}

#[derive(serde::Deserialize)]
struct RerankResponse {
    results: Vec<RerankResponseItem>,
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(
        &self,
        query: &str,
        documents: &[RerankDocument],
        top_n: usize,
        min_score: f64,
    ) -> Result<Vec<RerankScore>> {
        let body = RerankRequest {
            query,
            documents: documents.iter().map(|d| d.to_scorer_text()).collect(),
            top_n,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Rerank(format!("reranker request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Rerank(format!(
                "reranker returned status {}",
                response.status()
            )));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| Error::Rerank(format!("invalid reranker response: {}", e)))?;

        let mut scores: Vec<RerankScore> = parsed
            .results
            .into_iter()
            .map(|item| RerankScore {
                original_index: item.index,
                relevance_score: item.relevance_score,
            })
            .collect();

        scores.retain(|s| s.relevance_score >= min_score);
        scores.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap());
        scores.truncate(top_n);

        tracing::debug!(count = scores.len(), "reranker scores computed");
        Ok(scores)
    }
}

fn rerank_with(
    documents: &[RerankDocument],
    top_n: usize,
    min_score: f64,
    score_fn: impl Fn(&RerankDocument) -> f64,
) -> Result<Vec<RerankScore>> {
    let mut scored: Vec<RerankScore> = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| RerankScore {
            original_index: i,
            relevance_score: score_fn(doc),
        })
        .collect();

    scored.retain(|s| s.relevance_score >= min_score);
    scored.sort_by(|a, b| b.relevance_score.partial_cmp(&a.relevance_score).unwrap());
    scored.truncate(top_n);

    tracing::debug!(count = scored.len(), min_score, "simple reranker scores computed");
    Ok(scored)
}

/// Reranks with `primary`, retrying once at threshold 0 if the first pass
/// returns nothing.
pub async fn rerank_with_retry(
    reranker: &dyn Reranker,
    query: &str,
    documents: &[RerankDocument],
    top_n: usize,
    min_score: f64,
    retry_min_score: f64,
) -> Result<Vec<RerankScore>> {
    let first = reranker.rerank(query, documents, top_n, min_score).await?;
    if !first.is_empty() {
        return Ok(first);
    }
    reranker.rerank(query, documents, top_n, retry_min_score).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(content: &str) -> RerankDocument {
        RerankDocument {
            title: "Policy".into(),
            reference_number: "100".into(),
            applies_to: "A".into(),
            section: "1".into(),
            owner: "Nursing".into(),
            effective_date: "2024-01-01".into(),
            content: content.into(),
        }
    }

    #[test]
    fn simple_scorer_favors_specific_match() {
        let specific = SimpleScorer::score(
            "hand hygiene compliance",
            "Hand hygiene compliance is audited monthly using direct observation",
        );
        let generic = SimpleScorer::score(
            "hand hygiene compliance",
            "This policy covers general facility operations",
        );
        assert!(specific > generic);
    }

    #[tokio::test]
    async fn simple_reranker_filters_by_min_score_and_top_n() {
        let reranker = SimpleReranker;
        let docs = vec![
            doc("hand hygiene compliance audited monthly"),
            doc("unrelated facility parking policy"),
        ];
        let scores = reranker.rerank("hand hygiene compliance", &docs, 1, 0.01).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].original_index, 0);
    }

    #[tokio::test]
    async fn retry_at_zero_recovers_empty_first_pass() {
        let reranker = SimpleReranker;
        let docs = vec![doc("totally unrelated content about parking")];
        let scores = rerank_with_retry(&reranker, "hand hygiene", &docs, 5, 0.99, 0.0)
            .await
            .unwrap();
        assert!(!scores.is_empty());
    }
}
