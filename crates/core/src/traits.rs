//! External collaborator interfaces.
//!
//! These are the seams the orchestrator depends on but does not own:
//! document ingestion, the vector/lexical index itself, the reranking
//! model, the generation model, and the audit store. Pipeline stages take
//! `Arc<dyn Trait>` handles so tests can stub every one of them with a
//! deterministic fixture.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{EntitySet, SearchResult};

/// A structured filter expression produced from an entity filter. Kept
/// opaque at this layer; the index adapter is responsible for mapping it
/// injection-safely into its own query language.
#[derive(Debug, Clone, Default)]
pub struct IndexFilter {
    pub applies_to_any: EntitySet,
}

impl IndexFilter {
    pub fn from_entities(entities: &EntitySet) -> Self {
        Self {
            applies_to_any: entities.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.applies_to_any.is_empty()
    }
}

/// Metadata about a source document, independent of any one chunk.
#[derive(Debug, Clone)]
pub struct SourceMetadata {
    pub title: String,
    pub reference_number: String,
    pub section: String,
    pub applies_to: EntitySet,
    pub date_updated: Option<chrono::DateTime<chrono::Utc>>,
}

/// The policy index: a capability offering lexical+vector hybrid search
/// plus document lookups. Ingestion operations (`upload_chunks`,
/// `delete_by_source_file`) are intentionally not part of this trait —
/// they belong to the ingestion system, out of scope here.
#[async_trait]
pub trait PolicyIndex: Send + Sync {
    async fn search(
        &self,
        query: &str,
        top_k: usize,
        filter: &IndexFilter,
        use_semantic: bool,
    ) -> Result<Vec<SearchResult>>;

    async fn metadata_by_source_file(&self, source_file: &str) -> Result<Option<SourceMetadata>>;
}

/// One candidate scored against a query by the reranker.
#[derive(Debug, Clone, Copy)]
pub struct RerankScore {
    pub original_index: usize,
    pub relevance_score: f64,
}

/// A document serialized for the reranker with a fixed field order
/// (content last) so truncation at the scorer's token limit removes
/// content before metadata.
#[derive(Debug, Clone)]
pub struct RerankDocument {
    pub title: String,
    pub reference_number: String,
    pub applies_to: String,
    pub section: String,
    pub owner: String,
    pub effective_date: String,
    pub content: String,
}

impl RerankDocument {
    /// Render in the fixed field order the cross-encoder expects.
    pub fn to_scorer_text(&self) -> String {
        format!(
            "title: {}\nreference: {}\napplies_to: {}\nsection: {}\nowner: {}\neffective_date: {}\ncontent: {}",
            self.title,
            self.reference_number,
            self.applies_to,
            self.section,
            self.owner,
            self.effective_date,
            self.content
        )
    }
}

/// The reranking service: cross-encoder-style relevance scoring.
#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(
        &self,
        query: &str,
        documents: &[RerankDocument],
        top_n: usize,
        min_score: f64,
    ) -> Result<Vec<RerankScore>>;
}

/// A single text delta in a streamed generation.
pub type GenerationDelta = String;

/// The generation service: zero-temperature completion with a
/// fixed system prompt, plus a streaming variant.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: usize,
    ) -> Result<String>;

    /// Stream generation deltas over a channel. The default
    /// implementation falls back to a single non-streaming call whose
    /// full text is sent as one delta, so stub generators used in tests
    /// need not implement true token streaming.
    async fn complete_stream(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        temperature: f32,
        max_tokens: usize,
        tx: tokio::sync::mpsc::Sender<GenerationDelta>,
    ) -> Result<()> {
        let text = self
            .complete(system_prompt, user_prompt, temperature, max_tokens)
            .await?;
        let _ = tx.send(text).await;
        Ok(())
    }
}

/// Advisory second-pass grounding critique.
#[derive(Debug, Clone)]
pub struct GroundingCritique {
    pub is_grounded: bool,
    pub confidence: f64,
    pub issues: Vec<String>,
    pub unsupported_claims: Vec<String>,
}

#[async_trait]
pub trait GroundingCritic: Send + Sync {
    async fn critique(&self, response_text: &str, query: &str, contexts: &[String]) -> Result<GroundingCritique>;
}

/// One append-only audit record. Partitioned by date when
/// persisted; failures here must never block the response path.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuditRecord {
    pub audit_id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub question: String,
    pub entity_filter: EntitySet,
    pub response_text: String,
    pub summary: String,
    pub citations: Vec<AuditCitation>,
    pub chunks_used: usize,
    pub confidence_level: String,
    pub confidence_score: f64,
    pub needs_human_review: bool,
    pub safety_flags: Vec<String>,
    pub latency_ms: u64,
    pub pipeline_variant: String,
    pub expanded_query: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct AuditCitation {
    pub title: String,
    pub reference_number: String,
    pub section: String,
    pub source_file: String,
    pub score: f64,
}

impl AuditRecord {
    /// The `YYYY/MM/DD` partition this record belongs to.
    pub fn partition(&self) -> String {
        self.timestamp.format("%Y/%m/%d").to_string()
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, record: AuditRecord) -> Result<()>;
}
