//! Query expansion, policy hints, three-tier caching, retrieval, quality
//! assessment, reranking, ranking adjustment, and instance search — the
//! stages upstream and around the generator and safety gate.
//!
//! Ingestion (chunking, embedding, vector store management) is out of
//! scope here; this crate treats the policy index as an external
//! collaborator reached through `policyrag_core::traits::PolicyIndex`.

pub mod cache;
pub mod http_index;
pub mod instance_search;
pub mod policy_hints;
pub mod quality_assessor;
pub mod query_expansion;
pub mod ranking_adjuster;
pub mod reranker;
pub mod retrieval;

pub use cache::{hash_key, CacheStats, FamilyStats, PolicyCache};
pub use http_index::HttpPolicyIndex;
pub use instance_search::InstanceSearchHandler;
pub use policy_hints::{InjectedHints, PolicyHintInjector};
pub use quality_assessor::QualityAssessor;
pub use query_expansion::QueryExpander;
pub use ranking_adjuster::{RankingAdjuster, RankingAdjusterConfig};
pub use reranker::{rerank_with_retry, HttpReranker, SimpleReranker, SimpleScorer};
pub use retrieval::RetrievalStage;
