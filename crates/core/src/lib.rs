//! Shared types and traits for the policy RAG chat core.
//!
//! This crate provides the data model (`types`), the central error type
//! (`error`), and the external-collaborator interfaces (`traits`) that
//! every other crate in the workspace builds on.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use traits::{
    AuditCitation, AuditRecord, AuditSink, Generator, GenerationDelta, GroundingCritic,
    GroundingCritique, IndexFilter, PolicyIndex, RerankDocument, RerankScore, Reranker,
    SourceMetadata,
};
pub use types::{
    normalize_reference, Clarification, ConfidenceLevel, CorrectiveAction, EntitySet, Evidence,
    ExpandedQuery, ExpandedTerm, ExpansionRule, ForcedReference, PipelineVariant, Query,
    RerankResult, Response, SearchResult, Source, StageMetric, StreamEvent,
};
