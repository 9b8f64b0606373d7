//! ScyllaDB-backed audit log for the policy RAG chat core.
//!
//! Connects, ensures the schema exists, and exposes a concrete
//! `policyrag_core::traits::AuditSink` plus the read paths the admin
//! endpoints need to list and summarize past audit records.

pub mod audit;
pub mod client;
pub mod error;
pub mod schema;

pub use audit::{AuditStats, ScyllaAuditLog};
pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;

/// Connect to ScyllaDB, ensure the schema exists, and hand back a ready sink.
pub async fn init(config: ScyllaConfig) -> Result<ScyllaAuditLog, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;
    Ok(ScyllaAuditLog::new(client))
}
