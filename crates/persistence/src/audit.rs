//! ScyllaDB-backed implementation of `policyrag_core::traits::AuditSink`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use policyrag_core::traits::{AuditCitation, AuditRecord, AuditSink};
use uuid::Uuid;

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

/// Summary stats for a single partition date, used by the admin audit endpoints.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AuditStats {
    pub partition_date: String,
    pub record_count: i64,
    pub needs_human_review_count: i64,
}

/// ScyllaDB implementation of the audit sink.
#[derive(Clone)]
pub struct ScyllaAuditLog {
    client: ScyllaClient,
}

impl ScyllaAuditLog {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    /// Fetch audit records for a given partition date (`YYYY/MM/DD`), most recent first.
    pub async fn records_for_date(
        &self,
        partition_date: &str,
        limit: i32,
    ) -> Result<Vec<AuditRecord>, PersistenceError> {
        let query = format!(
            "SELECT audit_id, timestamp, question, entity_filter, response_text,
                    summary, citations_json, chunks_used, confidence_level,
                    confidence_score, needs_human_review, safety_flags_json,
                    latency_ms, pipeline_variant, expanded_query
             FROM {}.audit_log WHERE partition_date = ? LIMIT ?",
            self.client.keyspace()
        );

        let result = self
            .client
            .session()
            .query_unpaged(query, (partition_date, limit))
            .await?;

        let mut records = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                records.push(self.row_to_record(row)?);
            }
        }

        Ok(records)
    }

    /// Roll up counts for a partition date, used by the admin stats endpoint.
    pub async fn stats_for_date(&self, partition_date: &str) -> Result<AuditStats, PersistenceError> {
        let records = self.records_for_date(partition_date, 10_000).await?;
        let needs_human_review_count = records.iter().filter(|r| r.needs_human_review).count() as i64;

        Ok(AuditStats {
            partition_date: partition_date.to_string(),
            record_count: records.len() as i64,
            needs_human_review_count,
        })
    }

    fn row_to_record(
        &self,
        row: scylla::frame::response::result::Row,
    ) -> Result<AuditRecord, PersistenceError> {
        let (
            audit_id,
            timestamp,
            question,
            entity_filter_json,
            response_text,
            summary,
            citations_json,
            chunks_used,
            confidence_level,
            confidence_score,
            needs_human_review,
            safety_flags_json,
            latency_ms,
            pipeline_variant,
            expanded_query,
        ): (
            Uuid,
            i64,
            String,
            String,
            String,
            String,
            String,
            i32,
            String,
            f64,
            bool,
            String,
            i64,
            String,
            String,
        ) = row
            .into_typed()
            .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        let entity_filter = serde_json::from_str(&entity_filter_json)?;
        let citations: Vec<AuditCitation> = serde_json::from_str(&citations_json)?;
        let safety_flags: Vec<String> = serde_json::from_str(&safety_flags_json)?;

        Ok(AuditRecord {
            audit_id,
            timestamp: DateTime::from_timestamp_millis(timestamp).unwrap_or_else(Utc::now),
            question,
            entity_filter,
            response_text,
            summary,
            citations,
            chunks_used: chunks_used as usize,
            confidence_level,
            confidence_score,
            needs_human_review,
            safety_flags,
            latency_ms: latency_ms as u64,
            pipeline_variant,
            expanded_query,
        })
    }
}

#[async_trait]
impl AuditSink for ScyllaAuditLog {
    async fn record(&self, record: AuditRecord) -> policyrag_core::Result<()> {
        let entity_filter_json = serde_json::to_string(&record.entity_filter)
            .map_err(PersistenceError::from)?;
        let citations_json =
            serde_json::to_string(&record.citations).map_err(PersistenceError::from)?;
        let safety_flags_json =
            serde_json::to_string(&record.safety_flags).map_err(PersistenceError::from)?;

        let query = format!(
            "INSERT INTO {}.audit_log (
                partition_date, audit_id, timestamp, question, entity_filter,
                response_text, summary, citations_json, chunks_used,
                confidence_level, confidence_score, needs_human_review,
                safety_flags_json, latency_ms, pipeline_variant, expanded_query
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    record.partition(),
                    record.audit_id,
                    record.timestamp.timestamp_millis(),
                    &record.question,
                    entity_filter_json,
                    &record.response_text,
                    &record.summary,
                    citations_json,
                    record.chunks_used as i32,
                    &record.confidence_level,
                    record.confidence_score,
                    record.needs_human_review,
                    safety_flags_json,
                    record.latency_ms as i64,
                    &record.pipeline_variant,
                    &record.expanded_query,
                ),
            )
            .await
            .map_err(|e| PersistenceError::QueryError(e.to_string()))?;

        tracing::debug!(audit_id = %record.audit_id, "audit record persisted");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_groups_by_day() {
        let record = AuditRecord {
            audit_id: Uuid::new_v4(),
            timestamp: DateTime::parse_from_rfc3339("2026-08-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            question: "is physical therapy covered".to_string(),
            entity_filter: Default::default(),
            response_text: "Yes, under policy 12.3.".to_string(),
            summary: "physical therapy coverage".to_string(),
            citations: Vec::new(),
            chunks_used: 2,
            confidence_level: "high".to_string(),
            confidence_score: 0.9,
            needs_human_review: false,
            safety_flags: Vec::new(),
            latency_ms: 420,
            pipeline_variant: "standard".to_string(),
            expanded_query: "is physical therapy covered under the policy".to_string(),
        };

        assert_eq!(record.partition(), "2026/08/01");
    }
}
