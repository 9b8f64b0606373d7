//! ScyllaDB schema creation for the audit log.

use scylla::Session;

use crate::error::PersistenceError;

/// Create the keyspace if it doesn't exist.
pub async fn create_keyspace(session: &Session, keyspace: &str, replication_factor: u8) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create the audit log table, partitioned by date.
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    let audit_log_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.audit_log (
            partition_date TEXT,
            audit_id UUID,
            timestamp TIMESTAMP,
            question TEXT,
            entity_filter TEXT,
            response_text TEXT,
            summary TEXT,
            citations_json TEXT,
            chunks_used INT,
            confidence_level TEXT,
            confidence_score DOUBLE,
            needs_human_review BOOLEAN,
            safety_flags_json TEXT,
            latency_ms BIGINT,
            pipeline_variant TEXT,
            expanded_query TEXT,
            PRIMARY KEY ((partition_date), timestamp, audit_id)
        ) WITH CLUSTERING ORDER BY (timestamp DESC, audit_id DESC)
    "#,
        keyspace
    );

    session
        .query_unpaged(audit_log_table, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("failed to create audit_log table: {}", e)))?;

    tracing::info!("audit_log table ensured");
    Ok(())
}
