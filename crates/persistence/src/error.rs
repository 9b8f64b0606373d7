//! Errors local to the ScyllaDB audit store, bridged into the pipeline's
//! shared `policyrag_core::Error`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("schema error: {0}")]
    SchemaError(String),

    #[error("query error: {0}")]
    QueryError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("invalid row data: {0}")]
    InvalidData(String),
}

impl From<scylla::transport::errors::NewSessionError> for PersistenceError {
    fn from(err: scylla::transport::errors::NewSessionError) -> Self {
        PersistenceError::ConnectionError(err.to_string())
    }
}

impl From<scylla::transport::errors::QueryError> for PersistenceError {
    fn from(err: scylla::transport::errors::QueryError) -> Self {
        PersistenceError::QueryError(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::SerializationError(err.to_string())
    }
}

impl From<PersistenceError> for policyrag_core::Error {
    fn from(err: PersistenceError) -> Self {
        policyrag_core::Error::Audit(err.to_string())
    }
}
