//! Error types for the storage layer.

use jsongraft_model::{AttributeType, ModelError};
use jsongraft_types::EntityId;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error from DuckDB.
    #[error("database error: {0}")]
    Database(#[from] duckdb::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored identity token could not be parsed.
    #[error("invalid identity: {0}")]
    Identity(#[from] jsongraft_types::Error),

    /// Schema lookup failed (unknown entity).
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The object is neither registered in the context nor present in the store.
    #[error("object not found: {0}")]
    ObjectNotFound(EntityId),

    #[error("{entity} has no attribute {attribute}")]
    UnknownAttribute { entity: String, attribute: String },

    #[error("{entity} has no relationship {relationship}")]
    UnknownRelationship { entity: String, relationship: String },

    /// The value cannot be stored in an attribute of the declared type.
    #[error("invalid value for {entity}.{attribute} (expected {expected:?}): {value}")]
    InvalidValue {
        entity: String,
        attribute: String,
        expected: AttributeType,
        value: serde_json::Value,
    },

    /// More than one object assigned to a to-one relationship.
    #[error("to-one relationship {entity}.{relationship} given {count} objects")]
    Cardinality {
        entity: String,
        relationship: String,
        count: usize,
    },

    /// An object of the wrong entity assigned to a relationship.
    #[error("relationship {relationship} expects {expected}, got {actual}")]
    DestinationMismatch {
        relationship: String,
        expected: String,
        actual: String,
    },

    /// A stored row could not be decoded.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// A lock guarding the workspace or connection was poisoned by a panic.
    #[error("lock poisoned")]
    LockPoisoned,

    /// The context queue's worker has stopped.
    #[error("context queue closed")]
    QueueClosed,
}
