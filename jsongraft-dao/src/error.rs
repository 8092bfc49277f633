//! Error types for DAO operations.

use jsongraft_storage::{ObjectRef, StorageError};
use thiserror::Error;

/// Result type for DAO operations.
pub type DaoResult<T> = Result<T, DaoError>;

#[derive(Debug, Error)]
pub enum DaoError {
    /// A unique-key lookup was attempted with no keys.
    #[error("no unique keys given for {entity}")]
    MissingUniqueKeys { entity: String },

    /// Fetched objects cannot be viewed as the requested type.
    #[error("cannot view {} objects as {requested}", .actual.len())]
    CastFailure {
        requested: String,
        actual: Vec<ObjectRef>,
    },

    /// A freshly inserted object cannot be viewed as the requested type.
    #[error("inserted {actual} cannot be viewed as {requested}")]
    TypeMismatch { requested: String, actual: String },

    /// Error from the persistence context.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}
