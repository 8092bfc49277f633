//! Error types for parsing.

use jsongraft_dao::DaoError;
use jsongraft_model::ModelError;
use jsongraft_storage::{ObjectRef, StorageError};
use thiserror::Error;

/// Result type for parse operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Errors that abort a parse call.
#[derive(Debug, Error)]
pub enum ParseError {
    /// No delegate was configured to answer unique-key questions.
    #[error("parser has no delegate")]
    MissingDelegate,

    /// The delegate returned no unique keys for an entity.
    #[error("no unique keys declared for {entity}")]
    MissingUniqueIds { entity: String },

    /// An array was given for a to-one relationship.
    #[error("cannot assign an array to to-one relationship {relationship} of {parent}")]
    FailedCreateRelation { relationship: String, parent: ObjectRef },

    /// A relationship value is neither an object nor an array of objects.
    #[error("unsupported value for relationship {relationship} of {parent}")]
    UnknownDataTypeForRelation { relationship: String, parent: ObjectRef },

    #[error("dao error: {0}")]
    Dao(#[from] DaoError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("model error: {0}")]
    Model(#[from] ModelError),
}
