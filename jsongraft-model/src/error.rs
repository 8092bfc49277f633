//! Error types for schema registration and validation.

use thiserror::Error;

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while building or validating a [`crate::SchemaRegistry`].
#[derive(Debug, Error)]
pub enum ModelError {
    /// No schema is registered under this entity name.
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    /// Two schemas share one entity name.
    #[error("entity registered twice: {0}")]
    DuplicateEntity(String),

    /// A property name is declared more than once on an entity.
    #[error("duplicate property {property} on {entity}")]
    DuplicateProperty { entity: String, property: String },

    /// A relationship points at an entity that is not registered.
    #[error("relationship {entity}.{relationship} points at unknown entity {destination}")]
    UnknownDestination {
        entity: String,
        relationship: String,
        destination: String,
    },

    /// A relationship names an inverse that does not exist on its destination.
    #[error("relationship {entity}.{relationship} names missing inverse {inverse}")]
    MissingInverse {
        entity: String,
        relationship: String,
        inverse: String,
    },

    /// The named inverse does not point back at the declaring relationship.
    #[error("inverse of {entity}.{relationship} does not point back")]
    InverseMismatch { entity: String, relationship: String },

    /// A uniqueness constraint names a field that is not an attribute.
    #[error("unique key {key} is not an attribute of {entity}")]
    UnknownUniqueKey { entity: String, key: String },

    /// The model description could not be decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
