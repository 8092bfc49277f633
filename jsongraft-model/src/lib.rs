//! Schema model for jsongraft.
//!
//! Defines the metadata every other jsongraft crate consults at runtime:
//! - [`EntitySchema`]: an entity type's attributes, relationships and uniqueness constraint
//! - [`RelationshipSchema`]: cardinality, destination, inverse and delete rule of a relationship
//! - [`SchemaRegistry`]: the validated set of entity schemas for one object model
//! - [`Predicate`] / [`UniqueKeys`] / [`FetchRequest`]: structured queries over managed objects
//!
//! Destination types are resolved through the registry by entity name; nothing here
//! looks types up at runtime by any other means.

mod error;
mod predicate;
mod registry;
mod schema;
mod value;

pub use error::{ModelError, ModelResult};
pub use predicate::{FetchRequest, Predicate, SortDescriptor, UniqueKeys};
pub use registry::SchemaRegistry;
pub use schema::{
    AttributeSchema, AttributeType, Cardinality, DeleteRule, EntitySchema, RelationshipSchema,
};
pub use value::{compare_values, values_equal};

/// A JSON object as handed to the parser and stored as an object's attributes.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;
