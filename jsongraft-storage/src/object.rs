use jsongraft_model::JsonObject;
use jsongraft_types::EntityId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Transient handle to a managed object: its identity token and entity name.
///
/// Handles carry no attribute state; read and write through the owning
/// [`crate::Context`]. Equality and hashing follow the identity token.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    id: EntityId,
    entity: String,
}

impl ObjectRef {
    pub fn new(id: EntityId, entity: impl Into<String>) -> Self {
        Self {
            id,
            entity: entity.into(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.entity, self.id)
    }
}

/// An object row as persisted in the backing store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub id: EntityId,
    pub entity: String,
    pub attributes: JsonObject,
    /// Relationship name to related identities, as owned by this object.
    pub links: BTreeMap<String, BTreeSet<EntityId>>,
}
