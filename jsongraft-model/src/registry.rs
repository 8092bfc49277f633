use crate::{EntitySchema, ModelError, ModelResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// The set of entity schemas making up one object model.
///
/// Serializes as a plain list of [`EntitySchema`]s so a model description can
/// be kept as a JSON file next to the code that consumes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<EntitySchema>", into = "Vec<EntitySchema>")]
pub struct SchemaRegistry {
    entities: BTreeMap<String, EntitySchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from schemas and validates it.
    pub fn with_entities<I>(schemas: I) -> ModelResult<Self>
    where
        I: IntoIterator<Item = EntitySchema>,
    {
        let mut registry = Self::new();
        for schema in schemas {
            registry.register(schema)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Decodes a JSON model description (a list of entity schemas) and validates it.
    pub fn from_json(json: &str) -> ModelResult<Self> {
        let schemas: Vec<EntitySchema> = serde_json::from_str(json)?;
        Self::with_entities(schemas)
    }

    /// Adds a schema. Cross-entity references are only checked by [`Self::validate`].
    pub fn register(&mut self, schema: EntitySchema) -> ModelResult<()> {
        if self.entities.contains_key(&schema.name) {
            return Err(ModelError::DuplicateEntity(schema.name));
        }
        self.entities.insert(schema.name.clone(), schema);
        Ok(())
    }

    pub fn entity(&self, name: &str) -> Option<&EntitySchema> {
        self.entities.get(name)
    }

    /// Like [`Self::entity`] but fails with [`ModelError::UnknownEntity`].
    pub fn require(&self, name: &str) -> ModelResult<&EntitySchema> {
        self.entities
            .get(name)
            .ok_or_else(|| ModelError::UnknownEntity(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entities.contains_key(name)
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntitySchema> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Checks every cross-entity reference in the model.
    ///
    /// - property names are unique per entity
    /// - relationship destinations are registered
    /// - inverses exist on the destination and point back at the declaring relationship
    /// - uniqueness constraints only name attributes
    pub fn validate(&self) -> ModelResult<()> {
        for schema in self.entities.values() {
            let mut seen = BTreeSet::new();
            let names = schema
                .attributes
                .iter()
                .map(|a| &a.name)
                .chain(schema.relationships.iter().map(|r| &r.name));
            for name in names {
                if !seen.insert(name) {
                    return Err(ModelError::DuplicateProperty {
                        entity: schema.name.clone(),
                        property: name.clone(),
                    });
                }
            }

            for relationship in &schema.relationships {
                let destination = self.entity(&relationship.destination).ok_or_else(|| {
                    ModelError::UnknownDestination {
                        entity: schema.name.clone(),
                        relationship: relationship.name.clone(),
                        destination: relationship.destination.clone(),
                    }
                })?;

                let Some(inverse_name) = &relationship.inverse else {
                    continue;
                };
                let inverse = destination.relationship(inverse_name).ok_or_else(|| {
                    ModelError::MissingInverse {
                        entity: schema.name.clone(),
                        relationship: relationship.name.clone(),
                        inverse: inverse_name.clone(),
                    }
                })?;
                let points_back = inverse.destination == schema.name
                    && inverse.inverse.as_deref() == Some(relationship.name.as_str());
                if !points_back {
                    return Err(ModelError::InverseMismatch {
                        entity: schema.name.clone(),
                        relationship: relationship.name.clone(),
                    });
                }
            }

            for key in &schema.unique_keys {
                if schema.attribute(key).is_none() {
                    return Err(ModelError::UnknownUniqueKey {
                        entity: schema.name.clone(),
                        key: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

impl From<Vec<EntitySchema>> for SchemaRegistry {
    fn from(schemas: Vec<EntitySchema>) -> Self {
        let entities = schemas
            .into_iter()
            .map(|schema| (schema.name.clone(), schema))
            .collect();
        Self { entities }
    }
}

impl From<SchemaRegistry> for Vec<EntitySchema> {
    fn from(registry: SchemaRegistry) -> Self {
        registry.entities.into_values().collect()
    }
}
