use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Describes one entity type: its scalar attributes, its relationships and
/// the attribute combination that identifies an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntitySchema {
    pub name: String,
    #[serde(default)]
    pub attributes: Vec<AttributeSchema>,
    #[serde(default)]
    pub relationships: Vec<RelationshipSchema>,
    /// Uniqueness constraint: attribute names that together identify one instance.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unique_keys: Vec<String>,
}

impl EntitySchema {
    /// Creates a schema with no properties.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: Vec::new(),
            relationships: Vec::new(),
            unique_keys: Vec::new(),
        }
    }

    /// Adds an attribute.
    #[must_use]
    pub fn with_attribute(mut self, attribute: AttributeSchema) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Adds a relationship.
    #[must_use]
    pub fn with_relationship(mut self, relationship: RelationshipSchema) -> Self {
        self.relationships.push(relationship);
        self
    }

    /// Declares the uniqueness constraint.
    #[must_use]
    pub fn with_unique_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipSchema> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Every property name, attributes and relationships alike.
    pub fn property_names(&self) -> BTreeSet<&str> {
        self.attributes
            .iter()
            .map(|a| a.name.as_str())
            .chain(self.relationships.iter().map(|r| r.name.as_str()))
            .collect()
    }

    pub fn relationship_names(&self) -> BTreeSet<&str> {
        self.relationships.iter().map(|r| r.name.as_str()).collect()
    }

    /// Scalar property names: all properties minus relationships.
    pub fn scalar_names(&self) -> BTreeSet<&str> {
        let relationships = self.relationship_names();
        self.property_names()
            .into_iter()
            .filter(|name| !relationships.contains(name))
            .collect()
    }

    /// Relationships of this entity whose destination is `destination`.
    pub fn relationships_for_destination<'a>(
        &'a self,
        destination: &'a str,
    ) -> impl Iterator<Item = &'a RelationshipSchema> + 'a {
        self.relationships
            .iter()
            .filter(move |r| r.destination == destination)
    }
}

/// A scalar property of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
}

impl AttributeSchema {
    pub fn new(name: &str, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
        }
    }

    /// Shorthand for a string attribute.
    pub fn string(name: &str) -> Self {
        Self::new(name, AttributeType::String)
    }

    /// Shorthand for a 64-bit integer attribute.
    pub fn integer(name: &str) -> Self {
        Self::new(name, AttributeType::Integer)
    }

    /// Shorthand for a floating point attribute.
    pub fn double(name: &str) -> Self {
        Self::new(name, AttributeType::Double)
    }

    /// Shorthand for a boolean attribute.
    pub fn boolean(name: &str) -> Self {
        Self::new(name, AttributeType::Boolean)
    }

    /// Shorthand for an attribute holding arbitrary JSON.
    pub fn json(name: &str) -> Self {
        Self::new(name, AttributeType::Json)
    }
}

/// The storage type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    String,
    Integer,
    Double,
    Boolean,
    Json,
}

impl AttributeType {
    /// Converts `value` into this type's canonical representation.
    ///
    /// Returns `None` when the value cannot be represented. `null` is accepted
    /// by every type and clears the attribute.
    pub fn coerce(self, value: Value) -> Option<Value> {
        if value.is_null() {
            return Some(Value::Null);
        }
        match self {
            Self::Json => Some(value),
            Self::String => value.is_string().then_some(value),
            Self::Integer => {
                let Value::Number(n) = &value else {
                    return None;
                };
                if let Some(i) = n.as_i64() {
                    return Some(Value::from(i));
                }
                let f = n.as_f64()?;
                (f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64)
                    .then(|| Value::from(f as i64))
            }
            Self::Double => value.as_f64().map(Value::from),
            Self::Boolean => match value {
                Value::Bool(_) => Some(value),
                // 0/1 numbers bridge to booleans
                Value::Number(n) => match n.as_i64() {
                    Some(0) => Some(Value::Bool(false)),
                    Some(1) => Some(Value::Bool(true)),
                    _ => None,
                },
                _ => None,
            },
        }
    }
}

/// Cardinality of a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    ToOne,
    ToMany,
}

/// What happens to related objects when the source object is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteRule {
    /// Remove the deleted object from the related objects' inverse (default).
    #[default]
    Nullify,
    /// Delete the related objects as well.
    Cascade,
}

/// A relationship from one entity to another.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipSchema {
    pub name: String,
    pub destination: String,
    pub cardinality: Cardinality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
    #[serde(default)]
    pub delete_rule: DeleteRule,
}

impl RelationshipSchema {
    fn simple(name: &str, destination: &str, cardinality: Cardinality) -> Self {
        Self {
            name: name.into(),
            destination: destination.into(),
            cardinality,
            inverse: None,
            delete_rule: DeleteRule::Nullify,
        }
    }

    /// Shorthand for a to-one relationship.
    pub fn to_one(name: &str, destination: &str) -> Self {
        Self::simple(name, destination, Cardinality::ToOne)
    }

    /// Shorthand for a to-many relationship.
    pub fn to_many(name: &str, destination: &str) -> Self {
        Self::simple(name, destination, Cardinality::ToMany)
    }

    #[must_use]
    pub fn with_inverse(mut self, inverse: &str) -> Self {
        self.inverse = Some(inverse.into());
        self
    }

    #[must_use]
    pub fn with_delete_rule(mut self, delete_rule: DeleteRule) -> Self {
        self.delete_rule = delete_rule;
        self
    }

    pub fn is_to_many(&self) -> bool {
        self.cardinality == Cardinality::ToMany
    }
}
