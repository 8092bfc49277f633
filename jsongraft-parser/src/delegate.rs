//! Caller-supplied policy for identity resolution and field mapping.

use crate::{ParseError, ParseResult};
use jsongraft_model::SchemaRegistry;
use jsongraft_storage::ObjectRef;
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

/// Answers the questions the parser cannot decide from the schema alone.
pub trait ParserDelegate: Send + Sync {
    /// JSON field names whose values identify one instance of `entity`.
    fn primary_keys(&self, entity: &str) -> BTreeSet<String>;

    /// Maps a JSON field name onto a schema property name.
    fn adjust_field_name(&self, json_name: &str, entity: &str) -> String {
        let _ = entity;
        json_name.to_string()
    }

    /// Transforms a raw scalar before it is assigned to `field` of `object`.
    /// `None` leaves the attribute untouched.
    fn adjust_value(&self, value: Value, field: &str, object: &ObjectRef) -> Option<Value> {
        let _ = (field, object);
        Some(value)
    }
}

/// Wraps an optional delegate, supplying defaults and enforcing that every
/// entity declares at least one unique key.
#[derive(Clone, Default)]
pub struct DelegateAdapter {
    delegate: Option<Arc<dyn ParserDelegate>>,
}

impl DelegateAdapter {
    pub fn new(delegate: Option<Arc<dyn ParserDelegate>>) -> Self {
        Self { delegate }
    }

    pub fn is_configured(&self) -> bool {
        self.delegate.is_some()
    }

    pub fn primary_keys(&self, entity: &str) -> ParseResult<BTreeSet<String>> {
        let delegate = self.delegate.as_ref().ok_or(ParseError::MissingDelegate)?;
        let keys = delegate.primary_keys(entity);
        if keys.is_empty() {
            return Err(ParseError::MissingUniqueIds {
                entity: entity.to_string(),
            });
        }
        Ok(keys)
    }

    pub fn adjust_field_name(&self, json_name: &str, entity: &str) -> String {
        match &self.delegate {
            Some(delegate) => delegate.adjust_field_name(json_name, entity),
            None => json_name.to_string(),
        }
    }

    pub fn adjust_value(&self, value: Value, field: &str, object: &ObjectRef) -> Option<Value> {
        match &self.delegate {
            Some(delegate) => delegate.adjust_value(value, field, object),
            None => Some(value),
        }
    }
}

/// Delegate built from explicit per-entity unique keys and field renames.
///
/// ```
/// use jsongraft_parser::{KeyMapDelegate, ParserDelegate};
///
/// let delegate = KeyMapDelegate::new()
///     .with_keys("User", ["id"])
///     .with_rename("User", "user_name", "name");
/// assert!(delegate.primary_keys("User").contains("id"));
/// assert_eq!(delegate.adjust_field_name("user_name", "User"), "name");
/// ```
#[derive(Debug, Clone, Default)]
pub struct KeyMapDelegate {
    keys: HashMap<String, BTreeSet<String>>,
    renames: HashMap<String, HashMap<String, String>>,
}

impl KeyMapDelegate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the unique keys of `entity`, replacing earlier ones.
    #[must_use]
    pub fn with_keys<I, S>(mut self, entity: &str, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keys
            .insert(entity.to_string(), keys.into_iter().map(Into::into).collect());
        self
    }

    /// Maps JSON field `json_name` onto property `field` of `entity`.
    #[must_use]
    pub fn with_rename(mut self, entity: &str, json_name: &str, field: &str) -> Self {
        self.renames
            .entry(entity.to_string())
            .or_default()
            .insert(json_name.to_string(), field.to_string());
        self
    }

    /// JSON field name renamed onto `field`, or `field` itself.
    fn json_name_for(&self, entity: &str, field: &str) -> String {
        self.renames
            .get(entity)
            .and_then(|renames| {
                renames
                    .iter()
                    .find(|(_, target)| target.as_str() == field)
                    .map(|(json_name, _)| json_name.clone())
            })
            .unwrap_or_else(|| field.to_string())
    }
}

impl ParserDelegate for KeyMapDelegate {
    fn primary_keys(&self, entity: &str) -> BTreeSet<String> {
        self.keys.get(entity).cloned().unwrap_or_default()
    }

    fn adjust_field_name(&self, json_name: &str, entity: &str) -> String {
        self.renames
            .get(entity)
            .and_then(|renames| renames.get(json_name))
            .cloned()
            .unwrap_or_else(|| json_name.to_string())
    }
}

/// Delegate taking unique keys from each schema's uniqueness constraint.
///
/// Keys are reported under their JSON names, so a renamed key field is looked
/// up by the name it has in the payload.
#[derive(Debug, Clone, Default)]
pub struct SchemaDelegate {
    inner: KeyMapDelegate,
}

impl SchemaDelegate {
    pub fn new(registry: &SchemaRegistry) -> Self {
        let inner = registry
            .entities()
            .filter(|schema| !schema.unique_keys.is_empty())
            .fold(KeyMapDelegate::new(), |delegate, schema| {
                delegate.with_keys(&schema.name, schema.unique_keys.iter().cloned())
            });
        Self { inner }
    }

    #[must_use]
    pub fn with_rename(mut self, entity: &str, json_name: &str, field: &str) -> Self {
        self.inner = self.inner.with_rename(entity, json_name, field);
        self
    }
}

impl ParserDelegate for SchemaDelegate {
    fn primary_keys(&self, entity: &str) -> BTreeSet<String> {
        self.inner
            .primary_keys(entity)
            .into_iter()
            .map(|field| self.inner.json_name_for(entity, &field))
            .collect()
    }

    fn adjust_field_name(&self, json_name: &str, entity: &str) -> String {
        self.inner.adjust_field_name(json_name, entity)
    }
}
