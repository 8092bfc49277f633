use crate::{Cleanup, DelegateAdapter, ParseError, ParseResult, ParserConfig, ParserDelegate};
use jsongraft_dao::{cast_all, Dao, ManagedObject};
use jsongraft_model::{JsonObject, RelationshipSchema};
use jsongraft_storage::{Context, ObjectRef};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

/// Merges JSON object trees into the object graph of a [`Dao`]'s context.
///
/// Each object is resolved by its unique keys: an existing object is reused,
/// otherwise one is inserted. Scalars are assigned, then nested objects are
/// merged recursively into the relationships they are keyed under. To-many
/// relationships keep their previous members; the configured
/// [`crate::CleanupOption`] decides which dropped members are deleted once
/// the whole call has finished.
///
/// The parser never saves; the caller owns save points on the context.
#[derive(Clone)]
pub struct Parser {
    dao: Dao,
    delegate: DelegateAdapter,
    config: ParserConfig,
}

impl Parser {
    pub fn new(dao: Dao, delegate: Option<Arc<dyn ParserDelegate>>) -> Self {
        Self {
            dao,
            delegate: DelegateAdapter::new(delegate),
            config: ParserConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    pub fn dao(&self) -> &Dao {
        &self.dao
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    fn context(&self) -> &Context {
        self.dao.context()
    }

    // ── Entry points ─────────────────────────────────────────────

    /// Merges every object as an instance of `root` and runs cleanup once.
    ///
    /// Empty objects are skipped. Must run on the context queue or with
    /// exclusive ownership of the context. An error aborts the call without
    /// cleanup; merges already applied stay in the context until rolled back.
    pub fn parse(&self, objects: &[JsonObject], root: &str) -> ParseResult<Vec<ObjectRef>> {
        self.context().schema().require(root)?;
        let mut cleanup = Cleanup::new(self.config.cleanup);
        let merged = self.merge_all(objects.iter(), root, &mut cleanup)?;
        cleanup.sweep(&self.dao)?;
        info!("Parsed {} {} objects", merged.len(), root);
        Ok(merged)
    }

    /// Like [`Parser::parse`] with `T::ENTITY` as root, viewing results as `T`.
    pub fn parse_as<T: ManagedObject>(&self, objects: &[JsonObject]) -> ParseResult<Vec<T>> {
        let merged = self.parse(objects, T::ENTITY)?;
        Ok(cast_all(merged)?)
    }

    /// Schedules [`Parser::parse`] on the context queue and returns at once.
    ///
    /// `completion` runs on the queue, inside the same unit of work, with the
    /// parse result. Fails only if the queue no longer accepts work.
    pub fn parse_async<F>(&self, objects: Vec<JsonObject>, root: &str, completion: F) -> ParseResult<()>
    where
        F: FnOnce(ParseResult<Vec<ObjectRef>>) + Send + 'static,
    {
        let parser = self.clone();
        let root = root.to_string();
        self.dao.run_on_context_queue(move || {
            let result = parser.parse(&objects, &root);
            completion(result);
        })?;
        Ok(())
    }

    // ── Merge ────────────────────────────────────────────────────

    fn merge_all<'a, I>(
        &self,
        objects: I,
        entity: &str,
        cleanup: &mut Cleanup,
    ) -> ParseResult<Vec<ObjectRef>>
    where
        I: IntoIterator<Item = &'a JsonObject>,
    {
        let mut merged = Vec::new();
        for json in objects {
            if let Some(object) = self.merge_entity(json, entity, cleanup)? {
                merged.push(object);
            }
        }
        Ok(merged)
    }

    fn merge_entity(
        &self,
        json: &JsonObject,
        entity: &str,
        cleanup: &mut Cleanup,
    ) -> ParseResult<Option<ObjectRef>> {
        if json.is_empty() {
            return Ok(None);
        }

        let keys = self.delegate.primary_keys(entity)?;
        let unique: Vec<(String, Value)> = keys
            .iter()
            .filter_map(|json_name| {
                let value = json.get(json_name)?.clone();
                Some((self.delegate.adjust_field_name(json_name, entity), value))
            })
            .collect();

        let object = match self.dao.fetch_by_unique_keys(entity, unique)? {
            Some(existing) => {
                debug!("Reusing {}", existing);
                existing
            }
            None => {
                let inserted = self.dao.insert(entity)?;
                debug!("Inserted {}", inserted);
                inserted
            }
        };
        cleanup.validate(object.id());

        let schema = self.context().schema().require(entity)?;
        let scalars = schema.scalar_names();

        let mut nested = Vec::new();
        for (json_name, value) in json {
            let field = self.delegate.adjust_field_name(json_name, entity);
            if let Some(relationship) = schema.relationship(&field) {
                nested.push((relationship, value));
            } else if scalars.contains(field.as_str()) {
                if let Some(value) = self.delegate.adjust_value(value.clone(), &field, &object) {
                    self.context().set_value(&object, &field, value)?;
                }
            }
        }

        for (relationship, value) in nested {
            self.merge_relationship(value, relationship, &object, cleanup)?;
        }
        Ok(Some(object))
    }

    fn merge_relationship(
        &self,
        value: &Value,
        relationship: &RelationshipSchema,
        parent: &ObjectRef,
        cleanup: &mut Cleanup,
    ) -> ParseResult<()> {
        match value {
            Value::Object(json) if relationship.is_to_many() => {
                self.union(std::iter::once(json), relationship, parent, cleanup)
            }
            Value::Object(json) => {
                let target = self.merge_entity(json, &relationship.destination, cleanup)?;
                self.context()
                    .set_related(parent, &relationship.name, target.as_slice())?;
                Ok(())
            }
            Value::Array(items) => {
                let objects: Vec<&JsonObject> = items.iter().filter_map(Value::as_object).collect();
                if objects.len() != items.len() {
                    return Err(ParseError::UnknownDataTypeForRelation {
                        relationship: relationship.name.clone(),
                        parent: parent.clone(),
                    });
                }
                if !relationship.is_to_many() {
                    return Err(ParseError::FailedCreateRelation {
                        relationship: relationship.name.clone(),
                        parent: parent.clone(),
                    });
                }
                self.union(objects, relationship, parent, cleanup)
            }
            _ => Err(ParseError::UnknownDataTypeForRelation {
                relationship: relationship.name.clone(),
                parent: parent.clone(),
            }),
        }
    }

    /// Merges `objects` into a to-many relationship, keeping existing members.
    fn union<'a, I>(
        &self,
        objects: I,
        relationship: &RelationshipSchema,
        parent: &ObjectRef,
        cleanup: &mut Cleanup,
    ) -> ParseResult<()>
    where
        I: IntoIterator<Item = &'a JsonObject>,
    {
        let parsed = self.merge_all(objects, &relationship.destination, cleanup)?;
        let current = self.context().related(parent, &relationship.name)?;
        if !current.is_empty() {
            cleanup.mark(self.context(), &current, &parsed, relationship, parent)?;
        }

        let members: BTreeSet<ObjectRef> = current.into_iter().chain(parsed).collect();
        let members: Vec<ObjectRef> = members.into_iter().collect();
        self.context()
            .set_related(parent, &relationship.name, &members)?;
        Ok(())
    }
}
