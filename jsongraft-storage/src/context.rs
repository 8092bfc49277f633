//! In-memory working set over an [`EntityStore`].
//!
//! A context registers objects as they are inserted or faulted in from the
//! store, tracks which ones changed, keeps inverse relationships consistent on
//! every assignment and flushes everything in one transaction on [`Context::save`].

use crate::queue::ContextQueue;
use crate::{
    ChangeSet, ContextConfig, EntityStore, ObjectRef, StorageError, StorageResult, StoreLocation,
    StoredObject,
};
use jsongraft_model::{
    Cardinality, DeleteRule, FetchRequest, JsonObject, Predicate, RelationshipSchema,
    SchemaRegistry,
};
use jsongraft_types::EntityId;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct ManagedState {
    entity: String,
    attributes: JsonObject,
    links: BTreeMap<String, BTreeSet<EntityId>>,
}

impl From<StoredObject> for ManagedState {
    fn from(stored: StoredObject) -> Self {
        Self {
            entity: stored.entity,
            attributes: stored.attributes,
            links: stored.links,
        }
    }
}

#[derive(Default)]
struct Workspace {
    objects: HashMap<EntityId, ManagedState>,
    inserted: HashSet<EntityId>,
    updated: HashSet<EntityId>,
    /// Committed objects deleted in this context, pending save.
    deleted: HashSet<EntityId>,
}

impl Workspace {
    fn touch(&mut self, id: EntityId) {
        if !self.inserted.contains(&id) {
            self.updated.insert(id);
        }
    }

    fn link(&mut self, id: EntityId, relationship: &str, target: EntityId) {
        let changed = match self.objects.get_mut(&id) {
            Some(state) => state
                .links
                .entry(relationship.to_string())
                .or_default()
                .insert(target),
            None => false,
        };
        if changed {
            self.touch(id);
        }
    }

    fn unlink(&mut self, id: EntityId, relationship: &str, target: EntityId) {
        let changed = match self.objects.get_mut(&id) {
            Some(state) => state
                .links
                .get_mut(relationship)
                .is_some_and(|targets| targets.remove(&target)),
            None => false,
        };
        if changed {
            self.touch(id);
        }
    }

    fn entity_of(&self, id: EntityId) -> StorageResult<&str> {
        self.objects
            .get(&id)
            .map(|state| state.entity.as_str())
            .ok_or(StorageError::ObjectNotFound(id))
    }

    fn has_changes(&self) -> bool {
        !(self.inserted.is_empty() && self.updated.is_empty() && self.deleted.is_empty())
    }
}

struct ContextInner {
    name: String,
    schema: Arc<SchemaRegistry>,
    store: EntityStore,
    workspace: Mutex<Workspace>,
    queue: ContextQueue,
}

impl ContextInner {
    /// Registers `id` from the store if needed. False if it does not exist
    /// or was deleted in this context.
    fn fault(&self, ws: &mut Workspace, id: EntityId) -> StorageResult<bool> {
        if ws.objects.contains_key(&id) {
            return Ok(true);
        }
        if ws.deleted.contains(&id) {
            return Ok(false);
        }
        match self.store.load(id)? {
            Some(stored) => {
                ws.objects.insert(id, stored.into());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn require(&self, ws: &mut Workspace, id: EntityId) -> StorageResult<()> {
        if self.fault(ws, id)? {
            Ok(())
        } else {
            Err(StorageError::ObjectNotFound(id))
        }
    }

    fn relationship(&self, entity: &str, name: &str) -> StorageResult<&RelationshipSchema> {
        self.schema
            .require(entity)?
            .relationship(name)
            .ok_or_else(|| StorageError::UnknownRelationship {
                entity: entity.to_string(),
                relationship: name.to_string(),
            })
    }

    fn delete(&self, ws: &mut Workspace, id: EntityId) -> StorageResult<bool> {
        if !self.fault(ws, id)? {
            return Ok(false);
        }
        let Some(state) = ws.objects.remove(&id) else {
            return Ok(false);
        };
        let schema = self.schema.require(&state.entity)?;

        let mut cascade = Vec::new();
        for (name, targets) in &state.links {
            let Some(relationship) = schema.relationship(name) else {
                continue;
            };
            if relationship.delete_rule == DeleteRule::Cascade {
                cascade.extend(targets.iter().copied());
            }
            if let Some(inverse) = &relationship.inverse {
                for target in targets {
                    if self.fault(ws, *target)? {
                        ws.unlink(*target, inverse, id);
                    }
                }
            }
        }

        if !ws.inserted.remove(&id) {
            ws.deleted.insert(id);
        }
        ws.updated.remove(&id);
        debug!("Deleted {}({})", state.entity, id);

        for target in cascade {
            self.delete(ws, target)?;
        }
        Ok(true)
    }
}

/// A persistence context: the mutable object graph that parsing writes into.
///
/// Cloning is cheap and every clone shares the same working set and queue.
/// Mutations must be serialized by the caller, usually by running them on the
/// context queue with [`Context::perform`].
#[derive(Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

impl Context {
    /// Opens the backing store described by `config` and starts the context queue.
    pub fn new(config: &ContextConfig, schema: impl Into<Arc<SchemaRegistry>>) -> StorageResult<Self> {
        let store = match &config.store {
            StoreLocation::InMemory => EntityStore::open_in_memory()?,
            StoreLocation::Path(path) => EntityStore::open(path)?,
        };
        Self::with_store(store, schema, &config.queue_name)
    }

    /// Context over a transient in-memory store.
    pub fn in_memory(schema: impl Into<Arc<SchemaRegistry>>) -> StorageResult<Self> {
        Self::new(&ContextConfig::in_memory(), schema)
    }

    /// Context over an existing store, possibly shared with other contexts.
    pub fn with_store(
        store: EntityStore,
        schema: impl Into<Arc<SchemaRegistry>>,
        queue_name: &str,
    ) -> StorageResult<Self> {
        let queue = ContextQueue::spawn(queue_name)?;
        info!("Opened context {}", queue_name);
        Ok(Self {
            inner: Arc::new(ContextInner {
                name: queue_name.to_string(),
                schema: schema.into(),
                store,
                workspace: Mutex::new(Workspace::default()),
                queue,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn schema(&self) -> &SchemaRegistry {
        &self.inner.schema
    }

    pub fn store(&self) -> &EntityStore {
        &self.inner.store
    }

    fn workspace(&self) -> StorageResult<MutexGuard<'_, Workspace>> {
        self.inner
            .workspace
            .lock()
            .map_err(|_| StorageError::LockPoisoned)
    }

    // ── Queue ────────────────────────────────────────────────────

    /// Schedules `work` on the context queue and returns immediately.
    pub fn perform<F>(&self, work: F) -> StorageResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.queue.submit(Box::new(work))
    }

    /// Runs `work` on the context queue and blocks until it returns.
    ///
    /// Runs inline when already on the queue. Must not be called from inside
    /// an async runtime; use [`Context::perform`] with a channel there.
    pub fn perform_and_wait<F, T>(&self, work: F) -> StorageResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        if self.is_on_queue() {
            return Ok(work());
        }
        let (sender, receiver) = tokio::sync::oneshot::channel();
        self.perform(move || {
            let _ = sender.send(work());
        })?;
        receiver
            .blocking_recv()
            .map_err(|_| StorageError::QueueClosed)
    }

    /// True when the caller is running on this context's queue.
    pub fn is_on_queue(&self) -> bool {
        self.inner.queue.is_current()
    }

    // ── Objects ──────────────────────────────────────────────────

    /// Creates a new, uncommitted object of `entity`.
    pub fn insert(&self, entity: &str) -> StorageResult<ObjectRef> {
        self.inner.schema.require(entity)?;
        let id = EntityId::new();
        let mut ws = self.workspace()?;
        ws.objects.insert(
            id,
            ManagedState {
                entity: entity.to_string(),
                attributes: JsonObject::new(),
                links: BTreeMap::new(),
            },
        );
        ws.inserted.insert(id);
        debug!("Inserted {}({})", entity, id);
        Ok(ObjectRef::new(id, entity))
    }

    /// Resolves an identity token, faulting the object in from the store.
    pub fn object(&self, id: EntityId) -> StorageResult<Option<ObjectRef>> {
        let mut ws = self.workspace()?;
        if !self.inner.fault(&mut ws, id)? {
            return Ok(None);
        }
        Ok(Some(ObjectRef::new(id, ws.entity_of(id)?)))
    }

    /// True if `id` is registered or committed and not deleted.
    pub fn contains(&self, id: EntityId) -> StorageResult<bool> {
        let mut ws = self.workspace()?;
        self.inner.fault(&mut ws, id)
    }

    /// True if `id` was deleted in this context and not yet saved.
    pub fn is_deleted(&self, id: EntityId) -> StorageResult<bool> {
        Ok(self.workspace()?.deleted.contains(&id))
    }

    /// Runs a fetch over committed objects overlaid with pending changes.
    pub fn fetch(&self, request: &FetchRequest) -> StorageResult<Vec<ObjectRef>> {
        self.inner.schema.require(&request.entity)?;
        let mut ws = self.workspace()?;

        let committed = self
            .inner
            .store
            .load_entity(&request.entity, request.predicate.as_ref())?;
        for stored in committed {
            if ws.objects.contains_key(&stored.id) || ws.deleted.contains(&stored.id) {
                continue;
            }
            ws.objects.insert(stored.id, stored.into());
        }

        let mut matched: Vec<(&EntityId, &ManagedState)> = ws
            .objects
            .iter()
            .filter(|(_, state)| state.entity == request.entity && request.matches(&state.attributes))
            .collect();
        matched.sort_by(|(a_id, a), (b_id, b)| {
            request
                .compare(&a.attributes, &b.attributes)
                .then_with(|| a_id.cmp(b_id))
        });

        let results: Vec<ObjectRef> = matched
            .into_iter()
            .take(request.limit.unwrap_or(usize::MAX))
            .map(|(id, state)| ObjectRef::new(*id, state.entity.as_str()))
            .collect();
        debug!("Fetched {} {} objects", results.len(), request.entity);
        Ok(results)
    }

    pub fn count(&self, request: &FetchRequest) -> StorageResult<usize> {
        Ok(self.fetch(request)?.len())
    }

    // ── Attributes ───────────────────────────────────────────────

    /// Snapshot of an object's attributes.
    pub fn attributes(&self, object: &ObjectRef) -> StorageResult<JsonObject> {
        let mut ws = self.workspace()?;
        self.inner.require(&mut ws, object.id())?;
        Ok(ws
            .objects
            .get(&object.id())
            .map(|state| state.attributes.clone())
            .unwrap_or_default())
    }

    pub fn value(&self, object: &ObjectRef, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.attributes(object)?.remove(key))
    }

    /// Assigns an attribute, coercing to the declared type. `null` clears it.
    pub fn set_value(&self, object: &ObjectRef, key: &str, value: Value) -> StorageResult<()> {
        let id = object.id();
        let mut ws = self.workspace()?;
        self.inner.require(&mut ws, id)?;
        let entity = ws.entity_of(id)?.to_string();

        let attribute = self
            .inner
            .schema
            .require(&entity)?
            .attribute(key)
            .ok_or_else(|| StorageError::UnknownAttribute {
                entity: entity.clone(),
                attribute: key.to_string(),
            })?;
        let Some(coerced) = attribute.attribute_type.coerce(value.clone()) else {
            return Err(StorageError::InvalidValue {
                entity,
                attribute: key.to_string(),
                expected: attribute.attribute_type,
                value,
            });
        };

        if let Some(state) = ws.objects.get_mut(&id) {
            if coerced.is_null() {
                state.attributes.remove(key);
            } else {
                state.attributes.insert(key.to_string(), coerced);
            }
        }
        ws.touch(id);
        Ok(())
    }

    // ── Relationships ────────────────────────────────────────────

    /// Objects currently related to `object` through `relationship`.
    pub fn related(&self, object: &ObjectRef, relationship: &str) -> StorageResult<Vec<ObjectRef>> {
        let id = object.id();
        let mut ws = self.workspace()?;
        self.inner.require(&mut ws, id)?;
        let entity = ws.entity_of(id)?.to_string();
        self.inner.relationship(&entity, relationship)?;

        let targets: Vec<EntityId> = ws
            .objects
            .get(&id)
            .and_then(|state| state.links.get(relationship))
            .map(|targets| targets.iter().copied().collect())
            .unwrap_or_default();

        let mut related = Vec::with_capacity(targets.len());
        for target in targets {
            if self.inner.fault(&mut ws, target)? {
                related.push(ObjectRef::new(target, ws.entity_of(target)?));
            } else {
                warn!("Dangling {}.{} reference to {}", entity, relationship, target);
            }
        }
        Ok(related)
    }

    /// The single object behind a to-one relationship.
    pub fn related_one(
        &self,
        object: &ObjectRef,
        relationship: &str,
    ) -> StorageResult<Option<ObjectRef>> {
        Ok(self.related(object, relationship)?.into_iter().next())
    }

    /// Replaces the members of `relationship`, keeping inverses consistent.
    pub fn set_related(
        &self,
        object: &ObjectRef,
        relationship: &str,
        targets: &[ObjectRef],
    ) -> StorageResult<()> {
        let owner = object.id();
        let mut ws = self.workspace()?;
        self.inner.require(&mut ws, owner)?;
        let entity = ws.entity_of(owner)?.to_string();
        let schema = self.inner.relationship(&entity, relationship)?;

        let new: BTreeSet<EntityId> = targets.iter().map(ObjectRef::id).collect();
        if schema.cardinality == Cardinality::ToOne && new.len() > 1 {
            return Err(StorageError::Cardinality {
                entity,
                relationship: relationship.to_string(),
                count: new.len(),
            });
        }
        for target in &new {
            self.inner.require(&mut ws, *target)?;
            let actual = ws.entity_of(*target)?;
            if actual != schema.destination {
                return Err(StorageError::DestinationMismatch {
                    relationship: relationship.to_string(),
                    expected: schema.destination.clone(),
                    actual: actual.to_string(),
                });
            }
        }

        let old = ws
            .objects
            .get_mut(&owner)
            .and_then(|state| state.links.insert(relationship.to_string(), new.clone()))
            .unwrap_or_default();
        ws.touch(owner);

        let Some(inverse) = &schema.inverse else {
            return Ok(());
        };
        let inverse_schema = self.inner.relationship(&schema.destination, inverse)?;

        for removed in old.difference(&new) {
            if self.inner.fault(&mut ws, *removed)? {
                ws.unlink(*removed, inverse, owner);
            }
        }
        for added in new.difference(&old) {
            if inverse_schema.cardinality == Cardinality::ToOne {
                let previous: Vec<EntityId> = ws
                    .objects
                    .get(added)
                    .and_then(|state| state.links.get(inverse))
                    .map(|owners| owners.iter().copied().filter(|p| *p != owner).collect())
                    .unwrap_or_default();
                for prior in previous {
                    if self.inner.fault(&mut ws, prior)? {
                        ws.unlink(prior, relationship, *added);
                    }
                    ws.unlink(*added, inverse, prior);
                }
            }
            ws.link(*added, inverse, owner);
        }
        Ok(())
    }

    // ── Deletion ─────────────────────────────────────────────────

    /// Marks an object deleted, applying its relationships' delete rules.
    /// Returns false if the object does not exist.
    pub fn delete(&self, object: &ObjectRef) -> StorageResult<bool> {
        self.delete_by_id(object.id())
    }

    /// Like [`Context::delete`]; the object need not be loaded yet.
    pub fn delete_by_id(&self, id: EntityId) -> StorageResult<bool> {
        let mut ws = self.workspace()?;
        self.inner.delete(&mut ws, id)
    }

    /// Deletes matching committed objects directly in the backing store.
    ///
    /// The working set is not touched; follow with [`Context::merge_deleted`].
    pub fn execute_batch_delete(
        &self,
        entity: &str,
        predicate: Option<&Predicate>,
    ) -> StorageResult<Vec<EntityId>> {
        self.inner.schema.require(entity)?;
        self.inner.store.delete_matching(entity, predicate)
    }

    /// Forgets objects deleted behind this context's back and strips them from
    /// every loaded relationship.
    pub fn merge_deleted(&self, ids: &[EntityId]) -> StorageResult<()> {
        let gone: HashSet<EntityId> = ids.iter().copied().collect();
        let mut ws = self.workspace()?;
        for id in &gone {
            ws.objects.remove(id);
            ws.inserted.remove(id);
            ws.updated.remove(id);
            ws.deleted.remove(id);
        }
        for state in ws.objects.values_mut() {
            for targets in state.links.values_mut() {
                targets.retain(|target| !gone.contains(target));
            }
        }
        info!("Merged {} external deletions into context {}", gone.len(), self.inner.name);
        Ok(())
    }

    // ── Save points ──────────────────────────────────────────────

    pub fn has_changes(&self) -> StorageResult<bool> {
        Ok(self.workspace()?.has_changes())
    }

    /// Flushes inserted, updated and deleted objects in one store transaction.
    pub fn save(&self) -> StorageResult<()> {
        let mut ws = self.workspace()?;
        if !ws.has_changes() {
            return Ok(());
        }

        let deleted = &ws.deleted;
        let upserts: Vec<StoredObject> = ws
            .inserted
            .iter()
            .chain(ws.updated.iter())
            .filter_map(|id| {
                let state = ws.objects.get(id)?;
                let links = state
                    .links
                    .iter()
                    .map(|(name, targets)| {
                        let live: BTreeSet<EntityId> = targets
                            .iter()
                            .copied()
                            .filter(|target| !deleted.contains(target))
                            .collect();
                        (name.clone(), live)
                    })
                    .filter(|(_, targets)| !targets.is_empty())
                    .collect();
                Some(StoredObject {
                    id: *id,
                    entity: state.entity.clone(),
                    attributes: state.attributes.clone(),
                    links,
                })
            })
            .collect();
        let changes = ChangeSet {
            upserts,
            deletes: deleted.iter().copied().collect(),
        };

        self.inner.store.commit(&changes)?;
        info!(
            "Saved context {}: {} upserts, {} deletes",
            self.inner.name,
            changes.upserts.len(),
            changes.deletes.len()
        );
        ws.inserted.clear();
        ws.updated.clear();
        ws.deleted.clear();
        Ok(())
    }

    /// Discards every pending change; objects fault in again from the store.
    pub fn rollback(&self) -> StorageResult<()> {
        let mut ws = self.workspace()?;
        *ws = Workspace::default();
        debug!("Rolled back context {}", self.inner.name);
        Ok(())
    }
}
