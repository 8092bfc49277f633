use crate::{DaoError, DaoResult};
use jsongraft_model::{FetchRequest, Predicate, SortDescriptor, UniqueKeys};
use jsongraft_storage::{Context, ObjectRef};
use jsongraft_types::EntityId;
use serde_json::Value;
use tracing::{debug, info};

/// A typed view over objects of one entity.
///
/// Implemented by generated model wrappers. `from_object` returns `None` when
/// the object cannot be viewed as `Self`.
pub trait ManagedObject: Sized {
    /// Entity name this view is registered for.
    const ENTITY: &'static str;

    fn from_object(object: ObjectRef) -> Option<Self>;

    fn object(&self) -> &ObjectRef;
}

/// Views every object as `T`, or fails with [`DaoError::CastFailure`]
/// carrying the untyped results.
pub fn cast_all<T: ManagedObject>(objects: Vec<ObjectRef>) -> DaoResult<Vec<T>> {
    let viewed: Option<Vec<T>> = objects.iter().cloned().map(T::from_object).collect();
    viewed.ok_or_else(|| DaoError::CastFailure {
        requested: T::ENTITY.to_string(),
        actual: objects,
    })
}

/// Data access over one persistence [`Context`].
///
/// Operations run directly against the context; callers serialize them on the
/// context queue ([`Dao::run_on_context_queue`]) or own the context exclusively.
#[derive(Clone)]
pub struct Dao {
    context: Context,
}

impl Dao {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    // ── Fetching ─────────────────────────────────────────────────

    /// First object of `entity` matching `predicate` in `sort` order.
    pub fn fetch_one(
        &self,
        entity: &str,
        predicate: Option<Predicate>,
        sort: &[SortDescriptor],
    ) -> DaoResult<Option<ObjectRef>> {
        Ok(self
            .fetch_all(entity, predicate, sort, None, Some(1))?
            .into_iter()
            .next())
    }

    /// Every object of `entity` matching `predicate`; no predicate matches all.
    pub fn fetch_all(
        &self,
        entity: &str,
        predicate: Option<Predicate>,
        sort: &[SortDescriptor],
        batch_size: Option<usize>,
        limit: Option<usize>,
    ) -> DaoResult<Vec<ObjectRef>> {
        let request = FetchRequest::new(entity)
            .with_predicate(predicate)
            .with_sort(sort.to_vec())
            .with_batch_size(batch_size)
            .with_limit(limit);
        let objects = self.context.fetch(&request)?;
        if objects.iter().any(|o| o.entity() != entity) {
            return Err(DaoError::CastFailure {
                requested: entity.to_string(),
                actual: objects,
            });
        }
        Ok(objects)
    }

    /// The object of `entity` identified by `keys`.
    ///
    /// Fails with [`DaoError::MissingUniqueKeys`] before touching the context
    /// when `keys` is empty.
    pub fn fetch_by_unique_keys<I, K>(&self, entity: &str, keys: I) -> DaoResult<Option<ObjectRef>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let predicate = unique_key_predicate(entity, keys)?;
        self.fetch_one(entity, Some(predicate), &[])
    }

    /// Every object of `entity` carrying `keys`.
    pub fn fetch_all_by_unique_keys<I, K>(&self, entity: &str, keys: I) -> DaoResult<Vec<ObjectRef>>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let predicate = unique_key_predicate(entity, keys)?;
        self.fetch_all(entity, Some(predicate), &[], None, None)
    }

    // ── Typed views ──────────────────────────────────────────────

    pub fn fetch_all_as<T: ManagedObject>(
        &self,
        predicate: Option<Predicate>,
        sort: &[SortDescriptor],
        batch_size: Option<usize>,
        limit: Option<usize>,
    ) -> DaoResult<Vec<T>> {
        cast_all(self.fetch_all(T::ENTITY, predicate, sort, batch_size, limit)?)
    }

    pub fn fetch_one_as<T: ManagedObject>(
        &self,
        predicate: Option<Predicate>,
        sort: &[SortDescriptor],
    ) -> DaoResult<Option<T>> {
        Ok(self
            .fetch_all_as(predicate, sort, None, Some(1))?
            .into_iter()
            .next())
    }

    /// Inserts an object of `T::ENTITY` and views it as `T`.
    pub fn insert_as<T: ManagedObject>(&self) -> DaoResult<T> {
        let object = self.insert(T::ENTITY)?;
        let actual = object.entity().to_string();
        T::from_object(object).ok_or_else(|| DaoError::TypeMismatch {
            requested: T::ENTITY.to_string(),
            actual,
        })
    }

    // ── Mutation ─────────────────────────────────────────────────

    /// Creates a new, uncommitted object.
    pub fn insert(&self, entity: &str) -> DaoResult<ObjectRef> {
        Ok(self.context.insert(entity)?)
    }

    pub fn delete(&self, object: &ObjectRef) -> DaoResult<bool> {
        Ok(self.context.delete(object)?)
    }

    /// Marks the object behind `id` for removal; it need not be loaded.
    /// Returns false if no such object exists.
    pub fn delete_by_identity(&self, id: EntityId) -> DaoResult<bool> {
        Ok(self.context.delete_by_id(id)?)
    }

    /// Deletes every object of `entity` matching `predicate` (all when `None`).
    ///
    /// With `use_store_level_batch` the delete runs against the backing store
    /// and only sees committed objects; the deleted identities are then merged
    /// into the context. Otherwise each match is deleted through the context.
    /// Returns the number of objects deleted.
    pub fn delete_all(
        &self,
        entity: &str,
        predicate: Option<Predicate>,
        use_store_level_batch: bool,
    ) -> DaoResult<usize> {
        if use_store_level_batch {
            let deleted = self
                .context
                .execute_batch_delete(entity, predicate.as_ref())?;
            if !deleted.is_empty() {
                self.context.merge_deleted(&deleted)?;
            }
            info!("Store-level delete of {} {} objects", deleted.len(), entity);
            return Ok(deleted.len());
        }

        let objects = self.fetch_all(entity, predicate, &[], None, None)?;
        let mut deleted = 0;
        for object in &objects {
            if self.context.delete(object)? {
                deleted += 1;
            }
        }
        debug!("Deleted {} {} objects through context", deleted, entity);
        Ok(deleted)
    }

    // ── Queue ────────────────────────────────────────────────────

    /// Schedules `work` on the context queue and returns immediately.
    pub fn run_on_context_queue<F>(&self, work: F) -> DaoResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        Ok(self.context.perform(work)?)
    }

    /// Runs `work` on the context queue and waits for its result.
    pub fn perform_and_wait<F, T>(&self, work: F) -> DaoResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        Ok(self.context.perform_and_wait(work)?)
    }
}

fn unique_key_predicate<I, K>(entity: &str, keys: I) -> DaoResult<Predicate>
where
    I: IntoIterator<Item = (K, Value)>,
    K: Into<String>,
{
    let keys = UniqueKeys::new(keys).ok_or_else(|| DaoError::MissingUniqueKeys {
        entity: entity.to_string(),
    })?;
    Ok(Predicate::from_unique_keys(&keys))
}
