//! Durable object rows in DuckDB.
//!
//! Two tables: `objects` holds one row per committed object with its
//! attributes as JSON text, `links` holds one row per (source, relationship,
//! target) edge owned by the source object. Predicates are evaluated in Rust
//! over decoded attribute maps, not in SQL.

use crate::{open_duckdb_with_wal_recovery, StorageError, StorageResult, StoredObject};
use duckdb::{params, Connection};
use jsongraft_model::{JsonObject, Predicate};
use jsongraft_types::EntityId;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Pending changes flushed by one [`EntityStore::commit`].
#[derive(Debug, Default)]
pub struct ChangeSet {
    pub upserts: Vec<StoredObject>,
    pub deletes: Vec<EntityId>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }
}

/// Backing store for committed objects.
#[derive(Clone)]
pub struct EntityStore {
    conn: Arc<Mutex<Connection>>,
}

impl EntityStore {
    /// Opens (or creates) a store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = open_duckdb_with_wal_recovery(path)?;
        Self::with_connection(conn)
    }

    /// Opens a transient in-memory store.
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS objects (
                id TEXT NOT NULL,
                entity TEXT NOT NULL,
                attributes TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS links (
                source TEXT NOT NULL,
                relationship TEXT NOT NULL,
                target TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::LockPoisoned)
    }

    /// Loads one committed object with its links.
    pub fn load(&self, id: EntityId) -> StorageResult<Option<StoredObject>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT entity, attributes FROM objects WHERE id = ?")?;
        let rows = stmt
            .query_map(params![id.to_string()], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let Some((entity, attributes)) = rows.into_iter().next() else {
            return Ok(None);
        };
        let links = load_links(&conn, id)?;
        Ok(Some(StoredObject {
            id,
            entity,
            attributes: decode_attributes(&attributes)?,
            links,
        }))
    }

    /// Loads every committed object of `entity` whose attributes match `predicate`.
    pub fn load_entity(
        &self,
        entity: &str,
        predicate: Option<&Predicate>,
    ) -> StorageResult<Vec<StoredObject>> {
        let conn = self.conn()?;
        let matched = select_matching(&conn, entity, predicate)?;
        let mut objects = Vec::with_capacity(matched.len());
        for (id, attributes) in matched {
            let links = load_links(&conn, id)?;
            objects.push(StoredObject {
                id,
                entity: entity.to_string(),
                attributes,
                links,
            });
        }
        Ok(objects)
    }

    /// Number of committed objects of `entity`.
    pub fn count(&self, entity: &str) -> StorageResult<usize> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT COUNT(*) FROM objects WHERE entity = ?")?;
        let counts = stmt
            .query_map(params![entity], |row| row.get::<_, i64>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(counts.first().copied().unwrap_or(0).max(0) as usize)
    }

    /// Writes a change set in one transaction.
    pub fn commit(&self, changes: &ChangeSet) -> StorageResult<()> {
        if changes.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        for id in &changes.deletes {
            let id = id.to_string();
            tx.execute("DELETE FROM objects WHERE id = ?", params![id])?;
            tx.execute("DELETE FROM links WHERE source = ? OR target = ?", params![id, id])?;
        }

        for object in &changes.upserts {
            let id = object.id.to_string();
            let attributes = serde_json::to_string(&object.attributes)?;
            tx.execute("DELETE FROM objects WHERE id = ?", params![id])?;
            tx.execute(
                "INSERT INTO objects (id, entity, attributes) VALUES (?, ?, ?)",
                params![id, object.entity, attributes],
            )?;
            tx.execute("DELETE FROM links WHERE source = ?", params![id])?;
            for (relationship, targets) in &object.links {
                for target in targets {
                    tx.execute(
                        "INSERT INTO links (source, relationship, target) VALUES (?, ?, ?)",
                        params![id, relationship, target.to_string()],
                    )?;
                }
            }
        }

        tx.commit()?;
        debug!(
            "Committed {} upserts and {} deletes",
            changes.upserts.len(),
            changes.deletes.len()
        );
        Ok(())
    }

    /// Deletes every committed object of `entity` matching `predicate`
    /// directly in the store, without going through any context.
    ///
    /// Returns the deleted identities so contexts can merge the change.
    pub fn delete_matching(
        &self,
        entity: &str,
        predicate: Option<&Predicate>,
    ) -> StorageResult<Vec<EntityId>> {
        let mut conn = self.conn()?;
        let ids: Vec<EntityId> = select_matching(&conn, entity, predicate)?
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        if ids.is_empty() {
            return Ok(ids);
        }

        let tx = conn.transaction()?;
        for id in &ids {
            let id = id.to_string();
            tx.execute("DELETE FROM objects WHERE id = ?", params![id])?;
            tx.execute("DELETE FROM links WHERE source = ? OR target = ?", params![id, id])?;
        }
        tx.commit()?;
        info!("Batch deleted {} {} objects from store", ids.len(), entity);
        Ok(ids)
    }
}

fn select_matching(
    conn: &Connection,
    entity: &str,
    predicate: Option<&Predicate>,
) -> StorageResult<Vec<(EntityId, JsonObject)>> {
    let mut stmt = conn.prepare("SELECT id, attributes FROM objects WHERE entity = ?")?;
    let rows = stmt
        .query_map(params![entity], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut matched = Vec::new();
    for (id, attributes) in rows {
        let attributes = decode_attributes(&attributes)?;
        if predicate.is_none_or(|p| p.matches(&attributes)) {
            matched.push((EntityId::parse(&id)?, attributes));
        }
    }
    Ok(matched)
}

fn load_links(
    conn: &Connection,
    source: EntityId,
) -> StorageResult<BTreeMap<String, BTreeSet<EntityId>>> {
    let mut stmt = conn.prepare("SELECT relationship, target FROM links WHERE source = ?")?;
    let rows = stmt
        .query_map(params![source.to_string()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut links: BTreeMap<String, BTreeSet<EntityId>> = BTreeMap::new();
    for (relationship, target) in rows {
        links
            .entry(relationship)
            .or_default()
            .insert(EntityId::parse(&target)?);
    }
    Ok(links)
}

fn decode_attributes(text: &str) -> StorageResult<JsonObject> {
    match serde_json::from_str(text)? {
        serde_json::Value::Object(map) => Ok(map),
        other => Err(StorageError::InvalidData(format!(
            "attributes column holds {other} instead of an object"
        ))),
    }
}
