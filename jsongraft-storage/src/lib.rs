//! DuckDB persistence layer for jsongraft.
//!
//! Provides the object graph the parser writes into:
//! - [`EntityStore`] keeps committed objects and their relationship edges in DuckDB
//! - [`Context`] is the in-memory working set with change tracking, inverse
//!   maintenance, delete rules and a serial execution queue
//!
//! # Architecture
//!
//! - Attributes are stored as JSON text and filtered in Rust with [`jsongraft_model::Predicate`]
//! - Relationship edges are owned by their source object and rewritten on every save
//! - Store-level batch deletes bypass contexts; contexts catch up through
//!   [`Context::merge_deleted`]

mod config;
mod context;
mod error;
mod object;
mod queue;
mod store;

pub use config::{ContextConfig, StoreLocation};
pub use context::Context;
pub use error::{StorageError, StorageResult};
pub use object::{ObjectRef, StoredObject};
pub use store::{ChangeSet, EntityStore};

use tracing::warn;

/// Open a DuckDB connection with stale WAL recovery.
///
/// If the initial open fails and a `.wal` file exists alongside the database,
/// it is removed and the open is retried once.
pub fn open_duckdb_with_wal_recovery(path: &std::path::Path) -> StorageResult<duckdb::Connection> {
    match duckdb::Connection::open(path) {
        Ok(conn) => Ok(conn),
        Err(first_err) => {
            let wal_path = path.with_extension(
                path.extension()
                    .map(|ext| format!("{}.wal", ext.to_string_lossy()))
                    .unwrap_or_else(|| "wal".to_string()),
            );
            if wal_path.exists() {
                warn!(
                    "DuckDB open failed, removing stale WAL and retrying: {}",
                    wal_path.display()
                );
                if std::fs::remove_file(&wal_path).is_ok() {
                    return duckdb::Connection::open(path).map_err(Into::into);
                }
            }
            Err(first_err.into())
        }
    }
}
