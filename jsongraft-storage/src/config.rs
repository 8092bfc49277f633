use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the backing store keeps committed objects.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreLocation {
    /// Transient DuckDB database, gone when the context is dropped.
    #[default]
    InMemory,
    /// DuckDB database file.
    Path(PathBuf),
}

/// Configuration for a persistence [`crate::Context`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default)]
    pub store: StoreLocation,
    /// Name of the context queue's worker thread.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
}

fn default_queue_name() -> String {
    "jsongraft-context".to_string()
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            store: StoreLocation::InMemory,
            queue_name: default_queue_name(),
        }
    }
}

impl ContextConfig {
    /// In-memory store with the default queue name.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// File-backed store with the default queue name.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            store: StoreLocation::Path(path.into()),
            ..Self::default()
        }
    }
}
