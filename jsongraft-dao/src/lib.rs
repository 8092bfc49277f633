//! Data access operations for jsongraft.
//!
//! [`Dao`] wraps a persistence [`jsongraft_storage::Context`] with the
//! operations the parser needs: predicate and unique-key fetches, inserts,
//! single and set-based deletes, and scheduling on the context queue.
//! [`ManagedObject`] lets generated wrappers use the typed variants.

mod dao;
mod error;

pub use dao::{cast_all, Dao, ManagedObject};
pub use error::{DaoError, DaoResult};
