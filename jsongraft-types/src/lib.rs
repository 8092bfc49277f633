//! Core type definitions for jsongraft.
//!
//! This crate defines the types every other jsongraft crate agrees on:
//! - [`EntityId`], the stable identity token of a managed object (UUID v7)
//! - the crate-level [`Error`] for parsing identity tokens
//!
//! Schema descriptions live in `jsongraft-model`; the persistence context that
//! hands out identity tokens lives in `jsongraft-storage`.

mod ids;

pub use ids::EntityId;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),
}
