//! JSON to object graph merging for jsongraft.
//!
//! Given JSON object trees and a root entity, the [`Parser`] finds or creates
//! the matching objects through a [`jsongraft_dao::Dao`], assigns their
//! attributes and recurses into their relationships. Identity comes from the
//! unique keys a [`ParserDelegate`] declares per entity; field names and
//! values can be adjusted on the way in.
//!
//! Relationship members that a parse no longer mentions are handled by the
//! configured [`CleanupOption`]:
//!
//! | option | dropped member |
//! |---|---|
//! | `None` | kept |
//! | `Light` | deleted unless merged elsewhere in the same call |
//! | `Advanced` | deleted once no other parent references it |

mod cleanup;
mod config;
mod delegate;
mod error;
mod parser;

pub use cleanup::{Cleanup, CleanupOption};
pub use config::ParserConfig;
pub use delegate::{DelegateAdapter, KeyMapDelegate, ParserDelegate, SchemaDelegate};
pub use error::{ParseError, ParseResult};
pub use parser::Parser;
