//! Shared fixtures for parser tests.

#![allow(dead_code)]

use jsongraft_dao::Dao;
use jsongraft_model::{
    AttributeSchema, EntitySchema, JsonObject, RelationshipSchema, SchemaRegistry,
};
use jsongraft_parser::{CleanupOption, KeyMapDelegate, Parser, ParserConfig, ParserDelegate};
use jsongraft_storage::{Context, ObjectRef};
use serde_json::Value;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// User/Profile (one-to-many) and Post/Tag (many-to-many).
pub fn registry() -> SchemaRegistry {
    let user = EntitySchema::new("User")
        .with_attribute(AttributeSchema::integer("id"))
        .with_attribute(AttributeSchema::string("name"))
        .with_attribute(AttributeSchema::string("email"))
        .with_relationship(RelationshipSchema::to_many("profileSet", "Profile").with_inverse("user"))
        .with_unique_keys(["id"]);
    let profile = EntitySchema::new("Profile")
        .with_attribute(AttributeSchema::integer("id"))
        .with_attribute(AttributeSchema::string("name"))
        .with_attribute(AttributeSchema::string("type"))
        .with_relationship(RelationshipSchema::to_one("user", "User").with_inverse("profileSet"))
        .with_unique_keys(["id"]);
    let post = EntitySchema::new("Post")
        .with_attribute(AttributeSchema::integer("id"))
        .with_attribute(AttributeSchema::string("title"))
        .with_relationship(RelationshipSchema::to_many("tags", "Tag").with_inverse("posts"))
        .with_unique_keys(["id"]);
    let tag = EntitySchema::new("Tag")
        .with_attribute(AttributeSchema::integer("id"))
        .with_attribute(AttributeSchema::string("label"))
        .with_relationship(RelationshipSchema::to_many("posts", "Post").with_inverse("tags"))
        .with_unique_keys(["id"]);
    match SchemaRegistry::with_entities([user, profile, post, tag]) {
        Ok(registry) => registry,
        Err(err) => panic!("fixture model is invalid: {err}"),
    }
}

pub fn delegate() -> KeyMapDelegate {
    KeyMapDelegate::new()
        .with_keys("User", ["id"])
        .with_keys("Profile", ["id"])
        .with_keys("Post", ["id"])
        .with_keys("Tag", ["id"])
}

pub fn dao() -> Dao {
    init_tracing();
    Dao::new(Context::in_memory(registry()).unwrap())
}

pub fn parser(cleanup: CleanupOption) -> Parser {
    parser_with(dao(), Arc::new(delegate()), cleanup)
}

pub fn parser_with(dao: Dao, delegate: Arc<dyn ParserDelegate>, cleanup: CleanupOption) -> Parser {
    Parser::new(dao, Some(delegate)).with_config(ParserConfig::with_cleanup(cleanup))
}

/// Splits a JSON array literal into objects.
pub fn objects(value: Value) -> Vec<JsonObject> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => map,
                other => panic!("expected object, got {other}"),
            })
            .collect(),
        Value::Object(map) => vec![map],
        other => panic!("expected array or object, got {other}"),
    }
}

/// Sorted `id` attributes of `objects`.
pub fn ids(parser: &Parser, objects: &[ObjectRef]) -> Vec<i64> {
    let context = parser.dao().context();
    let mut ids: Vec<i64> = objects
        .iter()
        .filter_map(|o| context.value(o, "id").unwrap())
        .filter_map(|v| v.as_i64())
        .collect();
    ids.sort();
    ids
}

/// Sorted `id`s of the members of `relationship` on `object`.
pub fn related_ids(parser: &Parser, object: &ObjectRef, relationship: &str) -> Vec<i64> {
    let related = parser.dao().context().related(object, relationship).unwrap();
    ids(parser, &related)
}

/// Sorted `id`s of every live object of `entity`.
pub fn all_ids(parser: &Parser, entity: &str) -> Vec<i64> {
    let all = parser.dao().fetch_all(entity, None, &[], None, None).unwrap();
    ids(parser, &all)
}
