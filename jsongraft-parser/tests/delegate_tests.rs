mod common;

use common::{all_ids, dao, objects, parser_with, registry};
use jsongraft_model::{AttributeSchema, EntitySchema, SchemaRegistry};
use jsongraft_parser::{
    CleanupOption, DelegateAdapter, KeyMapDelegate, ParseError, ParserConfig, ParserDelegate,
    SchemaDelegate,
};
use jsongraft_storage::{ObjectRef, StorageError};
use jsongraft_types::EntityId;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;

fn keys(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(|n| n.to_string()).collect()
}

// ── Adapter ──────────────────────────────────────────────────────

#[test]
fn adapter_without_delegate() {
    let adapter = DelegateAdapter::default();
    assert!(!adapter.is_configured());
    assert!(matches!(
        adapter.primary_keys("User"),
        Err(ParseError::MissingDelegate)
    ));
    assert_eq!(adapter.adjust_field_name("name", "User"), "name");

    let object = ObjectRef::new(EntityId::new(), "User");
    assert_eq!(
        adapter.adjust_value(json!(1), "id", &object),
        Some(json!(1))
    );
}

#[test]
fn adapter_rejects_empty_keys() {
    let adapter = DelegateAdapter::new(Some(Arc::new(KeyMapDelegate::new())));
    assert!(adapter.is_configured());
    let err = adapter.primary_keys("User").unwrap_err();
    assert!(matches!(err, ParseError::MissingUniqueIds { entity } if entity == "User"));
}

#[test]
fn trait_defaults_are_identity() {
    struct KeysOnly;
    impl ParserDelegate for KeysOnly {
        fn primary_keys(&self, _entity: &str) -> BTreeSet<String> {
            keys(&["id"])
        }
    }

    let adapter = DelegateAdapter::new(Some(Arc::new(KeysOnly)));
    let object = ObjectRef::new(EntityId::new(), "User");
    assert_eq!(adapter.primary_keys("User").unwrap(), keys(&["id"]));
    assert_eq!(adapter.adjust_field_name("user_name", "User"), "user_name");
    assert_eq!(
        adapter.adjust_value(json!("x"), "name", &object),
        Some(json!("x"))
    );
}

// ── Key map ──────────────────────────────────────────────────────

#[test]
fn key_map_renames_are_per_entity() {
    let delegate = KeyMapDelegate::new()
        .with_keys("User", ["id", "email"])
        .with_rename("User", "mail", "email");

    assert_eq!(delegate.primary_keys("User"), keys(&["email", "id"]));
    assert!(delegate.primary_keys("Profile").is_empty());
    assert_eq!(delegate.adjust_field_name("mail", "User"), "email");
    assert_eq!(delegate.adjust_field_name("mail", "Profile"), "mail");
}

#[test]
fn composite_keys_identify_objects() {
    let delegate = KeyMapDelegate::new().with_keys("Profile", ["id", "type"]);
    let parser = parser_with(dao(), Arc::new(delegate), CleanupOption::None);

    parser
        .parse(
            &objects(json!([{"id": 1, "type": "admin"}, {"id": 1, "type": "guest"}])),
            "Profile",
        )
        .unwrap();
    parser
        .parse(&objects(json!([{"id": 1, "type": "admin", "name": "again"}])), "Profile")
        .unwrap();

    assert_eq!(all_ids(&parser, "Profile"), vec![1, 1]);
}

// ── Schema delegate ──────────────────────────────────────────────

#[test]
fn schema_delegate_uses_unique_constraints() {
    let delegate = SchemaDelegate::new(&registry());
    assert_eq!(delegate.primary_keys("User"), keys(&["id"]));
    assert_eq!(delegate.primary_keys("Tag"), keys(&["id"]));
}

#[test]
fn schema_delegate_reports_renamed_keys_by_json_name() {
    let delegate = SchemaDelegate::new(&registry()).with_rename("User", "user_id", "id");
    assert_eq!(delegate.primary_keys("User"), keys(&["user_id"]));
    assert_eq!(delegate.adjust_field_name("user_id", "User"), "id");
}

#[test]
fn schema_delegate_entity_without_constraint() {
    let registry = SchemaRegistry::with_entities([
        EntitySchema::new("Note").with_attribute(AttributeSchema::string("body"))
    ])
    .unwrap();
    let delegate = SchemaDelegate::new(&registry);
    assert!(delegate.primary_keys("Note").is_empty());
}

#[test]
fn parse_with_schema_delegate() {
    let parser = parser_with(
        dao(),
        Arc::new(SchemaDelegate::new(&registry())),
        CleanupOption::None,
    );
    let payload = objects(json!([{"id": 1, "profileSet": [{"id": 2}]}]));
    let first = parser.parse(&payload, "User").unwrap();
    let second = parser.parse(&payload, "User").unwrap();
    assert_eq!(first, second);
    assert_eq!(all_ids(&parser, "Profile"), vec![2]);
}

// ── Config ───────────────────────────────────────────────────────

#[test]
fn parser_config_from_json() {
    let config: ParserConfig = serde_json::from_str(r#"{"cleanup": "light"}"#).unwrap();
    assert_eq!(config, ParserConfig::with_cleanup(CleanupOption::Light));

    let config: ParserConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, ParserConfig::default());
    assert_eq!(config.cleanup, CleanupOption::None);
}

#[test]
fn storage_errors_surface_through_parse() {
    let parser = parser_with(
        dao(),
        Arc::new(SchemaDelegate::new(&registry())),
        CleanupOption::None,
    );
    let err = parser
        .parse(&objects(json!([{"id": "not a number"}])), "User")
        .unwrap_err();
    assert!(matches!(
        err,
        ParseError::Storage(StorageError::InvalidValue { .. })
    ));
}
