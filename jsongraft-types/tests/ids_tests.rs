use jsongraft_types::{EntityId, Error};
use proptest::prelude::*;
use std::collections::HashSet;
use std::str::FromStr;

// ── EntityId ──────────────────────────────────────────────────────

#[test]
fn entity_id_new_is_unique() {
    let a = EntityId::new();
    let b = EntityId::new();
    assert_ne!(a, b);
}

#[test]
fn entity_id_from_uuid_roundtrip() {
    let uuid = uuid::Uuid::now_v7();
    let id = EntityId::from_uuid(uuid);
    assert_eq!(id.as_uuid(), uuid);
}

#[test]
fn entity_id_display_and_parse() {
    let id = EntityId::new();
    let parsed = EntityId::parse(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn entity_id_from_str() {
    let id = EntityId::new();
    let parsed = EntityId::from_str(&id.to_string()).unwrap();
    assert_eq!(id, parsed);
}

#[test]
fn entity_id_parse_invalid() {
    let err = EntityId::parse("not-a-uuid").unwrap_err();
    assert!(matches!(err, Error::InvalidUuid(_)));
}

#[test]
fn entity_ids_are_time_ordered() {
    let first = EntityId::new();
    let second = EntityId::new();
    assert!(first < second);
}

#[test]
fn entity_id_hashes_by_value() {
    let id = EntityId::new();
    let copy = id;
    let mut set = HashSet::new();
    set.insert(id);
    assert!(set.contains(&copy));
    assert!(!set.insert(copy));
}

#[test]
fn entity_id_serializes_transparently() {
    let id = EntityId::new();
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, format!("\"{id}\""));
    let back: EntityId = serde_json::from_str(&json).unwrap();
    assert_eq!(back, id);
}

proptest! {
    #[test]
    fn parse_accepts_any_uuid(bits in any::<u128>()) {
        let uuid = uuid::Uuid::from_u128(bits);
        let id = EntityId::parse(&uuid.to_string()).unwrap();
        prop_assert_eq!(id.as_uuid(), uuid);
    }
}
