mod common;

use common::{all_ids, dao, delegate, ids, objects, parser, parser_with, related_ids};
use jsongraft_dao::{DaoError, ManagedObject};
use jsongraft_parser::{CleanupOption, ParseError, Parser, ParserDelegate};
use jsongraft_storage::ObjectRef;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;

fn user_payload(profiles: &[i64]) -> Value {
    let profiles: Vec<Value> = profiles
        .iter()
        .map(|id| json!({"id": id, "name": format!("profile {id}")}))
        .collect();
    json!([{"id": 1, "name": "Ann", "profileSet": profiles}])
}

// ── Merge ────────────────────────────────────────────────────────

#[test]
fn parse_creates_objects_with_scalars() {
    let parser = parser(CleanupOption::None);
    let users = parser
        .parse(&objects(json!([{"id": 1, "name": "Ann", "email": "ann@example.com"}])), "User")
        .unwrap();

    assert_eq!(users.len(), 1);
    let context = parser.dao().context();
    assert_eq!(context.value(&users[0], "name").unwrap(), Some(json!("Ann")));
    assert_eq!(
        context.value(&users[0], "email").unwrap(),
        Some(json!("ann@example.com"))
    );
}

#[test]
fn parse_is_idempotent_on_identity() {
    let parser = parser(CleanupOption::None);
    let payload = objects(json!([{"id": 1, "name": "Ann"}]));

    let first = parser.parse(&payload, "User").unwrap();
    parser.dao().context().save().unwrap();
    let second = parser.parse(&payload, "User").unwrap();

    assert_eq!(first[0].id(), second[0].id());
    assert_eq!(all_ids(&parser, "User"), vec![1]);
}

#[test]
fn reparse_updates_scalars_in_place() {
    let parser = parser(CleanupOption::None);
    parser
        .parse(&objects(json!([{"id": 1, "name": "Ann"}])), "User")
        .unwrap();
    let users = parser
        .parse(&objects(json!([{"id": 1, "name": "Anne"}])), "User")
        .unwrap();

    assert_eq!(
        parser.dao().context().value(&users[0], "name").unwrap(),
        Some(json!("Anne"))
    );
}

#[test]
fn unknown_fields_are_ignored() {
    let parser = parser(CleanupOption::None);
    let users = parser
        .parse(&objects(json!([{"id": 1, "nickname": "A"}])), "User")
        .unwrap();
    assert_eq!(parser.dao().context().value(&users[0], "nickname").unwrap(), None);
}

#[test]
fn nested_to_many_links_both_sides() {
    let parser = parser(CleanupOption::None);
    let users = parser.parse(&objects(user_payload(&[1, 2])), "User").unwrap();

    assert_eq!(related_ids(&parser, &users[0], "profileSet"), vec![1, 2]);
    let profiles = parser.dao().fetch_all("Profile", None, &[], None, None).unwrap();
    for profile in &profiles {
        assert_eq!(
            parser.dao().context().related_one(profile, "user").unwrap(),
            Some(users[0].clone())
        );
    }
}

#[test]
fn nested_to_one_object() {
    let parser = parser(CleanupOption::None);
    let profiles = parser
        .parse(
            &objects(json!([{"id": 7, "type": "admin", "user": {"id": 1, "name": "Ann"}}])),
            "Profile",
        )
        .unwrap();

    let user = parser
        .dao()
        .context()
        .related_one(&profiles[0], "user")
        .unwrap()
        .unwrap();
    assert_eq!(related_ids(&parser, &user, "profileSet"), vec![7]);
}

#[test]
fn single_object_for_to_many_is_one_member() {
    let parser = parser(CleanupOption::None);
    let users = parser
        .parse(&objects(json!([{"id": 1, "profileSet": {"id": 3}}])), "User")
        .unwrap();
    assert_eq!(related_ids(&parser, &users[0], "profileSet"), vec![3]);
}

#[test]
fn nested_objects_reuse_existing_identity() {
    let parser = parser(CleanupOption::None);
    parser.parse(&objects(json!([{"id": 5}])), "Profile").unwrap();
    let users = parser.parse(&objects(user_payload(&[5])), "User").unwrap();

    assert_eq!(all_ids(&parser, "Profile"), vec![5]);
    assert_eq!(related_ids(&parser, &users[0], "profileSet"), vec![5]);
}

#[test]
fn scalars_assigned_before_relationships() {
    struct Recording {
        seen: std::sync::Mutex<Vec<String>>,
    }
    impl ParserDelegate for Recording {
        fn primary_keys(&self, _entity: &str) -> BTreeSet<String> {
            BTreeSet::from(["id".to_string()])
        }
        fn adjust_value(&self, value: Value, field: &str, object: &ObjectRef) -> Option<Value> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(format!("{}.{}", object.entity(), field));
            }
            Some(value)
        }
    }

    let recording = Arc::new(Recording {
        seen: std::sync::Mutex::new(Vec::new()),
    });
    let parser = parser_with(dao(), recording.clone(), CleanupOption::None);
    parser
        .parse(
            &objects(json!([{"profileSet": [{"id": 2}], "id": 1, "name": "Ann"}])),
            "User",
        )
        .unwrap();

    let seen = recording.seen.lock().unwrap().clone();
    assert_eq!(seen.len(), 3);
    assert!(seen[..2].iter().all(|s| s.starts_with("User.")));
    assert_eq!(seen[2], "Profile.id");
}

// ── Empty objects ────────────────────────────────────────────────

#[test]
fn empty_root_objects_are_skipped() {
    let parser = parser(CleanupOption::None);
    let users = parser
        .parse(&objects(json!([{}, {"id": 1}, {}])), "User")
        .unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(all_ids(&parser, "User"), vec![1]);
}

#[test]
fn empty_nested_objects_are_skipped() {
    let parser = parser(CleanupOption::None);
    let users = parser
        .parse(&objects(json!([{"id": 1, "profileSet": [{}, {"id": 2}, {}]}])), "User")
        .unwrap();
    assert_eq!(related_ids(&parser, &users[0], "profileSet"), vec![2]);
    assert_eq!(all_ids(&parser, "Profile"), vec![2]);
}

#[test]
fn empty_object_clears_to_one() {
    let parser = parser(CleanupOption::None);
    let profiles = parser
        .parse(&objects(json!([{"id": 7, "user": {"id": 1}}])), "Profile")
        .unwrap();
    parser
        .parse(&objects(json!([{"id": 7, "user": {}}])), "Profile")
        .unwrap();

    assert_eq!(
        parser.dao().context().related_one(&profiles[0], "user").unwrap(),
        None
    );
}

// ── Delegate ─────────────────────────────────────────────────────

#[test]
fn missing_delegate_fails() {
    let parser = Parser::new(dao(), None);
    let err = parser
        .parse(&objects(json!([{"id": 1}])), "User")
        .unwrap_err();
    assert!(matches!(err, ParseError::MissingDelegate));
}

#[test]
fn missing_unique_ids_fails_before_insert() {
    let keys_for_users_only = delegate().with_keys("Profile", Vec::<String>::new());
    let parser = parser_with(dao(), Arc::new(keys_for_users_only), CleanupOption::None);

    let err = parser
        .parse(&objects(user_payload(&[1])), "User")
        .unwrap_err();
    assert!(matches!(err, ParseError::MissingUniqueIds { entity } if entity == "Profile"));
    assert!(all_ids(&parser, "Profile").is_empty());
}

#[test]
fn object_without_key_values_fails_fast() {
    let parser = parser(CleanupOption::None);
    let err = parser
        .parse(&objects(json!([{"name": "Ann"}])), "User")
        .unwrap_err();
    assert!(matches!(
        err,
        ParseError::Dao(DaoError::MissingUniqueKeys { entity }) if entity == "User"
    ));
    assert!(all_ids(&parser, "User").is_empty());
}

#[test]
fn renamed_fields_and_keys() {
    let renaming = delegate()
        .with_keys("User", ["user_id"])
        .with_rename("User", "user_id", "id")
        .with_rename("User", "full_name", "name");
    let parser = parser_with(dao(), Arc::new(renaming), CleanupOption::None);

    let payload = objects(json!([{"user_id": 4, "full_name": "Ann"}]));
    let first = parser.parse(&payload, "User").unwrap();
    let second = parser.parse(&payload, "User").unwrap();

    assert_eq!(first, second);
    let context = parser.dao().context();
    assert_eq!(context.value(&first[0], "id").unwrap(), Some(json!(4)));
    assert_eq!(context.value(&first[0], "name").unwrap(), Some(json!("Ann")));
}

#[test]
fn adjust_value_none_suppresses_assignment() {
    struct Redacting;
    impl ParserDelegate for Redacting {
        fn primary_keys(&self, _entity: &str) -> BTreeSet<String> {
            BTreeSet::from(["id".to_string()])
        }
        fn adjust_value(&self, value: Value, field: &str, _object: &ObjectRef) -> Option<Value> {
            match field {
                "email" => None,
                "name" => value.as_str().map(|s| Value::from(s.to_uppercase())),
                _ => Some(value),
            }
        }
    }

    let parser = parser_with(dao(), Arc::new(Redacting), CleanupOption::None);
    let users = parser
        .parse(
            &objects(json!([{"id": 1, "name": "ann", "email": "ann@example.com"}])),
            "User",
        )
        .unwrap();

    let context = parser.dao().context();
    assert_eq!(context.value(&users[0], "name").unwrap(), Some(json!("ANN")));
    assert_eq!(context.value(&users[0], "email").unwrap(), None);
}

// ── Malformed input ──────────────────────────────────────────────

#[test]
fn array_for_to_one_fails() {
    let parser = parser(CleanupOption::None);
    let err = parser
        .parse(&objects(json!([{"id": 7, "user": [{"id": 1}]}])), "Profile")
        .unwrap_err();
    assert!(matches!(
        err,
        ParseError::FailedCreateRelation { relationship, parent }
            if relationship == "user" && parent.entity() == "Profile"
    ));
}

#[test]
fn scalar_for_relationship_fails() {
    let parser = parser(CleanupOption::None);
    let err = parser
        .parse(&objects(json!([{"id": 1, "profileSet": 3}])), "User")
        .unwrap_err();
    assert!(matches!(
        err,
        ParseError::UnknownDataTypeForRelation { relationship, .. } if relationship == "profileSet"
    ));
}

#[test]
fn null_for_relationship_fails() {
    let parser = parser(CleanupOption::None);
    let err = parser
        .parse(&objects(json!([{"id": 7, "user": null}])), "Profile")
        .unwrap_err();
    assert!(matches!(err, ParseError::UnknownDataTypeForRelation { .. }));
}

#[test]
fn array_of_scalars_for_relationship_fails() {
    let parser = parser(CleanupOption::None);
    let err = parser
        .parse(&objects(json!([{"id": 1, "profileSet": [1, 2]}])), "User")
        .unwrap_err();
    assert!(matches!(err, ParseError::UnknownDataTypeForRelation { .. }));
}

#[test]
fn mistyped_scalar_is_storage_error() {
    let parser = parser(CleanupOption::None);
    let err = parser
        .parse(&objects(json!([{"id": 1, "name": 42}])), "User")
        .unwrap_err();
    assert!(matches!(err, ParseError::Storage(_)));
}

#[test]
fn unknown_root_entity_fails() {
    let parser = parser(CleanupOption::None);
    let err = parser.parse(&objects(json!([{"id": 1}])), "Ghost").unwrap_err();
    assert!(matches!(err, ParseError::Model(_)));
}

// ── Typed views ──────────────────────────────────────────────────

struct User(ObjectRef);

impl ManagedObject for User {
    const ENTITY: &'static str = "User";

    fn from_object(object: ObjectRef) -> Option<Self> {
        (object.entity() == Self::ENTITY).then(|| Self(object))
    }

    fn object(&self) -> &ObjectRef {
        &self.0
    }
}

/// Claims `Profile` but refuses every object.
struct BrokenProfile(ObjectRef);

impl ManagedObject for BrokenProfile {
    const ENTITY: &'static str = "Profile";

    fn from_object(_object: ObjectRef) -> Option<Self> {
        None
    }

    fn object(&self) -> &ObjectRef {
        &self.0
    }
}

#[test]
fn parse_as_views_results() {
    let parser = parser(CleanupOption::None);
    let users: Vec<User> = parser.parse_as(&objects(user_payload(&[1]))).unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(ids(&parser, &[users[0].object().clone()]), vec![1]);
}

#[test]
fn parse_as_misregistered_type_is_cast_failure() {
    let parser = parser(CleanupOption::None);
    let err = parser
        .parse_as::<BrokenProfile>(&objects(json!([{"id": 1}, {"id": 2}])))
        .map(|_| ())
        .unwrap_err();
    match err {
        ParseError::Dao(DaoError::CastFailure { requested, actual }) => {
            assert_eq!(requested, "Profile");
            assert_eq!(actual.len(), 2);
        }
        other => panic!("expected CastFailure, got {other:?}"),
    }
}
