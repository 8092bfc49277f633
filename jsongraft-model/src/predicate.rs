//! Structured queries over managed objects.

use crate::value::{compare_values, values_equal};
use crate::JsonObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// A filter over an object's attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    /// Attribute `key` equals `value`. A missing attribute equals `null`.
    Equals { key: String, value: Value },
    /// Every sub-predicate holds. An empty conjunction holds.
    And(Vec<Predicate>),
    /// At least one sub-predicate holds.
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn equals(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Equals {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn and(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::And(predicates.into_iter().collect())
    }

    pub fn or(predicates: impl IntoIterator<Item = Predicate>) -> Self {
        Self::Or(predicates.into_iter().collect())
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(predicate: Predicate) -> Self {
        Self::Not(Box::new(predicate))
    }

    /// Conjunction of one equality per unique key.
    pub fn from_unique_keys(keys: &UniqueKeys) -> Self {
        Self::and(
            keys.iter()
                .map(|(key, value)| Self::equals(key.clone(), value.clone())),
        )
    }

    /// Evaluates the predicate against an attribute map.
    pub fn matches(&self, attributes: &JsonObject) -> bool {
        match self {
            Self::Equals { key, value } => {
                let actual = attributes.get(key).unwrap_or(&Value::Null);
                values_equal(actual, value)
            }
            Self::And(predicates) => predicates.iter().all(|p| p.matches(attributes)),
            Self::Or(predicates) => predicates.iter().any(|p| p.matches(attributes)),
            Self::Not(predicate) => !predicate.matches(attributes),
        }
    }
}

/// Field/value pairs that identify exactly one object of an entity type.
///
/// Never empty: [`UniqueKeys::new`] refuses an empty map so an unidentifiable
/// lookup cannot silently match every object.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueKeys(BTreeMap<String, Value>);

impl UniqueKeys {
    /// Returns `None` if `keys` is empty.
    pub fn new<I, K>(keys: I) -> Option<Self>
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let map: BTreeMap<String, Value> =
            keys.into_iter().map(|(k, v)| (k.into(), v)).collect();
        (!map.is_empty()).then_some(Self(map))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Orders fetch results by one attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub key: String,
    pub ascending: bool,
}

impl SortDescriptor {
    pub fn asc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ascending: true,
        }
    }

    pub fn desc(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            ascending: false,
        }
    }

    /// Compares two attribute maps on this descriptor's key.
    pub fn compare(&self, a: &JsonObject, b: &JsonObject) -> Ordering {
        let left = a.get(&self.key).unwrap_or(&Value::Null);
        let right = b.get(&self.key).unwrap_or(&Value::Null);
        let ordering = compare_values(left, right);
        if self.ascending {
            ordering
        } else {
            ordering.reverse()
        }
    }
}

/// A bounded query for objects of one entity type.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub entity: String,
    pub predicate: Option<Predicate>,
    pub sort: Vec<SortDescriptor>,
    /// Faulting hint; contexts may ignore it.
    pub batch_size: Option<usize>,
    pub limit: Option<usize>,
}

impl FetchRequest {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            predicate: None,
            sort: Vec::new(),
            batch_size: None,
            limit: None,
        }
    }

    #[must_use]
    pub fn with_predicate(mut self, predicate: Option<Predicate>) -> Self {
        self.predicate = predicate;
        self
    }

    #[must_use]
    pub fn with_sort(mut self, sort: Vec<SortDescriptor>) -> Self {
        self.sort = sort;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: Option<usize>) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// True when the predicate (if any) holds for `attributes`.
    pub fn matches(&self, attributes: &JsonObject) -> bool {
        self.predicate
            .as_ref()
            .is_none_or(|predicate| predicate.matches(attributes))
    }

    /// Orders attribute maps by the sort descriptors, first descriptor first.
    pub fn compare(&self, a: &JsonObject, b: &JsonObject) -> Ordering {
        self.sort
            .iter()
            .map(|descriptor| descriptor.compare(a, b))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}
