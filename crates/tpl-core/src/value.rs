// SPDX-License-Identifier: Apache-2.0 OR MIT
//! The nested data model templates render against.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// A leaf value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Number(Number),
    String(String),
}

impl Scalar {
    pub fn to_json(&self) -> Value {
        match self {
            Scalar::Null => Value::Null,
            Scalar::Bool(flag) => Value::Bool(*flag),
            Scalar::Number(number) => Value::Number(number.clone()),
            Scalar::String(text) => Value::String(text.clone()),
        }
    }
}

/// Prints the value the way it appears in `key=value` output; null is empty.
impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(flag) => write!(f, "{flag}"),
            Scalar::Number(number) => write!(f, "{number}"),
            Scalar::String(text) => f.write_str(text),
        }
    }
}

impl From<&str> for Scalar {
    fn from(text: &str) -> Self {
        Scalar::String(text.to_string())
    }
}

impl From<String> for Scalar {
    fn from(text: String) -> Self {
        Scalar::String(text)
    }
}

/// A scalar, an ordered sequence or a string-keyed mapping.
///
/// Loaded from YAML and JSON through `serde`; rendered by converting to a
/// `serde_json::Value` with [`NestedValue::to_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NestedValue {
    Scalar(Scalar),
    Sequence(Vec<NestedValue>),
    Mapping(BTreeMap<String, NestedValue>),
}

impl Default for NestedValue {
    fn default() -> Self {
        NestedValue::Mapping(BTreeMap::new())
    }
}

impl NestedValue {
    pub fn string(text: impl Into<String>) -> Self {
        NestedValue::Scalar(Scalar::String(text.into()))
    }

    /// An empty mapping or an empty sequence.
    pub fn is_empty_container(&self) -> bool {
        match self {
            NestedValue::Sequence(items) => items.is_empty(),
            NestedValue::Mapping(map) => map.is_empty(),
            NestedValue::Scalar(_) => false,
        }
    }

    pub fn as_mapping(&self) -> Option<&BTreeMap<String, NestedValue>> {
        match self {
            NestedValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut BTreeMap<String, NestedValue>> {
        match self {
            NestedValue::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Follows a path of mapping keys.
    pub fn lookup(&self, path: &[&str]) -> Option<&NestedValue> {
        path.iter()
            .try_fold(self, |node, key| node.as_mapping()?.get(*key))
    }

    pub fn to_json(&self) -> Value {
        match self {
            NestedValue::Scalar(scalar) => scalar.to_json(),
            NestedValue::Sequence(items) => {
                Value::Array(items.iter().map(NestedValue::to_json).collect())
            }
            NestedValue::Mapping(map) => Value::Object(
                map.iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
        }
    }

    /// Deep-merges `other` into `self`. Mappings merge key by key; for any
    /// other combination `other` replaces the current value.
    pub fn merge(&mut self, other: NestedValue) {
        match (self, other) {
            (NestedValue::Mapping(ours), NestedValue::Mapping(theirs)) => {
                for (key, value) in theirs {
                    match ours.get_mut(&key) {
                        Some(existing) => existing.merge(value),
                        None => {
                            ours.insert(key, value);
                        }
                    }
                }
            }
            (slot, other) => *slot = other,
        }
    }
}

impl From<Scalar> for NestedValue {
    fn from(scalar: Scalar) -> Self {
        NestedValue::Scalar(scalar)
    }
}

impl From<Value> for NestedValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => NestedValue::Scalar(Scalar::Null),
            Value::Bool(flag) => NestedValue::Scalar(Scalar::Bool(flag)),
            Value::Number(number) => NestedValue::Scalar(Scalar::Number(number)),
            Value::String(text) => NestedValue::Scalar(Scalar::String(text)),
            Value::Array(items) => {
                NestedValue::Sequence(items.into_iter().map(NestedValue::from).collect())
            }
            Value::Object(map) => NestedValue::Mapping(
                map.into_iter()
                    .map(|(key, value)| (key, NestedValue::from(value)))
                    .collect(),
            ),
        }
    }
}
