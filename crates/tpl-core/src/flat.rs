// SPDX-License-Identifier: Apache-2.0 OR MIT
//! Conversion between [`NestedValue`] trees and maps keyed by dotted paths.
//!
//! A [`FlatKey`] joins mapping keys with `.` and writes sequence positions as
//! `[i]`, so `{db: {hosts: [{name: a}]}}` flattens to `.db.hosts[0].name = a`.
//! Empty containers are kept as their own leaves so that
//! `expand(&flatten(v, &FlatKey::root())) == v` holds for any root mapping.

use std::collections::BTreeMap;
use std::fmt;

use crate::value::{NestedValue, Scalar};

/// One step of a [`FlatKey`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Dotted path addressing one node of a nested value, e.g. `.db.hosts[0].name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlatKey(String);

impl FlatKey {
    /// Normalises `raw` so that it starts with `.` (or `[` for a root sequence).
    pub fn new(raw: &str) -> Self {
        if raw.is_empty() || raw.starts_with('.') || raw.starts_with('[') {
            FlatKey(raw.to_string())
        } else {
            FlatKey(format!(".{raw}"))
        }
    }

    /// The empty path, addressing the whole value.
    pub fn root() -> Self {
        FlatKey(String::new())
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The key without its leading dot, as written in `key=value` output.
    pub fn trimmed(&self) -> &str {
        self.0.strip_prefix('.').unwrap_or(&self.0)
    }

    pub fn child(&self, key: &str) -> Self {
        FlatKey(format!("{}.{key}", self.0))
    }

    pub fn index(&self, index: usize) -> Self {
        FlatKey(format!("{}[{index}]", self.0))
    }

    /// Splits the path into its segments. A bracket group that is not a
    /// plain number stays part of the surrounding key.
    pub fn segments(&self) -> Vec<Segment> {
        let mut segments = Vec::new();
        let mut key: Option<String> = None;
        let mut rest = self.0.as_str();

        while let Some(ch) = rest.chars().next() {
            match ch {
                '.' => {
                    if let Some(done) = key.replace(String::new()) {
                        segments.push(Segment::Key(done));
                    }
                    rest = &rest[1..];
                }
                '[' => {
                    let index = rest[1..].find(']').and_then(|end| {
                        let digits = &rest[1..=end];
                        let parsed = digits.parse::<usize>().ok()?;
                        digits
                            .bytes()
                            .all(|b| b.is_ascii_digit())
                            .then_some((parsed, end + 2))
                    });
                    match index {
                        Some((index, consumed)) => {
                            if let Some(done) = key.take() {
                                segments.push(Segment::Key(done));
                            }
                            segments.push(Segment::Index(index));
                            rest = &rest[consumed..];
                        }
                        None => {
                            key.get_or_insert_with(String::new).push('[');
                            rest = &rest[1..];
                        }
                    }
                }
                other => {
                    key.get_or_insert_with(String::new).push(other);
                    rest = &rest[other.len_utf8()..];
                }
            }
        }
        if let Some(done) = key {
            segments.push(Segment::Key(done));
        }
        segments
    }

    /// Whether `other` lies strictly below this path.
    pub fn is_ancestor_of(&self, other: &FlatKey) -> bool {
        match other.0.strip_prefix(self.0.as_str()) {
            Some(rest) => rest.starts_with('.') || rest.starts_with('['),
            None => false,
        }
    }
}

impl fmt::Display for FlatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlatKey {
    fn from(raw: &str) -> Self {
        FlatKey::new(raw)
    }
}

/// Value stored under a [`FlatKey`].
#[derive(Debug, Clone, PartialEq)]
pub enum FlatValue {
    Scalar(Scalar),
    EmptySequence,
    EmptyMapping,
    /// A reference nobody has supplied a value for yet.
    Unresolved,
}

impl FlatValue {
    pub fn string(text: impl Into<String>) -> Self {
        FlatValue::Scalar(Scalar::String(text.into()))
    }

    fn to_nested(&self) -> NestedValue {
        match self {
            FlatValue::Scalar(scalar) => NestedValue::Scalar(scalar.clone()),
            FlatValue::EmptySequence => NestedValue::Sequence(Vec::new()),
            FlatValue::EmptyMapping => NestedValue::Mapping(BTreeMap::new()),
            FlatValue::Unresolved => NestedValue::string(""),
        }
    }
}

impl fmt::Display for FlatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlatValue::Scalar(scalar) => write!(f, "{scalar}"),
            FlatValue::EmptySequence => f.write_str("[]"),
            FlatValue::EmptyMapping => f.write_str("{}"),
            FlatValue::Unresolved => Ok(()),
        }
    }
}

/// Map from [`FlatKey`] to [`FlatValue`], ordered by key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlatMap {
    entries: BTreeMap<FlatKey, FlatValue>,
}

impl FlatMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &FlatKey) -> Option<&FlatValue> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &FlatKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn insert(&mut self, key: FlatKey, value: FlatValue) -> Option<FlatValue> {
        self.entries.insert(key, value)
    }

    pub fn remove(&mut self, key: &FlatKey) -> Option<FlatValue> {
        self.entries.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FlatKey, &FlatValue)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &FlatKey> {
        self.entries.keys()
    }

    /// Entries at `key` itself or anywhere below it.
    pub fn entries_under<'a>(&'a self, key: &'a FlatKey) -> impl Iterator<Item = (&'a FlatKey, &'a FlatValue)> {
        self.entries
            .range(key.clone()..)
            .take_while(move |(candidate, _)| candidate.as_str().starts_with(key.as_str()))
            .filter(move |(candidate, _)| *candidate == key || key.is_ancestor_of(candidate))
    }

    /// A key is addressed when it is stored as a leaf or is the parent of
    /// stored keys.
    pub fn is_addressed(&self, key: &FlatKey) -> bool {
        self.entries_under(key).next().is_some()
    }

    /// Addressed by at least one entry that is not [`FlatValue::Unresolved`].
    pub fn is_satisfied(&self, key: &FlatKey) -> bool {
        self.entries_under(key)
            .any(|(_, value)| !matches!(value, FlatValue::Unresolved))
    }
}

impl FromIterator<(FlatKey, FlatValue)> for FlatMap {
    fn from_iter<I: IntoIterator<Item = (FlatKey, FlatValue)>>(iter: I) -> Self {
        FlatMap {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FlatMap {
    type Item = (&'a FlatKey, &'a FlatValue);
    type IntoIter = std::collections::btree_map::Iter<'a, FlatKey, FlatValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Flattens `value` into dotted keys rooted at `base`.
pub fn flatten(value: &NestedValue, base: &FlatKey) -> FlatMap {
    let mut out = FlatMap::new();
    flatten_into(value, base.clone(), &mut out);
    out
}

fn flatten_into(value: &NestedValue, path: FlatKey, out: &mut FlatMap) {
    match value {
        NestedValue::Scalar(scalar) => {
            out.insert(path, FlatValue::Scalar(scalar.clone()));
        }
        NestedValue::Sequence(items) if items.is_empty() => {
            if !path.is_root() {
                out.insert(path, FlatValue::EmptySequence);
            }
        }
        NestedValue::Sequence(items) => {
            for (index, item) in items.iter().enumerate() {
                flatten_into(item, path.index(index), out);
            }
        }
        NestedValue::Mapping(map) if map.is_empty() => {
            if !path.is_root() {
                out.insert(path, FlatValue::EmptyMapping);
            }
        }
        NestedValue::Mapping(map) => {
            for (key, item) in map {
                flatten_into(item, path.child(key), out);
            }
        }
    }
}

/// Rebuilds the nested value described by `flat`.
pub fn expand(flat: &FlatMap) -> NestedValue {
    expand_prefixed(flat, &FlatKey::root())
}

/// Rebuilds the sub-tree of `flat` found under `prefix`.
///
/// Entries are visited in key order and the first value to claim a path
/// wins: a key below an already populated leaf is ignored, as is a leaf for
/// a path that already has children. An empty mapping or sequence gives way
/// to the keys stored below it.
pub fn expand_prefixed(flat: &FlatMap, prefix: &FlatKey) -> NestedValue {
    let base = prefix.segments();
    let mut root = Builder::Pending;
    for (key, value) in flat {
        let segments = key.segments();
        if let Some(rest) = segments.strip_prefix(base.as_slice()) {
            root.insert(rest, value);
        }
    }
    root.finish()
}

/// Stores `value` at `key` inside `root`. Missing containers are created and
/// anything in the way that is not the right kind of container is replaced.
pub fn assign(root: &mut NestedValue, key: &FlatKey, value: NestedValue) {
    assign_segments(root, &key.segments(), value);
}

fn assign_segments(slot: &mut NestedValue, segments: &[Segment], value: NestedValue) {
    let Some((head, rest)) = segments.split_first() else {
        *slot = value;
        return;
    };
    match head {
        Segment::Key(name) => {
            if !matches!(slot, NestedValue::Mapping(_)) {
                *slot = NestedValue::Mapping(BTreeMap::new());
            }
            if let NestedValue::Mapping(map) = slot {
                let child = map
                    .entry(name.clone())
                    .or_insert(NestedValue::Scalar(Scalar::Null));
                assign_segments(child, rest, value);
            }
        }
        Segment::Index(index) => {
            if !matches!(slot, NestedValue::Sequence(_)) {
                *slot = NestedValue::Sequence(Vec::new());
            }
            if let NestedValue::Sequence(items) = slot {
                if items.len() <= *index {
                    items.resize(index + 1, NestedValue::Scalar(Scalar::Null));
                }
                assign_segments(&mut items[*index], rest, value);
            }
        }
    }
}

enum Builder {
    Pending,
    Leaf(NestedValue),
    Branch(BTreeMap<Segment, Builder>),
}

impl Builder {
    fn insert(&mut self, segments: &[Segment], value: &FlatValue) {
        match (segments.split_first(), &mut *self) {
            (None, Builder::Pending) => *self = Builder::Leaf(value.to_nested()),
            (Some(_), Builder::Leaf(leaf)) if leaf.is_empty_container() => {
                *self = Builder::Branch(BTreeMap::new());
                self.insert(segments, value);
            }
            (None, _) | (Some(_), Builder::Leaf(_)) => {}
            (Some((head, rest)), Builder::Branch(children)) => children
                .entry(head.clone())
                .or_insert(Builder::Pending)
                .insert(rest, value),
            (Some(_), Builder::Pending) => {
                *self = Builder::Branch(BTreeMap::new());
                self.insert(segments, value);
            }
        }
    }

    fn finish(self) -> NestedValue {
        match self {
            Builder::Pending => NestedValue::default(),
            Builder::Leaf(value) => value,
            Builder::Branch(children) => {
                let all_indices = children
                    .keys()
                    .all(|segment| matches!(segment, Segment::Index(_)));
                if all_indices {
                    let mut items = Vec::new();
                    for (segment, child) in children {
                        if let Segment::Index(index) = segment {
                            if items.len() < index {
                                items.resize(index, NestedValue::Scalar(Scalar::Null));
                            }
                            items.push(child.finish());
                        }
                    }
                    NestedValue::Sequence(items)
                } else {
                    NestedValue::Mapping(
                        children
                            .into_iter()
                            .map(|(segment, child)| {
                                let key = match segment {
                                    Segment::Key(key) => key,
                                    Segment::Index(index) => format!("[{index}]"),
                                };
                                (key, child.finish())
                            })
                            .collect(),
                    )
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn nested(value: serde_json::Value) -> NestedValue {
        NestedValue::from(value)
    }

    fn key(raw: &str) -> FlatKey {
        FlatKey::new(raw)
    }

    #[test]
    fn parses_segments() {
        assert_eq!(
            key(".db.hosts[0].name").segments(),
            vec![
                Segment::Key("db".into()),
                Segment::Key("hosts".into()),
                Segment::Index(0),
                Segment::Key("name".into()),
            ]
        );
        assert_eq!(key("a.b"), key(".a.b"));
        assert_eq!(
            key(".a[x]").segments(),
            vec![Segment::Key("a[x]".into())]
        );
        assert!(FlatKey::root().segments().is_empty());
    }

    #[test]
    fn flattens_mappings_sequences_and_empties() {
        let flat = flatten(
            &nested(json!({"db": {"hosts": [{"name": "a"}], "opts": {}, "tags": []}, "n": 1})),
            &FlatKey::root(),
        );
        let keys: Vec<&str> = flat.keys().map(FlatKey::as_str).collect();
        assert_eq!(
            keys,
            vec![".db.hosts[0].name", ".db.opts", ".db.tags", ".n"]
        );
        assert_eq!(flat.get(&key(".db.opts")), Some(&FlatValue::EmptyMapping));
        assert_eq!(flat.get(&key(".db.tags")), Some(&FlatValue::EmptySequence));
    }

    #[test]
    fn expand_orders_indices_numerically_and_fills_gaps() {
        let flat: FlatMap = [
            (key(".list[10]"), FlatValue::string("ten")),
            (key(".list[2]"), FlatValue::string("two")),
        ]
        .into_iter()
        .collect();
        let NestedValue::Mapping(map) = expand(&flat) else {
            panic!("expected mapping");
        };
        let NestedValue::Sequence(items) = &map["list"] else {
            panic!("expected sequence");
        };
        assert_eq!(items.len(), 11);
        assert_eq!(items[0], NestedValue::Scalar(Scalar::Null));
        assert_eq!(items[2], NestedValue::string("two"));
        assert_eq!(items[10], NestedValue::string("ten"));
    }

    #[test]
    fn expand_keeps_first_write() {
        let flat: FlatMap = [
            (key(".a"), FlatValue::string("leaf")),
            (key(".a.b"), FlatValue::string("ignored")),
        ]
        .into_iter()
        .collect();
        assert_eq!(expand(&flat), nested(json!({"a": "leaf"})));
    }

    #[test]
    fn empty_containers_give_way_to_keys_below() {
        let mut flat = flatten(&nested(json!({"db": {}, "tags": []})), &FlatKey::root());
        flat.insert(key(".db.host"), FlatValue::string("localhost"));
        flat.insert(key(".tags[1]"), FlatValue::string("b"));
        assert_eq!(
            expand(&flat),
            nested(json!({"db": {"host": "localhost"}, "tags": [null, "b"]}))
        );
    }

    #[test]
    fn assign_builds_missing_containers() {
        let mut root = nested(json!({"db": {}, "labels": {"app.kubernetes.io/name": "web"}, "n": 1}));
        assign(&mut root, &key(".db.host"), NestedValue::string("localhost"));
        assign(&mut root, &key(".list[1].id"), NestedValue::string("x"));
        assign(&mut root, &key(".n.deep"), NestedValue::string("y"));
        assert_eq!(
            root,
            nested(json!({
                "db": {"host": "localhost"},
                "labels": {"app.kubernetes.io/name": "web"},
                "list": [null, {"id": "x"}],
                "n": {"deep": "y"}
            }))
        );
    }

    #[test]
    fn expand_prefixed_returns_subtree() {
        let flat = flatten(&nested(json!({"a": {"b": 1, "c": [true]}, "z": 0})), &FlatKey::root());
        assert_eq!(
            expand_prefixed(&flat, &key(".a")),
            nested(json!({"b": 1, "c": [true]}))
        );
    }

    #[test]
    fn unresolved_expands_to_empty_string() {
        let flat: FlatMap = [(key(".who"), FlatValue::Unresolved)].into_iter().collect();
        assert_eq!(expand(&flat), nested(json!({"who": ""})));
    }

    #[test]
    fn empty_flat_map_expands_to_empty_mapping() {
        assert_eq!(expand(&FlatMap::new()), NestedValue::default());
        assert!(flatten(&NestedValue::default(), &FlatKey::root()).is_empty());
    }

    #[test]
    fn addressed_covers_leaves_and_subtrees() {
        let mut flat = flatten(&nested(json!({"a": {"b": 1}, "ab": 2})), &FlatKey::root());
        assert!(flat.is_addressed(&key(".a")));
        assert!(flat.is_addressed(&key(".a.b")));
        assert!(!flat.is_addressed(&key(".a.c")));
        assert!(!flat.is_addressed(&key(".a.b.c")));

        flat.insert(key(".x"), FlatValue::Unresolved);
        assert!(flat.is_addressed(&key(".x")));
        assert!(!flat.is_satisfied(&key(".x")));
        assert!(flat.is_satisfied(&key(".a")));
    }

    fn arb_nested() -> impl Strategy<Value = NestedValue> {
        let leaf = prop_oneof![
            Just(NestedValue::Scalar(Scalar::Null)),
            any::<bool>().prop_map(|b| NestedValue::Scalar(Scalar::Bool(b))),
            any::<i64>().prop_map(|n| NestedValue::Scalar(Scalar::Number(n.into()))),
            "[a-z ]{0,8}".prop_map(NestedValue::string),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(NestedValue::Sequence),
                prop::collection::btree_map("[a-z][a-z0-9_]{0,5}", inner, 0..4)
                    .prop_map(NestedValue::Mapping),
            ]
        })
    }

    fn arb_root() -> impl Strategy<Value = NestedValue> {
        prop::collection::btree_map("[a-z][a-z0-9_]{0,5}", arb_nested(), 0..5)
            .prop_map(NestedValue::Mapping)
    }

    proptest! {
        #[test]
        fn expand_inverts_flatten(value in arb_root()) {
            let flat = flatten(&value, &FlatKey::root());
            prop_assert_eq!(expand(&flat), value);
        }

        #[test]
        fn flatten_is_deterministic_and_stable(value in arb_root()) {
            let first = flatten(&value, &FlatKey::root());
            let second = flatten(&value, &FlatKey::root());
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(flatten(&expand(&first), &FlatKey::root()), first);
        }
    }
}
