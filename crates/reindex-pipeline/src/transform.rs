//! Raw (dotted) documents to materialized documents.
//!
//! Unflattening rules:
//! - keys without a dot are placed first, then dotted keys, each group in
//!   input order
//! - an intermediate segment holding a non-object is replaced by a new
//!   object
//! - an occupied leaf keeps its existing value

use serde_json::{Map, Value};

use reindex_types::{Document, FlatDocument, Hit, NestedDocument};

pub use reindex_types::flatten_source;

/// Build a nested tree from dotted keys. The input is left untouched.
pub fn unflatten(raw: &FlatDocument) -> NestedDocument {
    let mut root = Map::new();
    let (plain, dotted): (Vec<_>, Vec<_>) = raw.iter().partition(|(key, _)| !key.contains('.'));

    for (key, value) in plain.into_iter().chain(dotted) {
        let segments: Vec<&str> = key.split('.').collect();
        insert_path(&mut root, &segments, value.clone());
    }
    root
}

fn insert_path(node: &mut Map<String, Value>, segments: &[&str], value: Value) {
    match segments {
        [] => {}
        [leaf] => {
            node.entry(leaf.to_string()).or_insert(value);
        }
        [head, rest @ ..] => {
            let child = node
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(children) = child {
                insert_path(children, rest, value);
            }
        }
    }
}

/// Materialize one raw document.
pub fn transform(raw: &FlatDocument, flatten: bool) -> Document {
    if flatten {
        Document::Flat(raw.clone())
    } else {
        Document::Nested(unflatten(raw))
    }
}

/// Applies [`transform`] with a fixed `flatten` setting.
#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentTransformer {
    flatten: bool,
}

impl DocumentTransformer {
    pub fn new(flatten: bool) -> Self {
        Self { flatten }
    }

    pub fn transform(&self, raw: &FlatDocument) -> Document {
        transform(raw, self.flatten)
    }

    pub fn transform_hits(&self, hits: &[Hit]) -> Vec<Document> {
        hits.iter().map(|hit| self.transform(&hit.source)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn flat(value: Value) -> FlatDocument {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_unflatten_builds_tree() {
        let raw = flat(json!({"a.b": 2, "a.c": 3, "title": "x"}));
        assert_eq!(
            Value::Object(unflatten(&raw)),
            json!({"title": "x", "a": {"b": 2, "c": 3}})
        );
    }

    #[test]
    fn test_leaves_read_back_once() {
        let raw = flat(json!({"a.b": 1, "a.c": [1, 2], "d.e": null, "f": true}));
        let tree = unflatten(&raw);
        let back = flatten_source(&tree);
        assert_eq!(back.len(), raw.len());
        for (key, value) in &raw {
            assert_eq!(back.get(key), Some(value), "{key}");
        }
    }

    #[test]
    fn test_intermediate_scalar_is_overwritten() {
        let raw = flat(json!({"a": 1, "a.b": 2}));
        assert_eq!(Value::Object(unflatten(&raw)), json!({"a": {"b": 2}}));

        let raw = flat(json!({"a.b": 1, "a.b.c": 2}));
        assert_eq!(Value::Object(unflatten(&raw)), json!({"a": {"b": {"c": 2}}}));
    }

    #[test]
    fn test_occupied_leaf_keeps_first_value() {
        let raw = flat(json!({"a.b.c": 1, "a.b": 2}));
        assert_eq!(Value::Object(unflatten(&raw)), json!({"a": {"b": {"c": 1}}}));
    }

    #[test]
    fn test_plain_keys_come_first() {
        let raw = flat(json!({"z.y": 1, "m": 2}));
        let keys: Vec<_> = unflatten(&raw).keys().cloned().collect();
        assert_eq!(keys, vec!["m", "z"]);
    }

    #[test]
    fn test_flatten_passes_through() {
        let raw = flat(json!({"a.b": 1}));
        let document = transform(&raw, true);
        assert!(!document.is_nested());
        assert_eq!(document.as_map(), &raw);
    }

    #[test]
    fn test_input_is_not_mutated() {
        let raw = flat(json!({"a.b": 1, "a.c": 2}));
        let before = raw.clone();
        let first = transform(&raw, false);
        let second = transform(&raw, false);
        assert_eq!(raw, before);
        assert_eq!(first, second);
    }

    #[test]
    fn test_transform_hits() {
        let hits = vec![
            Hit::new("1", flat(json!({"a.b": 1}))),
            Hit::new("2", flat(json!({"a.b": 2, "a.c": 3}))),
        ];
        let documents = DocumentTransformer::new(false).transform_hits(&hits);
        let values: Vec<_> = documents.into_iter().map(Document::into_value).collect();
        assert_eq!(
            values,
            vec![json!({"a": {"b": 1}}), json!({"a": {"b": 2, "c": 3}})]
        );
    }

    mod proptest_unflatten {
        use super::*;
        use proptest::prelude::*;
        use std::collections::{BTreeMap, BTreeSet};

        /// Dotted keys share prefixes from `a..e`; plain keys come from
        /// `f..j` so neither can shadow the other.
        fn one_level_document() -> impl Strategy<Value = FlatDocument> {
            (
                prop::collection::btree_map(
                    "[a-e]{1,2}",
                    prop::collection::btree_set("[a-e]{1,2}", 1..4),
                    0..4,
                ),
                prop::collection::btree_set("[f-j]{1,2}", 0..4),
                any::<i64>(),
            )
                .prop_map(
                    |(dotted, plain, seed): (BTreeMap<String, BTreeSet<String>>, BTreeSet<String>, i64)| {
                        let mut raw = FlatDocument::new();
                        let mut value = seed;
                        for (prefix, children) in dotted {
                            for child in children {
                                raw.insert(format!("{prefix}.{child}"), json!(value));
                                value = value.wrapping_add(1);
                            }
                        }
                        for key in plain {
                            raw.insert(key, json!(value));
                            value = value.wrapping_add(1);
                        }
                        raw
                    },
                )
        }

        proptest! {
            #[test]
            fn prop_leaves_read_back_once(raw in one_level_document()) {
                let back = flatten_source(&unflatten(&raw));
                prop_assert_eq!(back.len(), raw.len());
                for (key, value) in &raw {
                    prop_assert_eq!(back.get(key), Some(value));
                }
            }

            #[test]
            fn prop_flatten_mode_is_identity(raw in one_level_document()) {
                let document = transform(&raw, true);
                prop_assert_eq!(document.as_map(), &raw);
            }
        }
    }
}
