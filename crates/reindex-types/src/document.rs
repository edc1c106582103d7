//! Document types moved between pipeline stages.
//!
//! Raw documents come out of the source engine keyed by dotted field
//! paths. The transformer turns them into nested trees, or keeps them
//! flat when the job asks for it; the [`Document`] tag records which.

use serde::Serialize;
use serde_json::{Map, Value};

/// Dotted field path -> scalar/array value.
pub type FlatDocument = Map<String, Value>;

/// Nested tree of the same values.
pub type NestedDocument = Map<String, Value>;

/// One retrieved document with its engine-assigned identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub id: String,
    pub source: FlatDocument,
}

impl Hit {
    pub fn new(id: impl Into<String>, source: FlatDocument) -> Self {
        Self {
            id: id.into(),
            source,
        }
    }
}

/// A document ready for writing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Document {
    /// Dotted keys retained as-is
    Flat(FlatDocument),
    /// Dotted keys expanded into nested objects
    Nested(NestedDocument),
}

impl Document {
    pub fn is_nested(&self) -> bool {
        matches!(self, Document::Nested(_))
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        match self {
            Document::Flat(map) | Document::Nested(map) => map,
        }
    }

    pub fn len(&self) -> usize {
        self.as_map().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_map().is_empty()
    }

    /// Convert into the JSON body sent to the engine.
    pub fn into_value(self) -> Value {
        match self {
            Document::Flat(map) | Document::Nested(map) => Value::Object(map),
        }
    }
}

/// Collapse a nested engine `_source` into dotted paths.
///
/// Arrays and empty objects are leaves; keys that already contain dots
/// are kept and prefixed like any other key.
pub fn flatten_source(source: &NestedDocument) -> FlatDocument {
    let mut flat = Map::new();
    flatten_into(&mut flat, None, source);
    flat
}

fn flatten_into(out: &mut FlatDocument, prefix: Option<&str>, map: &Map<String, Value>) {
    for (key, value) in map {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{key}"),
            None => key.clone(),
        };
        match value {
            Value::Object(inner) if !inner.is_empty() => flatten_into(out, Some(&path), inner),
            _ => {
                out.insert(path, value.clone());
            }
        }
    }
}
