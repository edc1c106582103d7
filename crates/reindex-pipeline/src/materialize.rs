//! Destination index creation.
//!
//! Builds a single mapping document from the resolved fields (plus the
//! optional annotation sub-schema) and creates the index with it. There
//! is no exists-check before the create: a taken name surfaces as
//! [`MaterializeError::AlreadyExists`].

use serde_json::{json, Map, Value};
use tracing::info;

use reindex_backend::SearchBackend;
use reindex_types::FieldDescriptor;

use crate::error::MaterializeError;

/// Default name of the annotation field.
pub const DEFAULT_ANNOTATION_FIELD: &str = "texta_facts";

const MAX_INDEX_NAME_BYTES: usize = 255;
const FORBIDDEN_CHARS: &[char] = &['\\', '/', '*', '?', '"', '<', '>', '|', ',', '#', ' '];

/// Check `name` against the engine's index naming rules.
pub fn validate_index_name(name: &str) -> Result<(), MaterializeError> {
    let reason = if name.is_empty() {
        Some("must not be empty".to_string())
    } else if name == "." || name == ".." {
        Some("must not be '.' or '..'".to_string())
    } else if name.len() > MAX_INDEX_NAME_BYTES {
        Some(format!("must be at most {MAX_INDEX_NAME_BYTES} bytes"))
    } else if name.starts_with(['-', '_', '+']) {
        Some("must not start with '-', '_' or '+'".to_string())
    } else if name.chars().any(char::is_uppercase) {
        Some("must be lowercase".to_string())
    } else {
        name.chars()
            .find(|c| FORBIDDEN_CHARS.contains(c))
            .map(|c| format!("must not contain '{c}'"))
    };

    match reason {
        Some(reason) => Err(MaterializeError::InvalidIndexName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Mapping of the structured annotation field.
pub fn annotation_mapping() -> Value {
    json!({
        "type": "nested",
        "properties": {
            "doc_path": {"type": "keyword"},
            "fact": {"type": "keyword"},
            "num_val": {"type": "long"},
            "spans": {"type": "keyword"},
            "str_val": {"type": "keyword"}
        }
    })
}

/// Mapping body for a new index. Consumed by [`MappingDocument::into_body`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingDocument {
    properties: Map<String, Value>,
}

impl MappingDocument {
    pub fn from_fields(fields: &[FieldDescriptor]) -> Self {
        let mut properties = Map::new();
        for field in fields {
            let segments: Vec<&str> = field.segments().collect();
            insert_field(&mut properties, &segments, &field.field_type, field.nested);
        }
        Self { properties }
    }

    /// Add the annotation sub-schema under `field_name`, replacing any
    /// user field of that name.
    pub fn with_annotations(mut self, field_name: &str) -> Self {
        self.properties
            .insert(field_name.to_string(), annotation_mapping());
        self
    }

    pub fn properties(&self) -> &Map<String, Value> {
        &self.properties
    }

    pub fn into_body(self) -> Value {
        json!({ "mappings": { "properties": Value::Object(self.properties) } })
    }
}

fn insert_field(
    properties: &mut Map<String, Value>,
    segments: &[&str],
    field_type: &str,
    nested: bool,
) {
    match segments {
        [] => {}
        [leaf] => {
            properties
                .entry(leaf.to_string())
                .or_insert_with(|| json!({ "type": field_type }));
        }
        [head, rest @ ..] => {
            let node = properties
                .entry(head.to_string())
                .or_insert_with(|| json!({ "properties": {} }));
            if !node.get("properties").is_some_and(Value::is_object) {
                *node = json!({ "properties": {} });
            }
            if nested {
                node["type"] = json!("nested");
            }
            if let Some(children) = node.get_mut("properties").and_then(Value::as_object_mut) {
                // only the top-level container carries the nested type
                insert_field(children, rest, field_type, false);
            }
        }
    }
}

pub struct IndexMaterializer<'a> {
    backend: &'a dyn SearchBackend,
    annotation_field: String,
}

impl<'a> IndexMaterializer<'a> {
    pub fn new(backend: &'a dyn SearchBackend) -> Self {
        Self {
            backend,
            annotation_field: DEFAULT_ANNOTATION_FIELD.to_string(),
        }
    }

    pub fn with_annotation_field(mut self, field_name: impl Into<String>) -> Self {
        self.annotation_field = field_name.into();
        self
    }

    /// Mapping document for `fields`.
    pub fn mapping(&self, fields: &[FieldDescriptor], include_annotations: bool) -> MappingDocument {
        let mapping = MappingDocument::from_fields(fields);
        if include_annotations {
            mapping.with_annotations(&self.annotation_field)
        } else {
            mapping
        }
    }

    /// Create `name` with the mapping built from `fields`.
    pub async fn create(
        &self,
        name: &str,
        fields: &[FieldDescriptor],
        include_annotations: bool,
    ) -> Result<(), MaterializeError> {
        validate_index_name(name)?;
        let body = self.mapping(fields, include_annotations).into_body();
        self.backend.create_index(name, body).await?;
        info!(
            index = %name,
            fields = fields.len(),
            annotations = include_annotations,
            "Created destination index"
        );
        Ok(())
    }
}
