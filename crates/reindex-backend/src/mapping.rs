//! Reading field descriptors out of engine mapping documents.
//!
//! Mappings arrive as nested `properties` trees. Leaves become
//! [`FieldDescriptor`]s with dotted paths; multi-fields (`fields`) are
//! index-time views of the same source value and are skipped.

use serde_json::{Map, Value};

use reindex_types::FieldDescriptor;

/// Type recorded for containers declared without an explicit type.
const OBJECT_TYPE: &str = "object";
const NESTED_TYPE: &str = "nested";

/// Flatten a `properties` object into leaf descriptors.
pub fn fields_from_properties(properties: &Map<String, Value>) -> Vec<FieldDescriptor> {
    let mut fields = Vec::new();
    for (name, definition) in properties {
        let nested = definition.get("type").and_then(Value::as_str) == Some(NESTED_TYPE);
        collect(&mut fields, name, definition, nested);
    }
    fields
}

fn collect(out: &mut Vec<FieldDescriptor>, path: &str, definition: &Value, nested: bool) {
    match definition.get("properties").and_then(Value::as_object) {
        Some(children) if !children.is_empty() => {
            for (name, child) in children {
                collect(out, &format!("{path}.{name}"), child, nested);
            }
        }
        _ => {
            let field_type = definition
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or(OBJECT_TYPE);
            let mut field = FieldDescriptor::new(path, field_type);
            field.nested = nested;
            out.push(field);
        }
    }
}

/// Locate the `properties` object of one index entry of a mapping
/// response.
///
/// Handles both `{"mappings": {"properties": ..}}` and the older
/// typed form `{"mappings": {"<type>": {"properties": ..}}}`.
pub fn index_properties(index_entry: &Value) -> Option<&Map<String, Value>> {
    let mappings = index_entry.get("mappings")?;
    if let Some(properties) = mappings.get("properties").and_then(Value::as_object) {
        return Some(properties);
    }
    mappings
        .as_object()?
        .values()
        .find_map(|typed| typed.get("properties").and_then(Value::as_object))
}

/// Descriptors for every index entry of a `GET <index>/_mapping`
/// response, in response order. An alias or pattern may expand to
/// several concrete indices; their fields are concatenated.
pub fn fields_from_mapping_response(response: &Value) -> Vec<FieldDescriptor> {
    let Some(entries) = response.as_object() else {
        return Vec::new();
    };
    entries
        .values()
        .filter_map(index_properties)
        .flat_map(fields_from_properties)
        .collect()
}
