//! In-process search engine.
//!
//! Backs the pipeline and end-to-end tests. Supports the
//! subset of the query language the pipeline emits (`match_all`,
//! `term`, `terms`) and enough mapping enforcement to reject numeric
//! fields holding non-numeric values, which is how bulk item failures
//! are produced in tests. Failures can also be injected directly.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use rand::seq::SliceRandom;
use serde_json::{json, Map, Value};
use tracing::debug;

use reindex_types::{flatten_source, Document, FieldDescriptor, FlatDocument, Hit};

use crate::backend::{
    BulkItemResult, BulkResponse, SampleRequest, ScrollPage, ScrollRequest, SearchBackend,
};
use crate::error::BackendError;
use crate::mapping::{fields_from_properties, index_properties};

const NUMERIC_TYPES: &[&str] = &[
    "long",
    "integer",
    "short",
    "byte",
    "double",
    "float",
    "half_float",
    "scaled_float",
];

#[derive(Debug, Default)]
struct IndexState {
    fields: Vec<FieldDescriptor>,
    /// Body passed to `create_index`, when created through the backend
    mapping: Option<Value>,
    documents: Vec<(String, Value)>,
}

#[derive(Debug)]
struct ScrollContext {
    remaining: VecDeque<Hit>,
    size: usize,
    pages_served: usize,
}

#[derive(Debug, Default)]
struct State {
    indices: HashMap<String, IndexState>,
    scrolls: HashMap<String, ScrollContext>,
    cleared_scrolls: Vec<String>,
    next_scroll: u64,
    next_document: u64,
    expire_scroll_after: Option<usize>,
    failing_bulks: usize,
    reject_rules: Vec<(String, Value)>,
    bulk_calls: Vec<usize>,
}

/// [`SearchBackend`] holding indices in memory.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<State>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a source index with the given mapping fields.
    pub fn add_index(&self, name: impl Into<String>, fields: Vec<FieldDescriptor>) {
        let mut state = self.state();
        state.indices.entry(name.into()).or_default().fields = fields;
    }

    /// Store a source document. `source` may be nested or use dotted keys.
    pub fn insert_document(&self, index: &str, id: impl Into<String>, source: Value) {
        let mut state = self.state();
        state
            .indices
            .entry(index.to_string())
            .or_default()
            .documents
            .push((id.into(), source));
    }

    /// Let `pages` pages be served per scroll, then expire the context.
    pub fn expire_scroll_after(&self, pages: usize) {
        self.state().expire_scroll_after = Some(pages);
    }

    /// Fail the next bulk request as a whole.
    pub fn fail_next_bulk(&self) {
        self.state().failing_bulks += 1;
    }

    /// Reject any written document whose `path` holds `value`.
    pub fn reject_where(&self, path: impl Into<String>, value: Value) {
        self.state().reject_rules.push((path.into(), value));
    }

    pub fn index_exists(&self, index: &str) -> bool {
        self.state().indices.contains_key(index)
    }

    /// Stored documents of `index`, in insertion order.
    pub fn documents(&self, index: &str) -> Vec<Value> {
        self.state()
            .indices
            .get(index)
            .map(|state| state.documents.iter().map(|(_, doc)| doc.clone()).collect())
            .unwrap_or_default()
    }

    /// Body `index` was created with.
    pub fn created_mapping(&self, index: &str) -> Option<Value> {
        self.state()
            .indices
            .get(index)
            .and_then(|state| state.mapping.clone())
    }

    /// Document count of each bulk request received, in order.
    pub fn bulk_call_sizes(&self) -> Vec<usize> {
        self.state().bulk_calls.clone()
    }

    /// Scroll contexts currently held open.
    pub fn open_scroll_count(&self) -> usize {
        self.state().scrolls.len()
    }

    /// Scroll handles released through `clear_scroll`.
    pub fn cleared_scrolls(&self) -> Vec<String> {
        self.state().cleared_scrolls.clone()
    }
}

fn matching_hits(
    state: &State,
    indices: &[String],
    query: &Value,
    fields: &[String],
) -> Result<Vec<Hit>, BackendError> {
    let mut hits = Vec::new();
    for name in indices {
        let index = state
            .indices
            .get(name)
            .ok_or_else(|| BackendError::IndexNotFound(name.clone()))?;
        for (id, source) in &index.documents {
            let flat = match source {
                Value::Object(map) => flatten_source(map),
                _ => Map::new(),
            };
            if matches_query(query, &flat)? {
                hits.push(Hit::new(id.clone(), project(flat, fields)));
            }
        }
    }
    Ok(hits)
}

fn project(source: FlatDocument, fields: &[String]) -> FlatDocument {
    if fields.is_empty() {
        return source;
    }
    source
        .into_iter()
        .filter(|(key, _)| {
            fields.iter().any(|field| {
                key == field
                    || key
                        .strip_prefix(field.as_str())
                        .is_some_and(|rest| rest.starts_with('.'))
            })
        })
        .collect()
}

fn matches_query(query: &Value, source: &FlatDocument) -> Result<bool, BackendError> {
    let clause = match query.get("query") {
        Some(inner) => inner,
        None => query,
    };
    let Some((kind, body)) = clause.as_object().and_then(|map| map.iter().next()) else {
        // null or {} behave as match_all
        return Ok(true);
    };

    match kind.as_str() {
        "match_all" => Ok(true),
        "term" => {
            let (field, expected) = single_entry(body, kind)?;
            let expected = expected.get("value").unwrap_or(expected);
            Ok(field_has(source, field, expected))
        }
        "terms" => {
            let (field, expected) = single_entry(body, kind)?;
            let candidates = expected.as_array().ok_or_else(|| {
                BackendError::Unsupported(format!("terms on {field} needs an array"))
            })?;
            Ok(candidates
                .iter()
                .any(|candidate| field_has(source, field, candidate)))
        }
        other => Err(BackendError::Unsupported(format!(
            "query type {other} is not supported in memory"
        ))),
    }
}

fn single_entry<'a>(body: &'a Value, kind: &str) -> Result<(&'a str, &'a Value), BackendError> {
    body.as_object()
        .and_then(|map| map.iter().next())
        .map(|(field, value)| (field.as_str(), value))
        .ok_or_else(|| BackendError::Unsupported(format!("malformed {kind} query")))
}

fn field_has(source: &FlatDocument, field: &str, expected: &Value) -> bool {
    match source.get(field) {
        Some(Value::Array(values)) => values.contains(expected),
        Some(value) => value == expected,
        None => false,
    }
}

fn numeric_fields(mapping: Option<&Value>) -> Vec<String> {
    mapping
        .and_then(index_properties)
        .map(fields_from_properties)
        .unwrap_or_default()
        .into_iter()
        .filter(|field| NUMERIC_TYPES.contains(&field.field_type.as_str()))
        .map(|field| field.path)
        .collect()
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) | Value::Null => true,
        Value::String(text) => text.parse::<f64>().is_ok(),
        Value::Array(values) => values.iter().all(is_numeric),
        _ => false,
    }
}

fn check_document(
    flat: &FlatDocument,
    numeric: &[String],
    reject_rules: &[(String, Value)],
) -> Option<String> {
    for path in numeric {
        if let Some(value) = flat.get(path) {
            if !is_numeric(value) {
                return Some(format!(
                    "mapper_parsing_exception: failed to parse field [{path}] of numeric type"
                ));
            }
        }
    }
    reject_rules
        .iter()
        .find(|(path, value)| flat.get(path) == Some(value))
        .map(|(path, _)| format!("document_rejected: field [{path}] is rejected"))
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn field_mapping(&self, index: &str) -> Result<Vec<FieldDescriptor>, BackendError> {
        let state = self.state();
        let index_state = state
            .indices
            .get(index)
            .ok_or_else(|| BackendError::IndexNotFound(index.to_string()))?;
        match (&index_state.mapping, index_state.fields.is_empty()) {
            (Some(mapping), true) => Ok(index_properties(mapping)
                .map(fields_from_properties)
                .unwrap_or_default()),
            _ => Ok(index_state.fields.clone()),
        }
    }

    async fn create_index(&self, index: &str, body: Value) -> Result<(), BackendError> {
        let mut state = self.state();
        if state.indices.contains_key(index) {
            return Err(BackendError::IndexAlreadyExists(index.to_string()));
        }
        let fields = index_properties(&body)
            .map(fields_from_properties)
            .unwrap_or_default();
        state.indices.insert(
            index.to_string(),
            IndexState {
                fields,
                mapping: Some(body),
                documents: Vec::new(),
            },
        );
        debug!(index = %index, "Created in-memory index");
        Ok(())
    }

    async fn open_scroll(&self, request: &ScrollRequest) -> Result<ScrollPage, BackendError> {
        if request.size == 0 {
            return Err(BackendError::Unsupported("scroll size must be > 0".to_string()));
        }
        let mut state = self.state();
        let hits = matching_hits(&state, &request.indices, &request.query, &request.fields)?;
        let total_hits = hits.len() as u64;
        let mut remaining: VecDeque<Hit> = hits.into();
        let page: Vec<Hit> = remaining
            .drain(..request.size.min(remaining.len()))
            .collect();

        state.next_scroll += 1;
        let scroll_id = format!("scroll-{}", state.next_scroll);
        state.scrolls.insert(
            scroll_id.clone(),
            ScrollContext {
                remaining,
                size: request.size,
                pages_served: 1,
            },
        );

        Ok(ScrollPage {
            scroll_id: Some(scroll_id),
            total_hits: Some(total_hits),
            hits: page,
        })
    }

    async fn continue_scroll(&self, scroll_id: &str) -> Result<ScrollPage, BackendError> {
        let mut state = self.state();
        let expire_after = state.expire_scroll_after;
        let context = state
            .scrolls
            .get_mut(scroll_id)
            .ok_or_else(|| BackendError::ScrollExpired(scroll_id.to_string()))?;

        if expire_after.is_some_and(|limit| context.pages_served >= limit) {
            state.scrolls.remove(scroll_id);
            return Err(BackendError::ScrollExpired(scroll_id.to_string()));
        }

        let take = context.size.min(context.remaining.len());
        let hits: Vec<Hit> = context.remaining.drain(..take).collect();
        context.pages_served += 1;

        Ok(ScrollPage {
            scroll_id: Some(scroll_id.to_string()),
            total_hits: None,
            hits,
        })
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), BackendError> {
        let mut state = self.state();
        state.scrolls.remove(scroll_id);
        state.cleared_scrolls.push(scroll_id.to_string());
        Ok(())
    }

    async fn random_sample(&self, request: &SampleRequest) -> Result<Vec<Hit>, BackendError> {
        let state = self.state();
        let mut hits = matching_hits(&state, &request.indices, &request.query, &request.fields)?;
        hits.retain(|hit| !request.exclude_ids.contains(&hit.id));
        hits.shuffle(&mut rand::rng());
        hits.truncate(request.size);
        Ok(hits)
    }

    async fn bulk_create(
        &self,
        index: &str,
        documents: Vec<Document>,
    ) -> Result<BulkResponse, BackendError> {
        let mut state = self.state();
        state.bulk_calls.push(documents.len());

        if state.failing_bulks > 0 {
            state.failing_bulks -= 1;
            return Err(BackendError::Transport(
                "connection reset during bulk request".to_string(),
            ));
        }

        let State {
            indices,
            reject_rules,
            next_document,
            ..
        } = &mut *state;
        let target = indices
            .get_mut(index)
            .ok_or_else(|| BackendError::IndexNotFound(index.to_string()))?;
        let numeric = numeric_fields(target.mapping.as_ref());

        let mut items = Vec::with_capacity(documents.len());
        for document in documents {
            let flat = match &document {
                Document::Nested(map) => flatten_source(map),
                Document::Flat(map) => map.clone(),
            };
            if let Some(reason) = check_document(&flat, &numeric, reject_rules) {
                items.push(BulkItemResult::rejected(400, reason));
                continue;
            }
            *next_document += 1;
            let id = format!("doc-{next_document}");
            target.documents.push((id.clone(), document.into_value()));
            items.push(BulkItemResult::created(id));
        }

        Ok(BulkResponse { items })
    }

    async fn health(&self) -> Result<Value, BackendError> {
        Ok(json!({
            "cluster_name": "in-memory",
            "status": "green",
            "indices": self.state().indices.len(),
        }))
    }
}
