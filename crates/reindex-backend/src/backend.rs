//! The search engine boundary.
//!
//! Everything the pipeline needs from the engine goes through
//! [`SearchBackend`]: mapping introspection, index creation, scroll
//! pagination, random sampling and bulk creates.

use async_trait::async_trait;
use serde_json::Value;

use reindex_types::{Document, FieldDescriptor, Hit};

use crate::error::BackendError;

/// A paginated query against one or more indices.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollRequest {
    pub indices: Vec<String>,
    /// Source fields to return; empty returns the whole document
    pub fields: Vec<String>,
    /// Engine query document, e.g. `{"query": {"match_all": {}}}`
    pub query: Value,
    /// Page size
    pub size: usize,
}

/// One page of a scroll.
#[derive(Debug, Clone, Default)]
pub struct ScrollPage {
    /// Handle for the next page; absent when the engine closed the scroll
    pub scroll_id: Option<String>,
    /// Total hit estimate, when the engine reports one
    pub total_hits: Option<u64>,
    pub hits: Vec<Hit>,
}

/// A single randomized-order query.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRequest {
    pub indices: Vec<String>,
    pub fields: Vec<String>,
    pub query: Value,
    /// Maximum number of documents to return
    pub size: usize,
    /// Identifiers left out before the sample is drawn
    pub exclude_ids: Vec<String>,
}

/// Outcome of one document inside a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemResult {
    /// HTTP-style status of the item
    pub status: u16,
    /// Engine-assigned identifier, when created
    pub id: Option<String>,
    /// Failure reason, when rejected
    pub error: Option<String>,
}

impl BulkItemResult {
    pub fn created(id: impl Into<String>) -> Self {
        Self {
            status: 201,
            id: Some(id.into()),
            error: None,
        }
    }

    pub fn rejected(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            id: None,
            error: Some(reason.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none() && (200..300).contains(&self.status)
    }
}

/// Per-item results of a bulk request, in request order.
#[derive(Debug, Clone, Default)]
pub struct BulkResponse {
    pub items: Vec<BulkItemResult>,
}

impl BulkResponse {
    pub fn has_failures(&self) -> bool {
        self.items.iter().any(|item| !item.is_success())
    }

    /// (position within the request, reason) for each rejected item.
    pub fn failures(&self) -> impl Iterator<Item = (usize, &str)> {
        self.items.iter().enumerate().filter_map(|(position, item)| {
            if item.is_success() {
                None
            } else {
                Some((position, item.error.as_deref().unwrap_or("unknown error")))
            }
        })
    }
}

/// Operations the reindex pipeline consumes from a search engine.
///
/// Implementations must be shareable across concurrently running jobs.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Leaf fields of an index mapping, in declaration order.
    async fn field_mapping(&self, index: &str) -> Result<Vec<FieldDescriptor>, BackendError>;

    /// Create an index with the given body (`{"mappings": ...}`).
    ///
    /// Returns [`BackendError::IndexAlreadyExists`] when the name is taken.
    async fn create_index(&self, index: &str, body: Value) -> Result<(), BackendError>;

    /// Run a query and return its first page plus a scroll handle.
    async fn open_scroll(&self, request: &ScrollRequest) -> Result<ScrollPage, BackendError>;

    /// Fetch the page after the one last returned for `scroll_id`.
    async fn continue_scroll(&self, scroll_id: &str) -> Result<ScrollPage, BackendError>;

    /// Release a scroll context.
    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), BackendError>;

    /// Return up to `size` matching documents in random order.
    async fn random_sample(&self, request: &SampleRequest) -> Result<Vec<Hit>, BackendError>;

    /// Create `documents` in `index` with engine-assigned identifiers.
    ///
    /// Item failures are reported in the response; only a failure of the
    /// request as a whole is an `Err`.
    async fn bulk_create(
        &self,
        index: &str,
        documents: Vec<Document>,
    ) -> Result<BulkResponse, BackendError>;

    /// Cluster info, used as a liveness probe.
    async fn health(&self) -> Result<Value, BackendError>;
}
