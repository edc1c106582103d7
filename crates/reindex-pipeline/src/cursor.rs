//! Lazy, single-pass retrieval of source documents.
//!
//! A [`ScrollCursor`] either pages through the engine's scroll API or
//! fetches one random sample. Batches are filled from a pending queue so
//! excluded documents never make a batch smaller than `batch_size`.
//! Once exhausted or aborted the cursor is closed for good.

use std::collections::{HashSet, VecDeque};

use serde_json::{json, Value};
use tracing::{debug, warn};

use reindex_backend::{SampleRequest, ScrollRequest, SearchBackend};
use reindex_types::Hit;

use crate::error::CursorError;

/// Everything needed to open a cursor.
#[derive(Debug, Clone)]
pub struct CursorOptions {
    pub indices: Vec<String>,
    /// Source fields to retrieve; empty retrieves whole documents
    pub fields: Vec<String>,
    pub query: Value,
    /// Maximum documents per batch
    pub batch_size: usize,
    /// Document identifiers to skip
    pub exclude_ids: HashSet<String>,
    /// Sample size; 0 pages through everything instead
    pub random_size: usize,
    /// Stop after this many documents in total
    pub limit: Option<u64>,
}

impl CursorOptions {
    pub fn new(indices: Vec<String>, batch_size: usize) -> Self {
        Self {
            indices,
            fields: Vec::new(),
            query: json!({"query": {"match_all": {}}}),
            batch_size,
            exclude_ids: HashSet::new(),
            random_size: 0,
            limit: None,
        }
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    pub fn with_exclude_ids(mut self, exclude_ids: HashSet<String>) -> Self {
        self.exclude_ids = exclude_ids;
        self
    }

    pub fn with_random_size(mut self, random_size: usize) -> Self {
        self.random_size = random_size;
        self
    }

    pub fn with_limit(mut self, limit: Option<u64>) -> Self {
        self.limit = limit;
        self
    }
}

/// Cursor bookkeeping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrollState {
    /// Engine scroll handle, while one is held
    pub handle: Option<String>,
    /// Terminal once set
    pub exhausted: bool,
    /// Documents handed out so far
    pub consumed: u64,
}

type ProgressFn<'a> = Box<dyn Fn(u8) + Send + Sync + 'a>;

pub struct ScrollCursor<'a> {
    backend: &'a dyn SearchBackend,
    options: CursorOptions,
    state: ScrollState,
    pending: VecDeque<Hit>,
    /// Engine estimate of matching documents
    total: Option<u64>,
    /// No more pages to fetch
    drained: bool,
    /// Exhausted or aborted
    closed: bool,
    on_progress: Option<ProgressFn<'a>>,
}

impl<'a> ScrollCursor<'a> {
    /// Run the query and buffer its first page.
    pub async fn open(
        backend: &'a dyn SearchBackend,
        options: CursorOptions,
    ) -> Result<ScrollCursor<'a>, CursorError> {
        let mut cursor = Self {
            backend,
            options,
            state: ScrollState::default(),
            pending: VecDeque::new(),
            total: None,
            drained: false,
            closed: false,
            on_progress: None,
        };

        if cursor.options.random_size > 0 {
            cursor.open_sample().await?;
        } else {
            cursor.open_scroll().await?;
        }
        Ok(cursor)
    }

    /// Called with the completion percentage after each batch.
    pub fn with_progress(mut self, callback: impl Fn(u8) + Send + Sync + 'a) -> Self {
        self.on_progress = Some(Box::new(callback));
        self
    }

    async fn open_sample(&mut self) -> Result<(), CursorError> {
        let mut exclude_ids: Vec<String> = self.options.exclude_ids.iter().cloned().collect();
        exclude_ids.sort_unstable();
        let request = SampleRequest {
            indices: self.options.indices.clone(),
            fields: self.options.fields.clone(),
            query: self.options.query.clone(),
            size: self.options.random_size,
            exclude_ids,
        };
        let hits = self.backend.random_sample(&request).await?;

        let mut seen = HashSet::new();
        for hit in hits {
            if seen.insert(hit.id.clone()) && !self.options.exclude_ids.contains(&hit.id) {
                self.pending.push_back(hit);
            }
        }
        self.total = Some(self.pending.len() as u64);
        self.drained = true;
        debug!(
            indices = ?self.options.indices,
            sample = self.pending.len(),
            "Opened random sample"
        );
        Ok(())
    }

    async fn open_scroll(&mut self) -> Result<(), CursorError> {
        let request = ScrollRequest {
            indices: self.options.indices.clone(),
            fields: self.options.fields.clone(),
            query: self.options.query.clone(),
            size: self.options.batch_size,
        };
        let page = self.backend.open_scroll(&request).await?;

        self.total = page.total_hits;
        self.state.handle = page.scroll_id;
        self.drained = page.hits.is_empty() || self.state.handle.is_none();
        self.enqueue(page.hits);
        debug!(
            indices = ?self.options.indices,
            total = ?self.total,
            "Opened scroll"
        );
        Ok(())
    }

    fn enqueue(&mut self, hits: Vec<Hit>) {
        let exclude = &self.options.exclude_ids;
        self.pending
            .extend(hits.into_iter().filter(|hit| !exclude.contains(&hit.id)));
    }

    fn remaining_allowance(&self) -> u64 {
        match self.options.limit {
            Some(limit) => limit.saturating_sub(self.state.consumed),
            None => u64::MAX,
        }
    }

    async fn fetch_page(&mut self) -> Result<(), CursorError> {
        let Some(handle) = self.state.handle.clone() else {
            self.drained = true;
            return Ok(());
        };
        let page = self.backend.continue_scroll(&handle).await?;
        if let Some(next) = page.scroll_id {
            self.state.handle = Some(next);
        }
        if page.hits.is_empty() {
            self.drained = true;
        }
        self.enqueue(page.hits);
        Ok(())
    }

    /// Next batch of at most `batch_size` documents, or `None` once the
    /// result set is exhausted.
    ///
    /// Any fetch error aborts the cursor; a fresh cursor has to be opened
    /// to retry.
    pub async fn next_batch(&mut self) -> Result<Option<Vec<Hit>>, CursorError> {
        if self.closed {
            return Err(CursorError::Closed);
        }

        let batch_size = self.options.batch_size.max(1);
        while self.pending.len() < batch_size && !self.drained && self.remaining_allowance() > 0
        {
            if let Err(err) = self.fetch_page().await {
                warn!(error = %err, consumed = self.state.consumed, "Scroll aborted");
                self.release().await;
                self.closed = true;
                return Err(err);
            }
        }

        let allowance = usize::try_from(self.remaining_allowance()).unwrap_or(usize::MAX);
        let take = batch_size.min(self.pending.len()).min(allowance);
        if take == 0 {
            self.finish().await;
            return Ok(None);
        }

        let batch: Vec<Hit> = self.pending.drain(..take).collect();
        self.state.consumed += batch.len() as u64;
        self.report(self.percent());
        Ok(Some(batch))
    }

    /// Completion estimate. Stays below 100 until the cursor is exhausted.
    pub fn percent(&self) -> u8 {
        if self.state.exhausted {
            return 100;
        }
        let total = match (self.total, self.options.limit) {
            (Some(total), Some(limit)) => total.min(limit),
            (Some(total), None) => total,
            (None, Some(limit)) => limit,
            (None, None) => return 0,
        };
        if total == 0 {
            return 0;
        }
        let percent = self.state.consumed.saturating_mul(100) / total;
        u8::try_from(percent.min(99)).unwrap_or(99)
    }

    pub fn state(&self) -> &ScrollState {
        &self.state
    }

    /// Engine-reported total, when known.
    pub fn total(&self) -> Option<u64> {
        self.total
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Abort early and release the server-side context.
    pub async fn close(&mut self) {
        if !self.closed {
            self.release().await;
            self.closed = true;
            self.pending.clear();
        }
    }

    async fn finish(&mut self) {
        self.release().await;
        self.closed = true;
        self.state.exhausted = true;
        self.report(100);
        debug!(consumed = self.state.consumed, "Cursor exhausted");
    }

    async fn release(&mut self) {
        if let Some(handle) = self.state.handle.take() {
            if let Err(err) = self.backend.clear_scroll(&handle).await {
                warn!(error = %err, "Failed to clear scroll context");
            }
        }
    }

    fn report(&self, percent: u8) {
        if let Some(callback) = &self.on_progress {
            callback(percent);
        }
    }
}
