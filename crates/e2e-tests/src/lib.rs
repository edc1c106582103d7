//! End-to-end test infrastructure for the reindex pipeline.
//!
//! Provides a shared TestHarness over the in-memory engine and helper
//! functions for setting up source indices and inspecting results.

use std::sync::Arc;

use serde_json::{json, Value};

use reindex_backend::InMemoryBackend;
use reindex_pipeline::{
    OrchestratorConfig, RecordingProgressReporter, ReindexError, ReindexOrchestrator, WriteReport,
};
use reindex_types::{ErrorKind, FieldDescriptor, ReindexJob};

/// Shared test harness for E2E tests.
///
/// Holds the engine and a reporter recording every progress call.
pub struct TestHarness {
    pub backend: Arc<InMemoryBackend>,
    pub reporter: Arc<RecordingProgressReporter>,
    pub config: OrchestratorConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            backend: Arc::new(InMemoryBackend::new()),
            reporter: Arc::new(RecordingProgressReporter::new()),
            config: OrchestratorConfig::default(),
        }
    }

    /// Register a source index and its documents. Documents get ids
    /// `<index>-<n>`.
    pub fn with_source(self, index: &str, fields: &[(&str, &str)], documents: Vec<Value>) -> Self {
        self.backend.add_index(
            index,
            fields
                .iter()
                .map(|(path, field_type)| FieldDescriptor::new(*path, *field_type))
                .collect(),
        );
        for (n, document) in documents.into_iter().enumerate() {
            self.backend
                .insert_document(index, format!("{index}-{n}"), document);
        }
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn orchestrator(&self) -> ReindexOrchestrator {
        ReindexOrchestrator::new(self.backend.clone())
            .with_reporter(self.reporter.clone())
            .with_config(self.config.clone())
    }

    pub async fn run(&self, job: &mut ReindexJob) -> Result<WriteReport, ReindexError> {
        self.orchestrator().run(job).await
    }

    /// Documents stored in `index`, in write order.
    pub fn written(&self, index: &str) -> Vec<Value> {
        self.backend.documents(index)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A job over `indices` into `new_index`.
pub fn job(indices: &[&str], new_index: &str) -> ReindexJob {
    ReindexJob::new(
        indices.iter().map(|index| index.to_string()).collect(),
        new_index,
    )
}

/// `count` documents of the form `{"n": i, "meta.parity": "even"|"odd"}`.
pub fn numbered_docs(count: usize) -> Vec<Value> {
    (0..count)
        .map(|n| {
            json!({
                "n": n,
                "meta.parity": if n % 2 == 0 { "even" } else { "odd" }
            })
        })
        .collect()
}

/// Field list matching [`numbered_docs`].
pub const NUMBERED_FIELDS: &[(&str, &str)] = &[("n", "long"), ("meta.parity", "keyword")];

/// Kinds of the job error log, in order.
pub fn error_kinds(job: &ReindexJob) -> Vec<ErrorKind> {
    job.errors.iter().map(|entry| entry.kind).collect()
}
