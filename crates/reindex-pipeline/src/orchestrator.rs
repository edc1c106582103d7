//! Runs a reindex job end to end.
//!
//! Resolves the field schema, creates the destination index, then streams
//! the source through transform and bulk write one batch at a time. The
//! job record is updated in place: status, step, percent, error log and
//! written count. Any fatal error marks the job failed and stops the
//! stream; documents already written stay written.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use reindex_backend::SearchBackend;
use reindex_types::{ErrorKind, FieldDescriptor, JobStatus, ReindexJob, Settings, TypesError};

use crate::bulk::{BulkWriter, WriteReport};
use crate::cursor::{CursorOptions, ScrollCursor};
use crate::error::ReindexError;
use crate::materialize::{IndexMaterializer, DEFAULT_ANNOTATION_FIELD};
use crate::progress::{NoOpProgressReporter, ProgressReporter};
use crate::schema::FieldSchemaResolver;
use crate::transform::DocumentTransformer;

pub const STEP_RESOLVING: &str = "resolving schema";
pub const STEP_CREATING: &str = "creating index";
pub const STEP_SCROLLING: &str = "scrolling data";
pub const STEP_DONE: &str = "done";

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Name of the annotation field added by `add_facts_mapping`
    pub annotation_field: String,
    /// Source document identifiers never copied
    pub exclude_ids: HashSet<String>,
    /// Stop after this many source documents
    pub limit: Option<u64>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            annotation_field: DEFAULT_ANNOTATION_FIELD.to_string(),
            exclude_ids: HashSet::new(),
            limit: None,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            annotation_field: settings.annotation_field.clone(),
            ..Default::default()
        }
    }

    pub fn with_annotation_field(mut self, field_name: impl Into<String>) -> Self {
        self.annotation_field = field_name.into();
        self
    }

    pub fn with_exclude_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }
}

pub struct ReindexOrchestrator {
    backend: Arc<dyn SearchBackend>,
    reporter: Arc<dyn ProgressReporter>,
    config: OrchestratorConfig,
}

impl ReindexOrchestrator {
    pub fn new(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            backend,
            reporter: Arc::new(NoOpProgressReporter),
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run `job` to completion or failure.
    ///
    /// Only a job in `Created` is accepted; anything else is refused with
    /// an invalid-transition error and left untouched. On failure the job
    /// ends `Failed` with the error appended to its log, and the error is
    /// returned as well.
    pub async fn run(&self, job: &mut ReindexJob) -> Result<WriteReport, ReindexError> {
        if job.status != JobStatus::Created {
            return Err(TypesError::InvalidTransition {
                from: job.status,
                to: JobStatus::SchemaResolved,
            }
            .into());
        }

        info!(job = %job.id, indices = ?job.indices, new_index = %job.new_index, "Starting reindex");
        match self.execute(job).await {
            Ok(report) => {
                info!(
                    job = %job.id,
                    written = report.documents_written,
                    chunks = report.chunks,
                    rejected = report.failures.len(),
                    "Reindex completed"
                );
                Ok(report)
            }
            Err(err) => {
                self.fail(job, &err);
                Err(err)
            }
        }
    }

    async fn execute(&self, job: &mut ReindexJob) -> Result<WriteReport, ReindexError> {
        job.validate()?;

        self.step(job, STEP_RESOLVING);
        let resolution = FieldSchemaResolver::new(self.backend.as_ref())
            .resolve(&job.indices, &job.fields, &job.field_type)
            .await?;
        if !resolution.conflicts.is_empty() {
            for conflict in &resolution.conflicts {
                job.record_error(ErrorKind::SchemaConflict, conflict.to_string());
            }
            self.reporter.update_errors(&job.error_messages());
        }
        self.advance(job, JobStatus::SchemaResolved)?;

        self.step(job, STEP_CREATING);
        IndexMaterializer::new(self.backend.as_ref())
            .with_annotation_field(self.config.annotation_field.as_str())
            .create(&job.new_index, &resolution.fields, job.add_facts_mapping)
            .await?;
        self.advance(job, JobStatus::IndexCreated)?;

        self.step(job, STEP_SCROLLING);
        self.advance(job, JobStatus::Streaming)?;
        let report = self.stream(job, &resolution.fields).await?;

        self.step(job, STEP_DONE);
        job.set_percent(100);
        self.reporter.update_view(100);
        self.advance(job, JobStatus::Completed)?;
        Ok(report)
    }

    async fn stream(
        &self,
        job: &mut ReindexJob,
        fields: &[FieldDescriptor],
    ) -> Result<WriteReport, ReindexError> {
        let options = CursorOptions::new(job.indices.clone(), job.scroll_size)
            .with_fields(fields.iter().map(|field| field.path.clone()).collect())
            .with_query(job.query.clone())
            .with_random_size(job.random_size)
            .with_exclude_ids(self.config.exclude_ids.clone())
            .with_limit(self.config.limit);

        let reporter = Arc::clone(&self.reporter);
        let mut cursor = ScrollCursor::open(self.backend.as_ref(), options)
            .await?
            .with_progress(move |percent| reporter.update_view(percent));

        let transformer = DocumentTransformer::new(job.flatten);
        let mut writer = BulkWriter::new(self.backend.as_ref(), job.new_index.clone(), job.scroll_size);
        let mut batch = 0u64;

        while let Some(hits) = cursor.next_batch().await? {
            batch += 1;
            let reported = writer.report().failures.len();
            let batch_start = writer.report().documents_sent();

            let mut written = Ok(());
            for document in transformer.transform_hits(&hits) {
                written = writer.push(document).await;
                if written.is_err() {
                    break;
                }
            }
            if written.is_ok() {
                written = writer.flush().await;
            }
            if let Err(err) = written {
                cursor.close().await;
                return Err(err.into());
            }

            let new_failures = &writer.report().failures[reported..];
            for failure in new_failures {
                let source_id = failure
                    .position
                    .checked_sub(batch_start)
                    .and_then(|offset| usize::try_from(offset).ok())
                    .and_then(|offset| hits.get(offset))
                    .map_or("unknown", |hit| hit.id.as_str());
                job.record_error(
                    ErrorKind::BulkItemFailure,
                    format!(
                        "document {} (source id {}): {}",
                        failure.position, source_id, failure.reason
                    ),
                );
            }
            if !new_failures.is_empty() {
                self.reporter.update_errors(&job.error_messages());
            }
            job.documents_written = writer.report().documents_written;
            job.set_percent(cursor.percent());
            debug!(
                job = %job.id,
                batch,
                documents = hits.len(),
                written = job.documents_written,
                percent = job.progress.percent,
                "Batch written"
            );
        }

        let report = writer.finish().await?;
        job.documents_written = report.documents_written;
        Ok(report)
    }

    fn step(&self, job: &mut ReindexJob, step: &str) {
        job.set_step(step);
        self.reporter.update_step(step);
    }

    fn advance(&self, job: &mut ReindexJob, status: JobStatus) -> Result<(), ReindexError> {
        job.transition(status)?;
        self.reporter.update_status(status);
        debug!(job = %job.id, status = %status, "Job status changed");
        Ok(())
    }

    fn fail(&self, job: &mut ReindexJob, err: &ReindexError) {
        job.record_error(err.kind(), err.to_string());
        if let Err(transition) = job.transition(JobStatus::Failed) {
            warn!(job = %job.id, error = %transition, "Could not mark job failed");
        }
        self.reporter.update_errors(&job.error_messages());
        self.reporter.update_status(job.status);
        error!(job = %job.id, kind = %err.kind(), error = %err, "Reindex failed");
    }
}
