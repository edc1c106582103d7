//! Progress reporting towards the external job record.

use std::sync::{Mutex, PoisonError};

use tracing::info;

use reindex_types::JobStatus;

/// Receives job progress as the orchestrator moves through its stages.
///
/// Called at every state transition and after every batch.
pub trait ProgressReporter: Send + Sync {
    /// Name of the stage now running.
    fn update_step(&self, step: &str);

    /// Completion estimate, 0..=100.
    fn update_view(&self, percent: u8);

    /// Full error log, rendered as `Kind: message` lines.
    fn update_errors(&self, errors: &[String]);

    /// New job status.
    fn update_status(&self, _status: JobStatus) {}
}

/// A no-op reporter for when progress reporting isn't needed.
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn update_step(&self, _step: &str) {}
    fn update_view(&self, _percent: u8) {}
    fn update_errors(&self, _errors: &[String]) {}
}

/// A reporter that logs progress at info level.
pub struct LoggingProgressReporter {
    job_id: String,
}

impl LoggingProgressReporter {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
        }
    }
}

impl ProgressReporter for LoggingProgressReporter {
    fn update_step(&self, step: &str) {
        info!(job = %self.job_id, step = %step, "Job step");
    }

    fn update_view(&self, percent: u8) {
        info!(job = %self.job_id, percent, "Job progress");
    }

    fn update_errors(&self, errors: &[String]) {
        info!(
            job = %self.job_id,
            errors = errors.len(),
            last = errors.last().map(String::as_str).unwrap_or(""),
            "Job errors"
        );
    }

    fn update_status(&self, status: JobStatus) {
        info!(job = %self.job_id, status = %status, "Job status");
    }
}

/// One call received by a [`RecordingProgressReporter`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Step(String),
    View(u8),
    Errors(Vec<String>),
    Status(JobStatus),
}

/// Keeps every call in order. Used to inspect runs after the fact.
#[derive(Debug, Default)]
pub struct RecordingProgressReporter {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingProgressReporter {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, event: ProgressEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Step names in the order they were reported.
    pub fn steps(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Step(step) => Some(step),
                _ => None,
            })
            .collect()
    }

    /// Percentages in the order they were reported.
    pub fn views(&self) -> Vec<u8> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::View(percent) => Some(percent),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self) -> Vec<JobStatus> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ProgressEvent::Status(status) => Some(status),
                _ => None,
            })
            .collect()
    }
}

impl ProgressReporter for RecordingProgressReporter {
    fn update_step(&self, step: &str) {
        self.push(ProgressEvent::Step(step.to_string()));
    }

    fn update_view(&self, percent: u8) {
        self.push(ProgressEvent::View(percent));
    }

    fn update_errors(&self, errors: &[String]) {
        self.push(ProgressEvent::Errors(errors.to_vec()));
    }

    fn update_status(&self, status: JobStatus) {
        self.push(ProgressEvent::Status(status));
    }
}
