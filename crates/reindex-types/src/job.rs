//! Reindex job record.
//!
//! The job is the unit of work. Its status only ever moves forward:
//! `Created -> SchemaResolved -> IndexCreated -> Streaming -> Completed`,
//! with `Failed` reachable from any non-terminal state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::TypesError;

/// Batch size used when a job does not specify one.
pub const DEFAULT_SCROLL_SIZE: usize = 500;

/// Lifecycle state of a reindex job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    SchemaResolved,
    IndexCreated,
    Streaming,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Created => "created",
            JobStatus::SchemaResolved => "schema_resolved",
            JobStatus::IndexCreated => "index_created",
            JobStatus::Streaming => "streaming",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// Completed and Failed accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    fn stage(&self) -> u8 {
        match self {
            JobStatus::Created => 0,
            JobStatus::SchemaResolved => 1,
            JobStatus::IndexCreated => 2,
            JobStatus::Streaming => 3,
            JobStatus::Completed => 4,
            JobStatus::Failed => u8::MAX,
        }
    }

    /// Whether `next` is the single legal successor of this status.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            JobStatus::Failed => true,
            _ => next.stage() == self.stage() + 1,
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy recorded in the job error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Two source indices disagree on a field type (recoverable)
    SchemaConflict,
    /// No usable field set could be resolved
    SchemaResolution,
    /// The job definition itself is unusable
    InvalidJob,
    /// Destination index name violates engine naming rules
    InvalidIndexName,
    /// Destination index already exists
    IndexAlreadyExists,
    /// Server-side scroll context expired mid-stream
    ScrollExpired,
    /// Transport or protocol failure talking to the engine
    BackendTransportError,
    /// A single document was rejected by a bulk request (recoverable)
    BulkItemFailure,
    /// Anything else
    UnexpectedError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SchemaConflict => "SchemaConflict",
            ErrorKind::SchemaResolution => "SchemaResolution",
            ErrorKind::InvalidJob => "InvalidJob",
            ErrorKind::InvalidIndexName => "InvalidIndexName",
            ErrorKind::IndexAlreadyExists => "IndexAlreadyExists",
            ErrorKind::ScrollExpired => "ScrollExpired",
            ErrorKind::BackendTransportError => "BackendTransportError",
            ErrorKind::BulkItemFailure => "BulkItemFailure",
            ErrorKind::UnexpectedError => "UnexpectedError",
        }
    }

    /// Fatal kinds stop the job; the rest are absorbed and logged.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorKind::SchemaConflict | ErrorKind::BulkItemFailure)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of the job error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub at: DateTime<Utc>,
}

impl fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

/// Current step and completion percentage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub step: String,
    /// 0..=100
    pub percent: u8,
}

/// Type override for one field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldTypeOverride {
    pub path: String,
    /// Type the caller expects the field to have today (informational)
    #[serde(default)]
    pub old_type: Option<String>,
    pub new_type: String,
}

impl FieldTypeOverride {
    pub fn new(path: impl Into<String>, new_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            old_type: None,
            new_type: new_type.into(),
        }
    }

    pub fn with_old_type(mut self, old_type: impl Into<String>) -> Self {
        self.old_type = Some(old_type.into());
        self
    }
}

/// A reindex job: what to copy, where, and how far it has got.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReindexJob {
    /// ULID assigned at creation
    pub id: String,
    #[serde(default)]
    pub description: String,

    /// Source indices, deduplicated, in submission order
    pub indices: Vec<String>,
    /// Destination index; must not exist yet
    pub new_index: String,
    /// Requested fields; empty means every field of every source index
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub field_type: Vec<FieldTypeOverride>,
    /// Engine query document
    pub query: Value,
    pub scroll_size: usize,
    /// 0 disables random sampling
    #[serde(default)]
    pub random_size: usize,
    #[serde(default)]
    pub add_facts_mapping: bool,
    /// Keep dotted keys instead of rebuilding nested documents
    #[serde(default)]
    pub flatten: bool,

    pub status: JobStatus,
    #[serde(default)]
    pub errors: Vec<ErrorEntry>,
    #[serde(default)]
    pub progress: JobProgress,
    #[serde(default)]
    pub documents_written: u64,

    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ReindexJob {
    /// Create a job copying every field of `indices` into `new_index`.
    pub fn new(indices: Vec<String>, new_index: impl Into<String>) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            description: String::new(),
            indices: dedup_ordered(indices),
            new_index: new_index.into(),
            fields: Vec::new(),
            field_type: Vec::new(),
            query: json!({"query": {"match_all": {}}}),
            scroll_size: DEFAULT_SCROLL_SIZE,
            random_size: 0,
            add_facts_mapping: false,
            flatten: false,
            status: JobStatus::Created,
            errors: Vec::new(),
            progress: JobProgress::default(),
            documents_written: 0,
            created_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_type_overrides(mut self, overrides: Vec<FieldTypeOverride>) -> Self {
        self.field_type = overrides;
        self
    }

    pub fn with_query(mut self, query: Value) -> Self {
        self.query = query;
        self
    }

    pub fn with_scroll_size(mut self, scroll_size: usize) -> Self {
        self.scroll_size = scroll_size;
        self
    }

    pub fn with_random_size(mut self, random_size: usize) -> Self {
        self.random_size = random_size;
        self
    }

    pub fn with_facts_mapping(mut self, enabled: bool) -> Self {
        self.add_facts_mapping = enabled;
        self
    }

    pub fn with_flatten(mut self, flatten: bool) -> Self {
        self.flatten = flatten;
        self
    }

    /// Check the definition before any engine call is made.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.indices.is_empty() {
            return Err(TypesError::InvalidJob("no source indices".to_string()));
        }
        if self.indices.iter().any(|index| index.trim().is_empty()) {
            return Err(TypesError::InvalidJob(
                "source index names must not be empty".to_string(),
            ));
        }
        if self.new_index.trim().is_empty() {
            return Err(TypesError::InvalidJob(
                "destination index name must not be empty".to_string(),
            ));
        }
        if self.scroll_size == 0 {
            return Err(TypesError::InvalidJob(
                "scroll_size must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Move to `next`, refusing anything but the next stage or Failed.
    pub fn transition(&mut self, next: JobStatus) -> Result<(), TypesError> {
        if !self.status.can_transition_to(next) {
            return Err(TypesError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Append an entry to the error log.
    pub fn record_error(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.errors.push(ErrorEntry {
            kind,
            message: message.into(),
            at: Utc::now(),
        });
    }

    pub fn set_step(&mut self, step: impl Into<String>) {
        self.progress.step = step.into();
    }

    pub fn set_percent(&mut self, percent: u8) {
        self.progress.percent = percent.min(100);
    }

    /// Error-log entries of one kind.
    pub fn errors_of_kind(&self, kind: ErrorKind) -> impl Iterator<Item = &ErrorEntry> {
        self.errors.iter().filter(move |entry| entry.kind == kind)
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Error log rendered as `Kind: message` lines.
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(ToString::to_string).collect()
    }
}

fn dedup_ordered(indices: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    indices
        .into_iter()
        .filter(|index| seen.insert(index.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ReindexJob {
        ReindexJob::new(vec!["a".to_string(), "b".to_string()], "dest")
    }

    #[test]
    fn test_new_job_defaults() {
        let job = job();
        assert_eq!(job.status, JobStatus::Created);
        assert_eq!(job.scroll_size, DEFAULT_SCROLL_SIZE);
        assert_eq!(job.random_size, 0);
        assert!(!job.flatten);
        assert!(job.errors.is_empty());
        assert!(job.finished_at.is_none());
        assert_eq!(job.id.len(), 26);
    }

    #[test]
    fn test_indices_are_deduplicated_in_order() {
        let job = ReindexJob::new(
            vec!["b".to_string(), "a".to_string(), "b".to_string()],
            "dest",
        );
        assert_eq!(job.indices, vec!["b", "a"]);
    }

    #[test]
    fn test_forward_transitions() {
        let mut job = job();
        job.transition(JobStatus::SchemaResolved).unwrap();
        job.transition(JobStatus::IndexCreated).unwrap();
        job.transition(JobStatus::Streaming).unwrap();
        job.transition(JobStatus::Completed).unwrap();
        assert!(job.is_finished());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_skipping_a_stage_is_rejected() {
        let mut job = job();
        let err = job.transition(JobStatus::Streaming).unwrap_err();
        assert!(matches!(
            err,
            TypesError::InvalidTransition {
                from: JobStatus::Created,
                to: JobStatus::Streaming
            }
        ));
        assert_eq!(job.status, JobStatus::Created);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = job();
        job.transition(JobStatus::Failed).unwrap();
        assert!(job.transition(JobStatus::SchemaResolved).is_err());
        assert!(job.transition(JobStatus::Failed).is_err());
        assert_eq!(job.status, JobStatus::Failed);
    }

    #[test]
    fn test_failed_reachable_from_every_running_state() {
        for status in [
            JobStatus::Created,
            JobStatus::SchemaResolved,
            JobStatus::IndexCreated,
            JobStatus::Streaming,
        ] {
            assert!(status.can_transition_to(JobStatus::Failed), "{status}");
        }
        assert!(!JobStatus::Streaming.can_transition_to(JobStatus::Created));
    }

    #[test]
    fn test_validate() {
        assert!(job().validate().is_ok());
        assert!(job().with_scroll_size(0).validate().is_err());
        assert!(ReindexJob::new(vec![], "dest").validate().is_err());
        assert!(ReindexJob::new(vec!["a".to_string()], " ").validate().is_err());
        assert!(ReindexJob::new(vec![String::new()], "dest")
            .validate()
            .is_err());
    }

    #[test]
    fn test_error_log_rendering() {
        let mut job = job();
        job.record_error(ErrorKind::IndexAlreadyExists, "index 'dest' already exists");
        job.record_error(ErrorKind::BulkItemFailure, "doc 3 rejected");
        assert_eq!(
            job.error_messages(),
            vec![
                "IndexAlreadyExists: index 'dest' already exists",
                "BulkItemFailure: doc 3 rejected"
            ]
        );
        assert_eq!(job.errors_of_kind(ErrorKind::BulkItemFailure).count(), 1);
    }

    #[test]
    fn test_error_kind_fatality() {
        assert!(!ErrorKind::SchemaConflict.is_fatal());
        assert!(!ErrorKind::BulkItemFailure.is_fatal());
        assert!(ErrorKind::IndexAlreadyExists.is_fatal());
        assert!(ErrorKind::ScrollExpired.is_fatal());
    }

    #[test]
    fn test_percent_is_clamped() {
        let mut job = job();
        job.set_percent(140);
        assert_eq!(job.progress.percent, 100);
    }

    #[test]
    fn test_job_serialization_roundtrip() {
        let mut job = job().with_flatten(true).with_random_size(10);
        job.record_error(ErrorKind::SchemaConflict, "x");
        let json = serde_json::to_string(&job).unwrap();
        let decoded: ReindexJob = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.id, job.id);
        assert!(decoded.flatten);
        assert_eq!(decoded.random_size, 10);
        assert_eq!(decoded.errors.len(), 1);
        assert!(json.contains("\"status\":\"created\""));
    }
}
