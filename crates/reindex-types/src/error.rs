//! Error types for the shared reindex types.

use thiserror::Error;

use crate::job::JobStatus;

/// Unified error type for job, payload and configuration handling.
#[derive(Debug, Error)]
pub enum TypesError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid job definition
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    /// Status change that would move the job backwards or out of a terminal state
    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },
}
