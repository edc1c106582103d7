//! # reindex-types
//!
//! Shared domain types for the reindex pipeline.
//!
//! This crate defines the data structures passed between pipeline stages:
//! - Jobs: the reindex job record, its status machine and error log
//! - Payloads: the job submission format accepted from outside
//! - Fields: resolved field descriptors used for mappings and projection
//! - Documents: raw (dotted) and materialized (nested) documents
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use reindex_types::{JobStatus, ReindexJob};
//!
//! let job = ReindexJob::new(vec!["source".to_string()], "destination");
//! assert_eq!(job.status, JobStatus::Created);
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod field;
pub mod job;
pub mod payload;

pub use config::Settings;
pub use document::{flatten_source, Document, FlatDocument, Hit, NestedDocument};
pub use error::TypesError;
pub use field::FieldDescriptor;
pub use job::{
    ErrorEntry, ErrorKind, FieldTypeOverride, JobProgress, JobStatus, ReindexJob,
    DEFAULT_SCROLL_SIZE,
};
pub use payload::JobPayload;
