//! Scroll-based reindex pipeline.
//!
//! Copies documents from one or more source indices into a newly created
//! destination index, optionally rewriting field types and rebuilding
//! nested documents from dotted field paths.
//!
//! ## Key Components
//!
//! - [`ScrollCursor`]: lazy batches from a scroll or a random sample
//! - [`FieldSchemaResolver`]: field set and types for the destination
//! - [`DocumentTransformer`]: dotted keys to nested documents
//! - [`IndexMaterializer`]: destination mapping and index creation
//! - [`BulkWriter`]: chunked `create` bulk requests with a [`WriteReport`]
//! - [`ReindexOrchestrator`]: runs a [`ReindexJob`](reindex_types::ReindexJob)
//!   through its status machine
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use reindex_backend::InMemoryBackend;
//! use reindex_pipeline::ReindexOrchestrator;
//! use reindex_types::ReindexJob;
//!
//! let backend = Arc::new(InMemoryBackend::new());
//! let orchestrator = ReindexOrchestrator::new(backend);
//! let mut job = ReindexJob::new(vec!["source".to_string()], "destination");
//! let report = orchestrator.run(&mut job).await?;
//! ```

pub mod bulk;
pub mod cursor;
pub mod error;
pub mod materialize;
pub mod orchestrator;
pub mod progress;
pub mod schema;
pub mod transform;

pub use bulk::{BulkItemFailure, BulkWriter, WriteReport};
pub use cursor::{CursorOptions, ScrollCursor, ScrollState};
pub use error::{CursorError, MaterializeError, ReindexError, ResolveError, WriteError};
pub use materialize::{
    annotation_mapping, validate_index_name, IndexMaterializer, MappingDocument,
    DEFAULT_ANNOTATION_FIELD,
};
pub use orchestrator::{
    OrchestratorConfig, ReindexOrchestrator, STEP_CREATING, STEP_DONE, STEP_RESOLVING,
    STEP_SCROLLING,
};
pub use progress::{
    LoggingProgressReporter, NoOpProgressReporter, ProgressEvent, ProgressReporter,
    RecordingProgressReporter,
};
pub use schema::{FieldSchemaResolver, SchemaConflict, SchemaResolution};
pub use transform::{transform, unflatten, DocumentTransformer};
