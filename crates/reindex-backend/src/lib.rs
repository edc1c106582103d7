//! Search engine boundary for the reindex pipeline.
//!
//! ## Key Components
//!
//! - [`SearchBackend`]: operations the pipeline consumes from an engine
//! - [`ElasticBackend`]: Elasticsearch over its HTTP API (reqwest)
//! - [`InMemoryBackend`]: in-process engine with failure injection
//! - [`BackendError`]: boundary error type
//!
//! Hits always leave a backend in raw form: a flat map of dotted paths
//! to values, keyed by the engine document identifier.

pub mod backend;
pub mod elastic;
pub mod error;
pub mod mapping;
pub mod memory;

pub use backend::{
    BulkItemResult, BulkResponse, SampleRequest, ScrollPage, ScrollRequest, SearchBackend,
};
pub use elastic::{ElasticBackend, ElasticConfig};
pub use error::BackendError;
pub use mapping::{fields_from_mapping_response, fields_from_properties};
pub use memory::InMemoryBackend;
