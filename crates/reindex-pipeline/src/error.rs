//! Error types for the reindex pipeline.
//!
//! Each stage has its own error enum; [`ReindexError`] aggregates them
//! and maps every failure onto the [`ErrorKind`] recorded in the job
//! error log.

use reindex_backend::BackendError;
use reindex_types::{ErrorKind, TypesError};
use thiserror::Error;

/// Errors from field schema resolution
#[derive(Error, Debug)]
pub enum ResolveError {
    /// Mapping introspection failed
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// A requested path exists in none of the source mappings
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Resolution produced an empty field set
    #[error("No fields resolved for indices: {0}")]
    NoFields(String),
}

/// Errors from destination index creation
#[derive(Error, Debug)]
pub enum MaterializeError {
    /// Name rejected before any request was made
    #[error("Invalid index name '{name}': {reason}")]
    InvalidIndexName { name: String, reason: String },

    /// Destination name is taken
    #[error("Index already exists: {0}")]
    AlreadyExists(String),

    /// Index creation request failed
    #[error("Backend error: {0}")]
    Backend(BackendError),
}

impl From<BackendError> for MaterializeError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::IndexAlreadyExists(name) => MaterializeError::AlreadyExists(name),
            other => MaterializeError::Backend(other),
        }
    }
}

/// Errors from the scroll cursor
#[derive(Error, Debug)]
pub enum CursorError {
    /// Server-side context expired; the cursor is aborted
    #[error("Scroll expired: {0}")]
    ScrollExpired(String),

    /// Any other failure while fetching a page
    #[error("Backend error: {0}")]
    Backend(BackendError),

    /// The cursor was already exhausted or aborted
    #[error("Cursor is closed")]
    Closed,
}

impl From<BackendError> for CursorError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::ScrollExpired(handle) => CursorError::ScrollExpired(handle),
            other => CursorError::Backend(other),
        }
    }
}

/// Errors from the bulk writer
#[derive(Error, Debug)]
pub enum WriteError {
    /// A whole bulk request failed
    #[error("Bulk chunk {chunk} failed: {source}")]
    Chunk {
        chunk: u64,
        #[source]
        source: BackendError,
    },
}

/// Errors that stop a reindex job
#[derive(Error, Debug)]
pub enum ReindexError {
    /// Job definition or state machine error
    #[error("{0}")]
    Job(#[from] TypesError),

    #[error("Schema resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Index creation failed: {0}")]
    Materialize(#[from] MaterializeError),

    #[error("Scroll failed: {0}")]
    Cursor(#[from] CursorError),

    #[error("Bulk write failed: {0}")]
    Write(#[from] WriteError),

    /// Anything no stage accounts for
    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

fn backend_kind(err: &BackendError) -> ErrorKind {
    match err {
        BackendError::IndexAlreadyExists(_) => ErrorKind::IndexAlreadyExists,
        BackendError::ScrollExpired(_) => ErrorKind::ScrollExpired,
        _ => ErrorKind::BackendTransportError,
    }
}

impl ReindexError {
    /// Error-log classification of this failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ReindexError::Job(TypesError::InvalidJob(_)) => ErrorKind::InvalidJob,
            ReindexError::Job(_) => ErrorKind::UnexpectedError,
            ReindexError::Resolve(ResolveError::Backend(err)) => backend_kind(err),
            ReindexError::Resolve(_) => ErrorKind::SchemaResolution,
            ReindexError::Materialize(MaterializeError::InvalidIndexName { .. }) => {
                ErrorKind::InvalidIndexName
            }
            ReindexError::Materialize(MaterializeError::AlreadyExists(_)) => {
                ErrorKind::IndexAlreadyExists
            }
            ReindexError::Materialize(MaterializeError::Backend(err)) => backend_kind(err),
            ReindexError::Cursor(CursorError::ScrollExpired(_)) => ErrorKind::ScrollExpired,
            ReindexError::Cursor(CursorError::Backend(err)) => backend_kind(err),
            ReindexError::Cursor(CursorError::Closed) => ErrorKind::UnexpectedError,
            ReindexError::Write(WriteError::Chunk { source, .. }) => backend_kind(source),
            ReindexError::Unexpected(_) => ErrorKind::UnexpectedError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReindexError::from(MaterializeError::AlreadyExists("dest".to_string()));
        assert_eq!(
            err.to_string(),
            "Index creation failed: Index already exists: dest"
        );

        let err = ReindexError::from(WriteError::Chunk {
            chunk: 2,
            source: BackendError::Transport("reset".to_string()),
        });
        assert_eq!(
            err.to_string(),
            "Bulk write failed: Bulk chunk 2 failed: Transport error: reset"
        );
    }

    #[test]
    fn test_backend_errors_are_classified() {
        let err: MaterializeError = BackendError::IndexAlreadyExists("x".to_string()).into();
        assert!(matches!(err, MaterializeError::AlreadyExists(_)));

        let err: CursorError = BackendError::ScrollExpired("s1".to_string()).into();
        assert!(matches!(err, CursorError::ScrollExpired(_)));

        let err: CursorError = BackendError::Transport("down".to_string()).into();
        assert!(matches!(err, CursorError::Backend(_)));
    }

    #[test]
    fn test_kinds() {
        let cases = vec![
            (
                ReindexError::from(TypesError::InvalidJob("no indices".to_string())),
                ErrorKind::InvalidJob,
            ),
            (
                ReindexError::from(ResolveError::NoFields("a".to_string())),
                ErrorKind::SchemaResolution,
            ),
            (
                ReindexError::from(ResolveError::Backend(BackendError::Transport(
                    "down".to_string(),
                ))),
                ErrorKind::BackendTransportError,
            ),
            (
                ReindexError::from(MaterializeError::InvalidIndexName {
                    name: "A".to_string(),
                    reason: "must be lowercase".to_string(),
                }),
                ErrorKind::InvalidIndexName,
            ),
            (
                ReindexError::from(MaterializeError::AlreadyExists("dest".to_string())),
                ErrorKind::IndexAlreadyExists,
            ),
            (
                ReindexError::from(CursorError::ScrollExpired("s".to_string())),
                ErrorKind::ScrollExpired,
            ),
            (
                ReindexError::Unexpected("boom".to_string()),
                ErrorKind::UnexpectedError,
            ),
        ];
        for (err, kind) in cases {
            assert_eq!(err.kind(), kind, "{err}");
        }
    }
}
