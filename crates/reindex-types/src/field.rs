//! Field descriptors.
//!
//! A descriptor is one resolved leaf field of a source mapping. The
//! same list drives the destination mapping and the source projection.

use serde::{Deserialize, Serialize};

/// A resolved (path, type) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    /// Dotted path, e.g. `comment.author.name`
    pub path: String,

    /// Engine type name, e.g. `keyword`, `text`, `long`
    pub field_type: String,

    /// Whether the top-level container of this path is a `nested` field
    #[serde(default)]
    pub nested: bool,
}

impl FieldDescriptor {
    pub fn new(path: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            field_type: field_type.into(),
            nested: false,
        }
    }

    /// Mark the descriptor as living under a nested container.
    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }

    /// Path segments in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.path.split('.')
    }

    /// First path segment.
    pub fn top_level(&self) -> &str {
        self.path.split('.').next().unwrap_or(&self.path)
    }
}
