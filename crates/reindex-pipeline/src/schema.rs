//! Field schema resolution.
//!
//! Discovers the union of leaf fields across the source indices,
//! restricts it to the requested paths and applies type overrides. The
//! result drives both the destination mapping and the source projection.

use std::collections::HashMap;
use std::fmt;

use tracing::{debug, warn};

use reindex_backend::SearchBackend;
use reindex_types::{FieldDescriptor, FieldTypeOverride};

use crate::error::ResolveError;

/// Two source indices declaring different types for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaConflict {
    pub path: String,
    /// First-seen type, the one kept
    pub kept_type: String,
    pub kept_from: String,
    pub other_type: String,
    pub other_from: String,
}

impl fmt::Display for SchemaConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "field '{}' is {} in {} and {} in {}; keeping {}",
            self.path, self.kept_type, self.kept_from, self.other_type, self.other_from, self.kept_type
        )
    }
}

/// Resolved field set plus the conflicts absorbed on the way.
#[derive(Debug, Clone, Default)]
pub struct SchemaResolution {
    pub fields: Vec<FieldDescriptor>,
    pub conflicts: Vec<SchemaConflict>,
}

impl SchemaResolution {
    /// Paths to retrieve from the source.
    pub fn paths(&self) -> Vec<String> {
        self.fields.iter().map(|field| field.path.clone()).collect()
    }

    pub fn field(&self, path: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.path == path)
    }
}

pub struct FieldSchemaResolver<'a> {
    backend: &'a dyn SearchBackend,
}

impl<'a> FieldSchemaResolver<'a> {
    pub fn new(backend: &'a dyn SearchBackend) -> Self {
        Self { backend }
    }

    /// Resolve the job's field set.
    ///
    /// An empty `requested` list keeps every discovered field. Overrides
    /// win over discovered types.
    pub async fn resolve(
        &self,
        indices: &[String],
        requested: &[String],
        overrides: &[FieldTypeOverride],
    ) -> Result<SchemaResolution, ResolveError> {
        let (discovered, conflicts) = self.discover(indices).await?;

        let mut fields = if requested.is_empty() {
            discovered
        } else {
            restrict(&discovered, requested)?
        };
        let conflicts: Vec<_> = conflicts
            .into_iter()
            .filter(|conflict| fields.iter().any(|field| field.path == conflict.path))
            .collect();

        apply_overrides(&mut fields, overrides);

        if fields.is_empty() {
            return Err(ResolveError::NoFields(indices.join(",")));
        }

        debug!(
            fields = fields.len(),
            conflicts = conflicts.len(),
            "Resolved field schema"
        );
        Ok(SchemaResolution { fields, conflicts })
    }

    /// Union of fields over `indices`, first-seen type per path.
    async fn discover(
        &self,
        indices: &[String],
    ) -> Result<(Vec<FieldDescriptor>, Vec<SchemaConflict>), ResolveError> {
        let mut fields: Vec<FieldDescriptor> = Vec::new();
        let mut origin: HashMap<String, (usize, String)> = HashMap::new();
        let mut conflicts = Vec::new();

        for index in indices {
            for field in self.backend.field_mapping(index).await? {
                match origin.get(&field.path) {
                    Some((position, first_index)) => {
                        let kept = &fields[*position];
                        if kept.field_type != field.field_type {
                            let conflict = SchemaConflict {
                                path: field.path.clone(),
                                kept_type: kept.field_type.clone(),
                                kept_from: first_index.clone(),
                                other_type: field.field_type.clone(),
                                other_from: index.clone(),
                            };
                            warn!(conflict = %conflict, "Field type conflict");
                            conflicts.push(conflict);
                        }
                    }
                    None => {
                        origin.insert(field.path.clone(), (fields.len(), index.clone()));
                        fields.push(field);
                    }
                }
            }
        }

        Ok((fields, conflicts))
    }
}

/// Keep only requested paths, in request order. A path naming an object
/// selects every leaf below it.
fn restrict(
    discovered: &[FieldDescriptor],
    requested: &[String],
) -> Result<Vec<FieldDescriptor>, ResolveError> {
    let mut selected: Vec<FieldDescriptor> = Vec::new();
    for path in requested {
        let prefix = format!("{path}.");
        let matches: Vec<&FieldDescriptor> = discovered
            .iter()
            .filter(|field| &field.path == path || field.path.starts_with(&prefix))
            .collect();
        if matches.is_empty() {
            return Err(ResolveError::UnknownField(path.clone()));
        }
        for field in matches {
            if !selected.iter().any(|kept| kept.path == field.path) {
                selected.push(field.clone());
            }
        }
    }
    Ok(selected)
}

fn apply_overrides(fields: &mut [FieldDescriptor], overrides: &[FieldTypeOverride]) {
    for rule in overrides {
        let Some(field) = fields.iter_mut().find(|field| field.path == rule.path) else {
            warn!(path = %rule.path, "Type override for unresolved field ignored");
            continue;
        };
        if let Some(old_type) = &rule.old_type {
            if *old_type != field.field_type {
                warn!(
                    path = %rule.path,
                    expected = %old_type,
                    actual = %field.field_type,
                    "Type override old_type does not match"
                );
            }
        }
        debug!(path = %rule.path, from = %field.field_type, to = %rule.new_type, "Overriding field type");
        field.field_type = rule.new_type.clone();
    }
}
