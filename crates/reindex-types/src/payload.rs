//! Job submission payload.
//!
//! The wire format handed over by whatever submits jobs (API layer,
//! CLI job file). Converting it yields a fresh [`ReindexJob`] in the
//! `Created` state.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::TypesError;
use crate::job::{FieldTypeOverride, ReindexJob};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    #[serde(default)]
    pub description: String,
    pub indices: Vec<String>,
    /// Empty means auto-discover
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub field_type: Vec<FieldTypeOverride>,
    #[serde(default = "default_query")]
    pub query: Value,
    #[serde(default)]
    pub random_size: usize,
    /// Falls back to the configured default when absent
    #[serde(default)]
    pub scroll_size: Option<usize>,
    pub new_index: String,
    #[serde(default)]
    pub add_facts_mapping: bool,
    #[serde(default)]
    pub flatten: bool,
}

fn default_query() -> Value {
    json!({"query": {"match_all": {}}})
}

impl JobPayload {
    pub fn from_json(input: &str) -> Result<Self, TypesError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Build and validate the job this payload describes.
    pub fn into_job(self, default_scroll_size: usize) -> Result<ReindexJob, TypesError> {
        let job = ReindexJob::new(self.indices, self.new_index)
            .with_description(self.description)
            .with_fields(self.fields)
            .with_type_overrides(self.field_type)
            .with_query(self.query)
            .with_random_size(self.random_size)
            .with_scroll_size(self.scroll_size.unwrap_or(default_scroll_size))
            .with_facts_mapping(self.add_facts_mapping)
            .with_flatten(self.flatten);
        job.validate()?;
        Ok(job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobStatus;

    #[test]
    fn test_full_payload() {
        let payload = JobPayload::from_json(
            r#"{
                "description": "copy news",
                "indices": ["news_2020", "news_2021"],
                "fields": ["title", "meta.author"],
                "field_type": [{"path": "meta.author", "old_type": "text", "new_type": "keyword"}],
                "query": {"query": {"term": {"lang": "en"}}},
                "random_size": 0,
                "scroll_size": 200,
                "new_index": "news_all",
                "add_facts_mapping": true
            }"#,
        )
        .unwrap();

        let job = payload.into_job(500).unwrap();
        assert_eq!(job.status, JobStatus::Created);
        assert_eq!(job.indices, vec!["news_2020", "news_2021"]);
        assert_eq!(job.fields, vec!["title", "meta.author"]);
        assert_eq!(job.field_type[0].new_type, "keyword");
        assert_eq!(job.field_type[0].old_type.as_deref(), Some("text"));
        assert_eq!(job.scroll_size, 200);
        assert!(job.add_facts_mapping);
        assert!(!job.flatten);
        assert_eq!(job.description, "copy news");
    }

    #[test]
    fn test_minimal_payload_uses_defaults() {
        let payload =
            JobPayload::from_json(r#"{"indices": ["src"], "new_index": "dst"}"#).unwrap();
        let job = payload.into_job(750).unwrap();
        assert_eq!(job.scroll_size, 750);
        assert!(job.fields.is_empty());
        assert_eq!(job.query, json!({"query": {"match_all": {}}}));
    }

    #[test]
    fn test_invalid_payload_is_rejected() {
        let payload = JobPayload::from_json(
            r#"{"indices": ["src"], "new_index": "dst", "scroll_size": 0}"#,
        )
        .unwrap();
        assert!(matches!(
            payload.into_job(500),
            Err(TypesError::InvalidJob(_))
        ));

        assert!(JobPayload::from_json(r#"{"new_index": "dst"}"#).is_err());
    }
}
