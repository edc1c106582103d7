//! Elasticsearch backend over the HTTP API.
//!
//! Scrolls go through `_search?scroll=..` / `_search/scroll`, writes go
//! through `_bulk` with `create` actions and no refresh. Hits are
//! flattened into dotted paths before they leave this module.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Map, Value};
use tracing::{debug, trace, warn};

use reindex_types::{flatten_source, Document, FieldDescriptor, Hit, Settings};

use crate::backend::{
    BulkItemResult, BulkResponse, SampleRequest, ScrollPage, ScrollRequest, SearchBackend,
};
use crate::error::BackendError;
use crate::mapping::fields_from_mapping_response;

/// Connection settings for [`ElasticBackend`].
#[derive(Debug, Clone)]
pub struct ElasticConfig {
    /// Base URL, e.g. "http://localhost:9200"
    pub url: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Sent as `Authorization: ApiKey ..`; wins over basic auth
    pub api_key: Option<SecretString>,
    /// Per-request transport timeout
    pub timeout: Duration,
    /// Scroll context lifetime between pages, e.g. "10m"
    pub scroll_keep_alive: String,
}

impl ElasticConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            api_key: None,
            timeout: Duration::from_secs(30),
            scroll_keep_alive: "10m".to_string(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            url: settings.engine_url.clone(),
            username: settings.username.clone(),
            password: settings.password.clone().map(SecretString::from),
            api_key: settings.api_key.clone().map(SecretString::from),
            timeout: Duration::from_secs(settings.request_timeout_secs),
            scroll_keep_alive: settings.scroll_keep_alive.clone(),
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(SecretString::from(api_key.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`SearchBackend`] talking to an Elasticsearch cluster.
pub struct ElasticBackend {
    client: Client,
    config: ElasticConfig,
}

impl ElasticBackend {
    pub fn new(config: ElasticConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| BackendError::Transport(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!(
            "{}/{}",
            self.config.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );
        let request = self.client.request(method, url);
        if let Some(api_key) = &self.config.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key.expose_secret()))
        } else if let Some(username) = &self.config.username {
            request.basic_auth(
                username,
                self.config
                    .password
                    .as_ref()
                    .map(|password| password.expose_secret().to_string()),
            )
        } else {
            request
        }
    }

    /// Send and turn non-2xx responses into typed errors.
    async fn send(&self, request: RequestBuilder, subject: &str) -> Result<Value, BackendError> {
        let response = request.send().await?;
        if response.status().is_success() {
            return Ok(response.json().await?);
        }
        Err(error_from_response(response, subject).await)
    }

    fn search_body(&self, query: &Value, fields: &[String], size: usize) -> Value {
        let mut body = match query {
            Value::Object(map) if map.contains_key("query") => map.clone(),
            Value::Object(map) if map.is_empty() => Map::new(),
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("query".to_string(), other.clone());
                map
            }
        };
        body.insert("size".to_string(), json!(size));
        if !fields.is_empty() {
            body.insert("_source".to_string(), json!(fields));
        }
        body.entry("sort").or_insert_with(|| json!(["_doc"]));
        // Otherwise totals above 10k come back as a lower bound.
        body.entry("track_total_hits").or_insert(Value::Bool(true));
        Value::Object(body)
    }

    fn sample_body(&self, request: &SampleRequest) -> Value {
        let mut inner = request
            .query
            .get("query")
            .cloned()
            .unwrap_or_else(|| json!({"match_all": {}}));
        if !request.exclude_ids.is_empty() {
            inner = json!({
                "bool": {
                    "must": inner,
                    "must_not": {"ids": {"values": request.exclude_ids}}
                }
            });
        }
        let mut body = json!({
            "size": request.size,
            "query": {
                "function_score": {
                    "query": inner,
                    "random_score": {}
                }
            }
        });
        if !request.fields.is_empty() {
            body["_source"] = json!(request.fields);
        }
        body
    }
}

#[async_trait]
impl SearchBackend for ElasticBackend {
    async fn field_mapping(&self, index: &str) -> Result<Vec<FieldDescriptor>, BackendError> {
        let body = self
            .send(self.request(Method::GET, &format!("{index}/_mapping")), index)
            .await?;
        let fields = fields_from_mapping_response(&body);
        debug!(index = %index, fields = fields.len(), "Read index mapping");
        Ok(fields)
    }

    async fn create_index(&self, index: &str, body: Value) -> Result<(), BackendError> {
        self.send(self.request(Method::PUT, index).json(&body), index)
            .await?;
        debug!(index = %index, "Created index");
        Ok(())
    }

    async fn open_scroll(&self, request: &ScrollRequest) -> Result<ScrollPage, BackendError> {
        let indices = request.indices.join(",");
        let body = self.search_body(&request.query, &request.fields, request.size);
        trace!(indices = %indices, body = %body, "Opening scroll");
        let response = self
            .send(
                self.request(Method::POST, &format!("{indices}/_search"))
                    .query(&[("scroll", self.config.scroll_keep_alive.as_str())])
                    .json(&body),
                &indices,
            )
            .await?;
        parse_page(&response)
    }

    async fn continue_scroll(&self, scroll_id: &str) -> Result<ScrollPage, BackendError> {
        let body = json!({
            "scroll": self.config.scroll_keep_alive,
            "scroll_id": scroll_id,
        });
        let response = self
            .send(
                self.request(Method::POST, "_search/scroll").json(&body),
                scroll_id,
            )
            .await?;
        parse_page(&response)
    }

    async fn clear_scroll(&self, scroll_id: &str) -> Result<(), BackendError> {
        let body = json!({ "scroll_id": [scroll_id] });
        match self
            .send(
                self.request(Method::DELETE, "_search/scroll").json(&body),
                scroll_id,
            )
            .await
        {
            Ok(_) => Ok(()),
            // Already released or expired on the server.
            Err(BackendError::ScrollExpired(_)) => Ok(()),
            Err(BackendError::Engine { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn random_sample(&self, request: &SampleRequest) -> Result<Vec<Hit>, BackendError> {
        let indices = request.indices.join(",");
        let body = self.sample_body(request);
        let response = self
            .send(
                self.request(Method::POST, &format!("{indices}/_search"))
                    .json(&body),
                &indices,
            )
            .await?;
        Ok(parse_page(&response)?.hits)
    }

    async fn bulk_create(
        &self,
        index: &str,
        documents: Vec<Document>,
    ) -> Result<BulkResponse, BackendError> {
        if documents.is_empty() {
            return Ok(BulkResponse::default());
        }
        let count = documents.len();
        let body = bulk_body(index, documents)?;
        let response = self
            .send(
                self.request(Method::POST, "_bulk")
                    .header("Content-Type", "application/x-ndjson")
                    .body(body),
                index,
            )
            .await?;
        let parsed = parse_bulk_response(&response)?;
        if parsed.items.len() != count {
            warn!(
                index = %index,
                sent = count,
                received = parsed.items.len(),
                "Bulk response item count mismatch"
            );
        }
        Ok(parsed)
    }

    async fn health(&self) -> Result<Value, BackendError> {
        self.send(self.request(Method::GET, "/"), &self.config.url)
            .await
    }
}

/// NDJSON body of `create` actions against `index`.
pub fn bulk_body(index: &str, documents: Vec<Document>) -> Result<String, BackendError> {
    let action = json!({ "create": { "_index": index } }).to_string();
    let mut body = String::new();
    for document in documents {
        body.push_str(&action);
        body.push('\n');
        body.push_str(&serde_json::to_string(&document.into_value())?);
        body.push('\n');
    }
    Ok(body)
}

fn parse_page(body: &Value) -> Result<ScrollPage, BackendError> {
    let hits = body
        .get("hits")
        .ok_or_else(|| BackendError::Serialization("search response without hits".to_string()))?;

    // A "gte" relation is only a lower bound and would pin progress early.
    let total_hits = match hits.get("total") {
        Some(Value::Number(total)) => total.as_u64(),
        Some(total) if total.get("relation").and_then(Value::as_str) == Some("gte") => None,
        Some(total) => total.get("value").and_then(Value::as_u64),
        None => None,
    };

    let hits = hits
        .get("hits")
        .and_then(Value::as_array)
        .map(|hits| hits.iter().map(parse_hit).collect::<Result<Vec<_>, _>>())
        .transpose()?
        .unwrap_or_default();

    Ok(ScrollPage {
        scroll_id: body
            .get("_scroll_id")
            .and_then(Value::as_str)
            .map(str::to_string),
        total_hits,
        hits,
    })
}

fn parse_hit(hit: &Value) -> Result<Hit, BackendError> {
    let id = hit
        .get("_id")
        .and_then(Value::as_str)
        .ok_or_else(|| BackendError::Serialization("hit without _id".to_string()))?;
    let source = match hit.get("_source") {
        Some(Value::Object(source)) => flatten_source(source),
        _ => Map::new(),
    };
    Ok(Hit::new(id, source))
}

fn parse_bulk_response(body: &Value) -> Result<BulkResponse, BackendError> {
    let items = body
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| BackendError::Serialization("bulk response without items".to_string()))?;

    let items = items
        .iter()
        .map(|item| {
            // Each item is keyed by its action: {"create": {...}}
            let result = item
                .as_object()
                .and_then(|actions| actions.values().next())
                .unwrap_or(item);
            let status = result
                .get("status")
                .and_then(Value::as_u64)
                .and_then(|status| u16::try_from(status).ok())
                .unwrap_or(0);
            let error = result.get("error").map(describe_error);
            BulkItemResult {
                status,
                id: result.get("_id").and_then(Value::as_str).map(str::to_string),
                error,
            }
        })
        .collect();

    Ok(BulkResponse { items })
}

fn describe_error(error: &Value) -> String {
    match (
        error.get("type").and_then(Value::as_str),
        error.get("reason").and_then(Value::as_str),
    ) {
        (Some(kind), Some(reason)) => format!("{kind}: {reason}"),
        (Some(kind), None) => kind.to_string(),
        (None, Some(reason)) => reason.to_string(),
        (None, None) => error.to_string(),
    }
}

/// `error.type` and every `error.root_cause[].type` of an error body.
fn error_types(body: &Value) -> Vec<&str> {
    let Some(error) = body.get("error") else {
        return Vec::new();
    };
    let mut types: Vec<&str> = error.get("type").and_then(Value::as_str).into_iter().collect();
    if let Some(causes) = error.get("root_cause").and_then(Value::as_array) {
        types.extend(
            causes
                .iter()
                .filter_map(|cause| cause.get("type").and_then(Value::as_str)),
        );
    }
    types
}

async fn error_from_response(response: Response, subject: &str) -> BackendError {
    let status = response.status().as_u16();
    let text = response.text().await.unwrap_or_default();
    let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
    let types = error_types(&body);

    if types.contains(&"resource_already_exists_exception") {
        return BackendError::IndexAlreadyExists(subject.to_string());
    }
    if types.contains(&"search_context_missing_exception") {
        return BackendError::ScrollExpired(subject.to_string());
    }
    if types.contains(&"index_not_found_exception") {
        return BackendError::IndexNotFound(subject.to_string());
    }

    let message = body
        .get("error")
        .map(describe_error)
        .unwrap_or_else(|| text.clone());
    BackendError::Engine { status, message }
}
