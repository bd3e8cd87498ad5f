//! Elasticsearch / OpenSearch REST backend.
//!
//! Collections map to indices. Bulk copy uses `_reindex` with
//! `wait_for_completion=true`, so the call blocks for as long as the
//! cluster takes; only the ordinary document calls carry a timeout.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use reindex_core::config::StoreConfig;
use reindex_core::{
    CollectionSettings, ConflictPolicy, DocId, Document, Payload, Schema, StoreError, Version,
};

use crate::client::{
    BulkCopyRequest, BulkCopyResponse, BulkOperation, BulkWriteSummary, DocumentFailure,
    DocumentStore, FailureKind,
};

/// [`DocumentStore`] backed by an Elasticsearch-compatible cluster.
pub struct HttpStore {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    timeout: Duration,
}

impl HttpStore {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn from_config(config: &StoreConfig) -> Self {
        let mut store = Self::new(&config.url);
        store.username = config.username.clone();
        store.password = config.password.clone();
        store.timeout = Duration::from_secs(config.timeout_secs);
        info!(url = %store.base_url, "Store: http backend");
        store
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.url(path));
        match &self.username {
            Some(user) => builder.basic_auth(user, self.password.as_deref()),
            None => builder,
        }
    }

    /// Ordinary request with the configured timeout.
    fn timed(&self, method: Method, path: &str) -> RequestBuilder {
        self.request(method, path).timeout(self.timeout)
    }

    async fn send(builder: RequestBuilder) -> Result<(StatusCode, Value), StoreError> {
        let resp = builder.send().await.map_err(transport)?;
        let status = resp.status();
        let text = resp.text().await.map_err(transport)?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok((status, body))
    }
}

fn transport(err: reqwest::Error) -> StoreError {
    StoreError::TransportFailure(err.to_string())
}

fn doc_path(collection: &str, id: &str) -> String {
    format!("{}/_doc/{}", collection, urlencoding::encode(id))
}

/// Map an Elasticsearch error response onto the store error taxonomy.
pub(crate) fn classify_error(status: u16, body: &Value, collection: &str, id: &str) -> StoreError {
    let error = &body["error"];
    let kind = error["type"].as_str().unwrap_or_default();
    let reason = error["reason"]
        .as_str()
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());
    match kind {
        "resource_already_exists_exception" => StoreError::CollectionExists(collection.to_string()),
        "index_not_found_exception" => StoreError::CollectionNotFound(collection.to_string()),
        "version_conflict_engine_exception" => StoreError::VersionConflict {
            collection: collection.to_string(),
            id: id.to_string(),
            current: 0,
            attempted: 0,
        },
        "mapper_parsing_exception"
        | "document_parsing_exception"
        | "strict_dynamic_mapping_exception"
        | "illegal_argument_exception" => StoreError::SchemaViolation {
            collection: collection.to_string(),
            id: id.to_string(),
            reason,
        },
        _ => StoreError::TransportFailure(format!("HTTP {status}: {reason}")),
    }
}

/// NDJSON body for `_bulk` index operations.
pub(crate) fn bulk_body(collection: &str, operations: &[BulkOperation]) -> Result<String, StoreError> {
    let mut body = String::new();
    for op in operations {
        let action = json!({ "index": { "_index": collection, "_id": op.id } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&op.payload)?);
        body.push('\n');
    }
    Ok(body)
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id")]
    id: DocId,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

pub(crate) fn summarize_bulk(collection: &str, body: &Value) -> Result<BulkWriteSummary, StoreError> {
    let parsed: BulkResponse = serde_json::from_value(body.clone())?;
    let mut summary = BulkWriteSummary::default();
    for item in parsed.items.into_iter().flat_map(|m| m.into_values()) {
        match item.error {
            None if item.status < 300 => summary.written += 1,
            error => {
                let body = json!({ "error": error.unwrap_or(Value::Null) });
                let err = classify_error(item.status, &body, collection, &item.id);
                summary.failures.push(DocumentFailure::from_error(item.id, &err));
            }
        }
    }
    Ok(summary)
}

#[derive(Debug, Deserialize)]
struct GetResponse {
    #[serde(rename = "_id")]
    id: DocId,
    #[serde(rename = "_version", default)]
    version: Version,
    #[serde(default)]
    found: bool,
    #[serde(rename = "_source", default)]
    source: Option<Payload>,
}

/// `_reindex` query string.
pub(crate) fn reindex_path(throughput_limit: Option<f64>) -> String {
    match throughput_limit.filter(|r| *r > 0.0) {
        Some(rate) => format!("_reindex?wait_for_completion=true&requests_per_second={rate}"),
        None => "_reindex?wait_for_completion=true&requests_per_second=-1".to_string(),
    }
}

pub(crate) fn reindex_body(request: &BulkCopyRequest) -> Value {
    json!({
        "source": { "index": request.source },
        "dest": {
            "index": request.dest,
            "version_type": request.version_mode.as_es_str(),
        },
        "conflicts": request.conflict_policy.as_es_str(),
    })
}

#[derive(Debug, Deserialize)]
struct ReindexResponse {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    total: u64,
    #[serde(default)]
    created: u64,
    #[serde(default)]
    updated: u64,
    #[serde(default)]
    version_conflicts: u64,
    #[serde(default)]
    failures: Vec<ReindexFailure>,
}

#[derive(Debug, Deserialize)]
struct ReindexFailure {
    #[serde(default)]
    id: Option<DocId>,
    #[serde(default)]
    cause: Value,
}

pub(crate) fn copy_response(body: &Value, policy: ConflictPolicy) -> Result<BulkCopyResponse, StoreError> {
    let parsed: ReindexResponse = serde_json::from_value(body.clone())?;
    let failures = parsed
        .failures
        .into_iter()
        .map(|f| {
            let kind = match f.cause["type"].as_str() {
                Some("version_conflict_engine_exception") => FailureKind::VersionConflict,
                Some("mapper_parsing_exception" | "document_parsing_exception"
                    | "strict_dynamic_mapping_exception") => FailureKind::SchemaViolation,
                _ => FailureKind::Other,
            };
            DocumentFailure {
                id: f.id.unwrap_or_default(),
                kind,
                message: f.cause["reason"].as_str().unwrap_or_default().to_string(),
            }
        })
        .filter(|f| policy == ConflictPolicy::FailOnConflict || f.kind != FailureKind::VersionConflict)
        .collect();
    Ok(BulkCopyResponse {
        total: parsed.total,
        created: parsed.created,
        updated: parsed.updated,
        version_conflicts: parsed.version_conflicts,
        failures,
        elapsed: Duration::from_millis(parsed.took),
    })
}

#[async_trait]
impl DocumentStore for HttpStore {
    async fn create_collection(&self, name: &str, schema: &Schema) -> Result<(), StoreError> {
        let mut mappings = schema.to_mapping();
        mappings["dynamic"] = json!("strict");
        let (status, body) =
            Self::send(self.timed(Method::PUT, name).json(&json!({ "mappings": mappings }))).await?;
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body, name, ""));
        }
        info!(collection = name, "created index");
        Ok(())
    }

    async fn collection_schema(&self, name: &str) -> Result<Option<Schema>, StoreError> {
        let (status, body) =
            Self::send(self.timed(Method::GET, &format!("{name}/_mapping"))).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body, name, ""));
        }
        Ok(Some(Schema::from_mapping(&body[name]["mappings"])))
    }

    async fn set_collection_settings(
        &self,
        name: &str,
        settings: &CollectionSettings,
    ) -> Result<(), StoreError> {
        let payload = json!({
            "index": {
                "refresh_interval": settings.refresh_interval.to_es_string(),
                "number_of_replicas": settings.replica_count,
            }
        });
        let (status, body) =
            Self::send(self.timed(Method::PUT, &format!("{name}/_settings")).json(&payload)).await?;
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body, name, ""));
        }
        debug!(collection = name, "updated index settings");
        Ok(())
    }

    async fn bulk_write(
        &self,
        collection: &str,
        operations: Vec<BulkOperation>,
    ) -> Result<BulkWriteSummary, StoreError> {
        if operations.is_empty() {
            return Ok(BulkWriteSummary::default());
        }
        let ndjson = bulk_body(collection, &operations)?;
        let builder = self
            .timed(Method::POST, "_bulk")
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(ndjson);
        let (status, body) = Self::send(builder).await?;
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body, collection, ""));
        }
        summarize_bulk(collection, &body)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        let (status, body) = Self::send(self.timed(Method::GET, &doc_path(collection, id))).await?;
        if status == StatusCode::NOT_FOUND && body["error"].is_null() {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body, collection, id));
        }
        let parsed: GetResponse = serde_json::from_value(body)?;
        if !parsed.found {
            return Ok(None);
        }
        Ok(Some(Document::new(
            parsed.id,
            parsed.version,
            parsed.source.unwrap_or_default(),
        )))
    }

    async fn index(
        &self,
        collection: &str,
        id: &str,
        payload: Payload,
    ) -> Result<Version, StoreError> {
        let (status, body) =
            Self::send(self.timed(Method::PUT, &doc_path(collection, id)).json(&payload)).await?;
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body, collection, id));
        }
        body["_version"]
            .as_u64()
            .ok_or_else(|| StoreError::TransportFailure(format!("index response without _version: {body}")))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let (status, body) =
            Self::send(self.timed(Method::DELETE, &doc_path(collection, id))).await?;
        if status == StatusCode::NOT_FOUND && body["result"] == "not_found" {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body, collection, id));
        }
        Ok(())
    }

    async fn refresh(&self, collection: &str) -> Result<(), StoreError> {
        let (status, body) =
            Self::send(self.timed(Method::POST, &format!("{collection}/_refresh"))).await?;
        if !status.is_success() {
            return Err(classify_error(status.as_u16(), &body, collection, ""));
        }
        Ok(())
    }

    async fn bulk_copy(&self, request: &BulkCopyRequest) -> Result<BulkCopyResponse, StoreError> {
        debug!(
            source = %request.source,
            dest = %request.dest,
            conflicts = request.conflict_policy.as_es_str(),
            "issuing _reindex"
        );
        // No timeout: the copy blocks until the cluster reports completion.
        let builder = self
            .request(Method::POST, &reindex_path(request.throughput_limit))
            .json(&reindex_body(request));
        let (status, body) = Self::send(builder).await?;
        // A conflict under conflicts=abort comes back as 409 with the usual body.
        if status.is_success() || (status == StatusCode::CONFLICT && body.get("failures").is_some()) {
            return copy_response(&body, request.conflict_policy);
        }
        Err(classify_error(status.as_u16(), &body, &request.dest, ""))
    }

    fn backend_name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reindex_core::{payload, FieldValue, VersionMode};

    #[test]
    fn url_joins_without_double_slash() {
        let store = HttpStore::new("http://localhost:9200/");
        assert_eq!(store.url("/test_1/_refresh"), "http://localhost:9200/test_1/_refresh");
        assert_eq!(doc_path("test_1", "a b"), "test_1/_doc/a%20b");
    }

    #[test]
    fn classify_known_error_types() {
        let body = json!({ "error": { "type": "resource_already_exists_exception", "reason": "exists" }, "status": 400 });
        assert!(matches!(classify_error(400, &body, "test_2", ""), StoreError::CollectionExists(c) if c == "test_2"));

        let body = json!({ "error": { "type": "strict_dynamic_mapping_exception", "reason": "mapping set to strict" } });
        assert!(matches!(classify_error(400, &body, "t", "1"), StoreError::SchemaViolation { .. }));

        let body = json!({ "error": { "type": "cluster_block_exception", "reason": "read-only" } });
        let err = classify_error(403, &body, "t", "1");
        assert!(matches!(err, StoreError::TransportFailure(ref m) if m.contains("read-only")));
    }

    #[test]
    fn bulk_body_is_ndjson_pairs() {
        let ops = vec![
            BulkOperation::new("1", payload([("name", FieldValue::from("a")), ("age", FieldValue::from(1i64))])),
            BulkOperation::new("2", payload([("age", 2i64)])),
        ];
        let body = bulk_body("test_1", &ops).unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], r#"{"index":{"_id":"1","_index":"test_1"}}"#);
        assert_eq!(lines[1], r#"{"age":1,"name":"a"}"#);
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn bulk_summary_collects_item_errors() {
        let body = json!({
            "errors": true,
            "items": [
                { "index": { "_id": "1", "status": 201 } },
                { "index": { "_id": "2", "status": 400, "error": { "type": "document_parsing_exception", "reason": "bad age" } } }
            ]
        });
        let summary = summarize_bulk("test_1", &body).unwrap();
        assert_eq!(summary.written, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].kind, FailureKind::SchemaViolation);
    }

    #[test]
    fn reindex_request_shape() {
        let request = BulkCopyRequest {
            source: "test_1".into(),
            dest: "test_2".into(),
            version_mode: VersionMode::External,
            conflict_policy: ConflictPolicy::ProceedOnConflict,
            throughput_limit: Some(5000.0),
        };
        let body = reindex_body(&request);
        assert_eq!(body["dest"]["version_type"], "external");
        assert_eq!(body["conflicts"], "proceed");
        assert_eq!(
            reindex_path(request.throughput_limit),
            "_reindex?wait_for_completion=true&requests_per_second=5000"
        );
        assert!(reindex_path(None).ends_with("requests_per_second=-1"));
    }

    #[test]
    fn reindex_response_drops_counted_conflicts_under_proceed() {
        let body = json!({
            "took": 1200, "total": 100001, "created": 1, "updated": 1, "version_conflicts": 99999,
            "failures": [
                { "index": "test_2", "id": "5", "cause": { "type": "version_conflict_engine_exception", "reason": "current version [1]" }, "status": 409 }
            ]
        });
        let proceed = copy_response(&body, ConflictPolicy::ProceedOnConflict).unwrap();
        assert_eq!(proceed.copied(), 2);
        assert_eq!(proceed.version_conflicts, 99_999);
        assert!(proceed.failures.is_empty());
        assert_eq!(proceed.elapsed, Duration::from_millis(1200));

        let abort = copy_response(&body, ConflictPolicy::FailOnConflict).unwrap();
        assert_eq!(abort.failures.len(), 1);
        assert_eq!(abort.failures[0].kind, FailureKind::VersionConflict);
    }
}
