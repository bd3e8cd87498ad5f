//! Document store client trait and request/response types.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::oneshot;

use reindex_core::{
    CollectionSettings, ConflictPolicy, DocId, Document, Payload, Schema, StoreError, Version,
    VersionMode,
};

/// One create-or-overwrite entry of a bulk write.
#[derive(Debug, Clone)]
pub struct BulkOperation {
    pub id: DocId,
    pub payload: Payload,
}

impl BulkOperation {
    pub fn new(id: impl Into<DocId>, payload: Payload) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// A per-document failure inside a batched operation.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentFailure {
    pub id: DocId,
    pub kind: FailureKind,
    pub message: String,
}

impl DocumentFailure {
    pub fn from_error(id: impl Into<DocId>, err: &StoreError) -> Self {
        let kind = match err {
            StoreError::VersionConflict { .. } => FailureKind::VersionConflict,
            StoreError::SchemaViolation { .. } => FailureKind::SchemaViolation,
            _ => FailureKind::Other,
        };
        Self {
            id: id.into(),
            kind,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    VersionConflict,
    SchemaViolation,
    Other,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkWriteSummary {
    pub written: u64,
    pub failures: Vec<DocumentFailure>,
}

/// Parameters of a server-side bulk copy.
#[derive(Debug, Clone)]
pub struct BulkCopyRequest {
    pub source: String,
    pub dest: String,
    pub version_mode: VersionMode,
    pub conflict_policy: ConflictPolicy,
    /// Docs/sec cap. `None` = unthrottled.
    pub throughput_limit: Option<f64>,
}

/// Outcome of a completed bulk copy.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkCopyResponse {
    /// Documents enumerated from the source.
    pub total: u64,
    pub created: u64,
    pub updated: u64,
    /// Writes skipped or rejected because the destination held a newer version.
    pub version_conflicts: u64,
    /// Per-document failures. Under proceed-on-conflict, version conflicts
    /// are only counted and do not appear here.
    pub failures: Vec<DocumentFailure>,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl BulkCopyResponse {
    pub fn copied(&self) -> u64 {
        self.created + self.updated
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// Fired once a bulk copy has taken its point-in-time view of the source.
pub type SnapshotSignal = Option<oneshot::Sender<()>>;

/// Thin request/response interface to a document store.
///
/// Implementations: [`crate::MemoryStore`] (in-process) and
/// [`crate::HttpStore`] (Elasticsearch / OpenSearch REST).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a collection with a fixed schema. Fails with
    /// `CollectionExists` when the name is taken.
    async fn create_collection(&self, name: &str, schema: &Schema) -> Result<(), StoreError>;

    /// Schema of an existing collection, `None` if it does not exist.
    async fn collection_schema(&self, name: &str) -> Result<Option<Schema>, StoreError>;

    async fn set_collection_settings(
        &self,
        name: &str,
        settings: &CollectionSettings,
    ) -> Result<(), StoreError>;

    /// Batched create/overwrite with internal versioning.
    async fn bulk_write(
        &self,
        collection: &str,
        operations: Vec<BulkOperation>,
    ) -> Result<BulkWriteSummary, StoreError>;

    /// Real-time read by id. `Ok(None)` is a normal outcome.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError>;

    /// Create-or-overwrite a single document, returning its new version.
    async fn index(&self, collection: &str, id: &str, payload: Payload)
        -> Result<Version, StoreError>;

    /// Delete a document. Missing ids yield `NotFound`.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Blocking refresh: prior writes become visible to searches and bulk copies.
    async fn refresh(&self, collection: &str) -> Result<(), StoreError>;

    /// Copy every searchable source document into the destination, blocking
    /// until the copy completes.
    async fn bulk_copy(&self, request: &BulkCopyRequest) -> Result<BulkCopyResponse, StoreError>;

    /// Like [`DocumentStore::bulk_copy`], additionally firing `signal` once the
    /// source snapshot is taken. Stores that cannot observe their own
    /// enumeration fire it just before issuing the copy.
    async fn bulk_copy_observed(
        &self,
        request: &BulkCopyRequest,
        signal: SnapshotSignal,
    ) -> Result<BulkCopyResponse, StoreError> {
        if let Some(tx) = signal {
            let _ = tx.send(());
        }
        self.bulk_copy(request).await
    }

    /// Human-readable backend name for logs.
    fn backend_name(&self) -> &str;
}
