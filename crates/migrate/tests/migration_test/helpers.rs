use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;

use reindex_core::{
    payload, CollectionSettings, Document, FieldValue, Payload, Schema, StoreError, Version,
};
use reindex_migrate::{default_payload, default_schema, SeedLoader};
use reindex_store::{
    BulkCopyRequest, BulkCopyResponse, BulkOperation, BulkWriteSummary, DocumentStore,
    MemoryStore, SnapshotSignal,
};

pub const SOURCE: &str = "test_1";
pub const DEST: &str = "test_2";

/// Slow enough that a 3 000 document copy spans several throttled batches.
pub const SLOW_COPY: Option<f64> = Some(2_000.0);

/// Memory store with `SOURCE` seeded with ids `1..=count`.
pub async fn seeded_store(count: u64) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    SeedLoader::new(store.clone())
        .with_batch_size(500)
        .seed(SOURCE, &default_schema(), count, default_payload)
        .await
        .unwrap();
    store
}

pub fn updated_payload() -> Payload {
    payload([
        ("name", FieldValue::from("document updated data")),
        ("age", FieldValue::from(111_111_111i64)),
    ])
}

pub fn created_payload() -> Payload {
    payload([
        ("name", FieldValue::from("garbage additional data")),
        ("age", FieldValue::from(9_876i64)),
    ])
}

pub fn age_of(doc: &Document) -> Option<i64> {
    doc.field("age").and_then(FieldValue::as_i64)
}

/// Store wrapper that fails selected operations and delegates the rest.
pub struct FlakyStore {
    pub inner: Arc<MemoryStore>,
    pub fail_copy: AtomicBool,
    pub fail_settings: AtomicBool,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            fail_copy: AtomicBool::new(false),
            fail_settings: AtomicBool::new(false),
        }
    }

    fn refused(what: &str) -> StoreError {
        StoreError::TransportFailure(format!("{what}: connection refused"))
    }
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn create_collection(&self, name: &str, schema: &Schema) -> Result<(), StoreError> {
        self.inner.create_collection(name, schema).await
    }

    async fn collection_schema(&self, name: &str) -> Result<Option<Schema>, StoreError> {
        self.inner.collection_schema(name).await
    }

    async fn set_collection_settings(
        &self,
        name: &str,
        settings: &CollectionSettings,
    ) -> Result<(), StoreError> {
        if self.fail_settings.load(Ordering::SeqCst) {
            return Err(Self::refused("settings"));
        }
        self.inner.set_collection_settings(name, settings).await
    }

    async fn bulk_write(
        &self,
        collection: &str,
        operations: Vec<BulkOperation>,
    ) -> Result<BulkWriteSummary, StoreError> {
        self.inner.bulk_write(collection, operations).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn index(
        &self,
        collection: &str,
        id: &str,
        payload: Payload,
    ) -> Result<Version, StoreError> {
        self.inner.index(collection, id, payload).await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.inner.delete(collection, id).await
    }

    async fn refresh(&self, collection: &str) -> Result<(), StoreError> {
        self.inner.refresh(collection).await
    }

    async fn bulk_copy(&self, request: &BulkCopyRequest) -> Result<BulkCopyResponse, StoreError> {
        self.bulk_copy_observed(request, None).await
    }

    async fn bulk_copy_observed(
        &self,
        request: &BulkCopyRequest,
        signal: SnapshotSignal,
    ) -> Result<BulkCopyResponse, StoreError> {
        if self.fail_copy.load(Ordering::SeqCst) {
            return Err(Self::refused("_reindex"));
        }
        self.inner.bulk_copy_observed(request, signal).await
    }

    fn backend_name(&self) -> &str {
        "flaky"
    }
}

