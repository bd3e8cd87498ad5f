//! In-process document store.
//!
//! Reproduces the semantics the migration protocol depends on:
//! - `get` is real-time, bulk-copy enumeration only sees the searchable
//!   view, which advances on `refresh` (or lazily once the collection's
//!   refresh interval has elapsed);
//! - bulk copy takes a point-in-time snapshot of the source, then writes
//!   it in throttled batches while other writers keep going;
//! - external versioning keeps the highest version seen per id.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use reindex_core::{
    CollectionSettings, ConflictPolicy, DocId, Document, Payload, RefreshInterval, Schema,
    StoreError, Version, VersionMode,
};

use crate::client::{
    BulkCopyRequest, BulkCopyResponse, BulkOperation, BulkWriteSummary, DocumentFailure,
    DocumentStore, SnapshotSignal,
};
use crate::throttle::{Throttle, SCROLL_BATCH_SIZE};

type DocMap = BTreeMap<DocId, Document>;

struct StoredCollection {
    schema: Schema,
    settings: CollectionSettings,
    docs: DocMap,
    searchable: Arc<DocMap>,
    last_refresh: Instant,
    dirty: bool,
}

enum WriteOutcome {
    Created,
    Updated,
}

impl StoredCollection {
    fn new(schema: Schema) -> Self {
        Self {
            schema,
            settings: CollectionSettings::steady_state(),
            docs: BTreeMap::new(),
            searchable: Arc::new(BTreeMap::new()),
            last_refresh: Instant::now(),
            dirty: false,
        }
    }

    fn refresh(&mut self) {
        if self.dirty {
            self.searchable = Arc::new(self.docs.clone());
            self.dirty = false;
        }
        self.last_refresh = Instant::now();
    }

    /// Point-in-time view used by bulk copies.
    fn searchable_view(&mut self) -> Arc<DocMap> {
        if let RefreshInterval::Every(interval) = self.settings.refresh_interval {
            if self.dirty && self.last_refresh.elapsed() >= interval {
                self.refresh();
            }
        }
        Arc::clone(&self.searchable)
    }

    /// Write with an internally assigned version.
    fn write_internal(
        &mut self,
        name: &str,
        id: &str,
        payload: Payload,
    ) -> Result<(Version, WriteOutcome), StoreError> {
        self.schema.validate(name, id, &payload)?;
        let (version, outcome) = match self.docs.get(id) {
            Some(existing) => (existing.version + 1, WriteOutcome::Updated),
            None => (1, WriteOutcome::Created),
        };
        self.docs
            .insert(id.to_string(), Document::new(id, version, payload));
        self.dirty = true;
        Ok((version, outcome))
    }

    /// Write carrying the caller's version. Succeeds only when the stored
    /// version is strictly lower.
    fn write_external(&mut self, name: &str, doc: &Document) -> Result<WriteOutcome, StoreError> {
        self.schema.validate(name, &doc.id, &doc.payload)?;
        let outcome = match self.docs.get(&doc.id) {
            Some(existing) if existing.version >= doc.version => {
                return Err(StoreError::VersionConflict {
                    collection: name.to_string(),
                    id: doc.id.clone(),
                    current: existing.version,
                    attempted: doc.version,
                });
            }
            Some(_) => WriteOutcome::Updated,
            None => WriteOutcome::Created,
        };
        self.docs.insert(doc.id.clone(), doc.clone());
        self.dirty = true;
        Ok(outcome)
    }
}

/// In-memory [`DocumentStore`]. Share it behind an `Arc`.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, StoredCollection>>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the store going away: every call fails with `TransportFailure`
    /// until cleared. A running bulk copy fails at its next batch.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Current settings of a collection.
    pub async fn settings(&self, collection: &str) -> Option<CollectionSettings> {
        let guard = self.collections.read().await;
        guard.get(collection).map(|c| c.settings)
    }

    /// Number of live documents in a collection.
    pub async fn document_count(&self, collection: &str) -> Option<usize> {
        let guard = self.collections.read().await;
        guard.get(collection).map(|c| c.docs.len())
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::TransportFailure("memory store unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    async fn with_collection<T>(
        &self,
        name: &str,
        f: impl FnOnce(&mut StoredCollection) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        self.check_available()?;
        let mut guard = self.collections.write().await;
        let collection = guard
            .get_mut(name)
            .ok_or_else(|| StoreError::CollectionNotFound(name.to_string()))?;
        f(collection)
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn create_collection(&self, name: &str, schema: &Schema) -> Result<(), StoreError> {
        self.check_available()?;
        let mut guard = self.collections.write().await;
        if guard.contains_key(name) {
            return Err(StoreError::CollectionExists(name.to_string()));
        }
        guard.insert(name.to_string(), StoredCollection::new(schema.clone()));
        info!(collection = name, fields = schema.fields.len(), "created collection");
        Ok(())
    }

    async fn collection_schema(&self, name: &str) -> Result<Option<Schema>, StoreError> {
        self.check_available()?;
        let guard = self.collections.read().await;
        Ok(guard.get(name).map(|c| c.schema.clone()))
    }

    async fn set_collection_settings(
        &self,
        name: &str,
        settings: &CollectionSettings,
    ) -> Result<(), StoreError> {
        self.with_collection(name, |c| {
            c.settings = *settings;
            Ok(())
        })
        .await?;
        debug!(
            collection = name,
            refresh_interval = %settings.refresh_interval,
            replicas = settings.replica_count,
            "updated collection settings"
        );
        Ok(())
    }

    async fn bulk_write(
        &self,
        collection: &str,
        operations: Vec<BulkOperation>,
    ) -> Result<BulkWriteSummary, StoreError> {
        self.with_collection(collection, |c| {
            let mut summary = BulkWriteSummary::default();
            for op in operations {
                match c.write_internal(collection, &op.id, op.payload) {
                    Ok(_) => summary.written += 1,
                    Err(e) => summary.failures.push(DocumentFailure::from_error(op.id, &e)),
                }
            }
            Ok(summary)
        })
        .await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Document>, StoreError> {
        self.check_available()?;
        let guard = self.collections.read().await;
        let c = guard
            .get(collection)
            .ok_or_else(|| StoreError::CollectionNotFound(collection.to_string()))?;
        Ok(c.docs.get(id).cloned())
    }

    async fn index(
        &self,
        collection: &str,
        id: &str,
        payload: Payload,
    ) -> Result<Version, StoreError> {
        self.with_collection(collection, |c| {
            c.write_internal(collection, id, payload).map(|(v, _)| v)
        })
        .await
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.with_collection(collection, |c| match c.docs.remove(id) {
            Some(_) => {
                c.dirty = true;
                Ok(())
            }
            None => Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            }),
        })
        .await
    }

    async fn refresh(&self, collection: &str) -> Result<(), StoreError> {
        self.with_collection(collection, |c| {
            c.refresh();
            Ok(())
        })
        .await
    }

    async fn bulk_copy(&self, request: &BulkCopyRequest) -> Result<BulkCopyResponse, StoreError> {
        self.bulk_copy_observed(request, None).await
    }

    async fn bulk_copy_observed(
        &self,
        request: &BulkCopyRequest,
        signal: SnapshotSignal,
    ) -> Result<BulkCopyResponse, StoreError> {
        self.check_available()?;
        let started = Instant::now();

        let snapshot = {
            let mut guard = self.collections.write().await;
            if !guard.contains_key(&request.dest) {
                return Err(StoreError::CollectionNotFound(request.dest.clone()));
            }
            let source = guard
                .get_mut(&request.source)
                .ok_or_else(|| StoreError::CollectionNotFound(request.source.clone()))?;
            source.searchable_view()
        };
        if let Some(tx) = signal {
            let _ = tx.send(());
        }
        debug!(
            source = %request.source,
            dest = %request.dest,
            documents = snapshot.len(),
            "bulk copy enumeration started"
        );

        let mut response = BulkCopyResponse {
            total: snapshot.len() as u64,
            ..Default::default()
        };
        let mut throttle = Throttle::new(request.throughput_limit);
        let docs: Vec<&Document> = snapshot.values().collect();

        for batch in docs.chunks(SCROLL_BATCH_SIZE) {
            self.check_available()?;
            {
                let mut guard = self.collections.write().await;
                let dest = guard
                    .get_mut(&request.dest)
                    .ok_or_else(|| StoreError::CollectionNotFound(request.dest.clone()))?;
                for doc in batch {
                    let outcome = match request.version_mode {
                        VersionMode::External => dest.write_external(&request.dest, doc),
                        VersionMode::Internal => dest
                            .write_internal(&request.dest, &doc.id, doc.payload.clone())
                            .map(|(_, outcome)| outcome),
                    };
                    match outcome {
                        Ok(WriteOutcome::Created) => response.created += 1,
                        Ok(WriteOutcome::Updated) => response.updated += 1,
                        Err(e @ StoreError::VersionConflict { .. }) => {
                            response.version_conflicts += 1;
                            if request.conflict_policy == ConflictPolicy::FailOnConflict {
                                response.failures.push(DocumentFailure::from_error(&doc.id, &e));
                            }
                        }
                        Err(e) => response.failures.push(DocumentFailure::from_error(&doc.id, &e)),
                    }
                }
            }
            throttle.pace(batch.len()).await;
        }

        response.elapsed = started.elapsed();
        Ok(response)
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}
