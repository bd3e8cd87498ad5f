//! Seed loader: bulk-populates the source before a migration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use reindex_core::{payload, FieldType, FieldValue, Payload, Schema, StoreError};
use reindex_store::{BulkOperation, DocumentStore};

/// Documents per `bulk_write` call.
pub const DEFAULT_BATCH_SIZE: usize = 2_500;

/// Progress is logged every this many documents.
const PROGRESS_EVERY: u64 = 10_000;

/// `{name: keyword, age: integer}`
pub fn default_schema() -> Schema {
    Schema::new()
        .field("name", FieldType::Keyword)
        .field("age", FieldType::Integer)
}

/// `{name: "a", age: i}`
pub fn default_payload(i: u64) -> Payload {
    payload([
        ("name", FieldValue::from("a")),
        ("age", FieldValue::Integer(i as i64)),
    ])
}

#[derive(Debug, Clone, Default)]
pub struct SeedReport {
    pub written: u64,
    pub failed: u64,
    pub elapsed: Duration,
}

pub struct SeedLoader {
    store: Arc<dyn DocumentStore>,
    batch_size: usize,
}

impl SeedLoader {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Create `collection` and write ids `1..=count`, then refresh it.
    pub async fn seed<F>(
        &self,
        collection: &str,
        schema: &Schema,
        count: u64,
        make_payload: F,
    ) -> Result<SeedReport, StoreError>
    where
        F: Fn(u64) -> Payload,
    {
        let started = Instant::now();
        self.store.create_collection(collection, schema).await?;
        info!(collection, count, batch_size = self.batch_size, "inserting seed documents");

        let mut report = SeedReport::default();
        let mut batch = Vec::with_capacity(self.batch_size);
        for i in 1..=count {
            batch.push(BulkOperation::new(i.to_string(), make_payload(i)));
            if batch.len() == self.batch_size || i == count {
                let summary = self
                    .store
                    .bulk_write(collection, std::mem::take(&mut batch))
                    .await?;
                report.written += summary.written;
                report.failed += summary.failures.len() as u64;
                for failure in &summary.failures {
                    warn!(collection, id = %failure.id, "seed write failed: {}", failure.message);
                }
            }
            if i % PROGRESS_EVERY == 0 {
                info!(collection, "wrote {i} docs");
            }
        }

        self.store.refresh(collection).await?;
        report.elapsed = started.elapsed();
        info!(
            collection,
            written = report.written,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "seed complete"
        );
        Ok(report)
    }
}
