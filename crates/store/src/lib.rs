//! Document store client interface and its backends.

pub mod client;
pub mod http;
pub mod memory;
pub mod throttle;

use std::sync::Arc;

use reindex_core::config::{StoreBackend, StoreConfig};

pub use client::{
    BulkCopyRequest, BulkCopyResponse, BulkOperation, BulkWriteSummary, DocumentFailure,
    DocumentStore, FailureKind, SnapshotSignal,
};
pub use http::HttpStore;
pub use memory::MemoryStore;

/// Build the configured store backend.
pub fn from_config(config: &StoreConfig) -> Arc<dyn DocumentStore> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::info!("Store: in-memory backend");
            Arc::new(MemoryStore::new())
        }
        StoreBackend::Http => Arc::new(HttpStore::from_config(config)),
    }
}
