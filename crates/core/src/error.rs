use thiserror::Error;

use crate::document::Version;

/// Errors raised by document store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("schema violation in {collection}/{id}: {reason}")]
    SchemaViolation {
        collection: String,
        id: String,
        reason: String,
    },

    #[error("document not found: {collection}/{id}")]
    NotFound { collection: String, id: String },

    #[error("version conflict on {collection}/{id}: stored version {current}, attempted {attempted}")]
    VersionConflict {
        collection: String,
        id: String,
        current: Version,
        attempted: Version,
    },

    #[error("collection already exists: {0}")]
    CollectionExists(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Errors that abort the enclosing operation rather than a single document write.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::TransportFailure(_)
                | StoreError::CollectionExists(_)
                | StoreError::CollectionNotFound(_)
                | StoreError::Serialization(_)
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
