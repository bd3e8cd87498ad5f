use thiserror::Error;

use reindex_core::StoreError;

use crate::job::JobStatus;

/// Errors that prevent a migration phase from starting, or misuse of a job.
///
/// Failures while a phase runs are reported in its `JobResult` instead.
#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("destination collection already exists: {0}")]
    DestinationExists(String),

    #[error("destination collection does not exist: {0}")]
    DestinationMissing(String),

    #[error("source collection does not exist: {0}")]
    SourceMissing(String),

    #[error("source schema is incompatible: {}", .0.join(", "))]
    IncompatibleSchema(Vec<String>),

    #[error("invalid job transition {from:?} -> {to:?}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("phase task failed: {0}")]
    TaskJoin(String),
}
