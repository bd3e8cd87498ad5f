//! Two-phase live migration of a document collection.
//!
//! Phase one snapshot-copies the source into a fresh destination while
//! writers keep going. Phase two replays the source again with external
//! versions so the destination catches up on creates and updates that
//! landed after the snapshot. Deletions made in between are not
//! propagated: a deleted document leaves no row to replay.

pub mod coordinator;
pub mod error;
pub mod job;
pub mod seed;
pub mod verifier;
pub mod workload;

pub use coordinator::{MigrationCoordinator, PhaseHandle};
pub use error::MigrationError;
pub use job::{JobResult, JobStatus, MigrationJob, Phase};
pub use seed::{default_payload, default_schema, SeedLoader, SeedReport};
pub use verifier::{Checkpoint, ConsistencyVerifier, Divergence, Observation};
pub use workload::{WorkloadGenerator, WorkloadOp, WorkloadOutcome, WorkloadReport};
