//! Migration coordinator: sequences the two copy phases and owns the
//! destination's refresh/replica settings while they run.
//!
//! Phase one creates the destination with refresh and replicas disabled,
//! snapshot-copies the source with external versions and refreshes the
//! destination. Phase two re-copies with `proceed-on-conflict`, so only
//! documents whose source version moved past the destination's are
//! written, then restores steady-state settings and refreshes.
//!
//! Neither phase retries. Replays are idempotent under external
//! versioning, so re-running phase two is left to the caller.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use reindex_core::{CollectionSettings, Schema, StoreError};
use reindex_store::{BulkCopyResponse, DocumentStore, SnapshotSignal};

use crate::error::MigrationError;
use crate::job::{JobResult, JobStatus, MigrationJob, Phase};

/// A fatal error inside a running phase, with the copy report if the copy
/// itself had already finished.
struct PhaseFailure {
    error: StoreError,
    copy: Option<BulkCopyResponse>,
}

impl From<StoreError> for PhaseFailure {
    fn from(error: StoreError) -> Self {
        Self { error, copy: None }
    }
}

/// Progress channels a phase reports through.
struct PhaseContext {
    status: watch::Sender<JobStatus>,
    snapshot: SnapshotSignal,
}

impl PhaseContext {
    fn detached() -> Self {
        let (status, _) = watch::channel(JobStatus::Pending);
        Self {
            status,
            snapshot: None,
        }
    }
}

/// A phase running on the tokio runtime.
pub struct PhaseHandle {
    job_id: Uuid,
    phase: Phase,
    status: watch::Receiver<JobStatus>,
    snapshot: Option<oneshot::Receiver<()>>,
    task: JoinHandle<Result<JobResult, MigrationError>>,
}

impl PhaseHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Current job status.
    pub fn status(&self) -> JobStatus {
        *self.status.borrow()
    }

    /// Resolve once the store has taken the source snapshot. Returns `false`
    /// if the phase ended without getting that far. Later calls return
    /// immediately with `true`.
    pub async fn snapshot_taken(&mut self) -> bool {
        match self.snapshot.take() {
            Some(rx) => rx.await.is_ok(),
            None => true,
        }
    }

    /// Block until the phase finishes.
    pub async fn wait(self) -> Result<JobResult, MigrationError> {
        self.task
            .await
            .map_err(|e| MigrationError::TaskJoin(e.to_string()))?
    }
}

#[derive(Clone)]
pub struct MigrationCoordinator {
    store: Arc<dyn DocumentStore>,
    steady_state: CollectionSettings,
}

impl MigrationCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            steady_state: CollectionSettings::steady_state(),
        }
    }

    /// Settings restored on the destination at the end of phase two.
    pub fn with_steady_state(mut self, settings: CollectionSettings) -> Self {
        self.steady_state = settings;
        self
    }

    // ── Phase one ──────────────────────────────────────────────

    /// Snapshot-copy `source` into a new `dest`, blocking until done.
    ///
    /// `Err` means a precondition failed and no job ran; a failure while
    /// running comes back as a `Failed` [`JobResult`].
    pub async fn run_phase_one(
        &self,
        source: &str,
        dest: &str,
        schema: &Schema,
        throughput_limit: Option<f64>,
    ) -> Result<JobResult, MigrationError> {
        let job = MigrationJob::phase_one(source, dest, throughput_limit);
        self.execute_phase_one(job, schema, PhaseContext::detached())
            .await
    }

    /// Spawn phase one and return immediately.
    pub fn start_phase_one(
        &self,
        source: &str,
        dest: &str,
        schema: &Schema,
        throughput_limit: Option<f64>,
    ) -> PhaseHandle {
        let job = MigrationJob::phase_one(source, dest, throughput_limit);
        let this = self.clone();
        let schema = schema.clone();
        self.spawn(job, move |job, ctx| async move {
            this.execute_phase_one(job, &schema, ctx).await
        })
    }

    async fn check_phase_one(
        &self,
        source: &str,
        dest: &str,
        schema: &Schema,
    ) -> Result<(), MigrationError> {
        let source_schema = self
            .store
            .collection_schema(source)
            .await?
            .ok_or_else(|| MigrationError::SourceMissing(source.to_string()))?;
        let problems = schema.incompatibilities(&source_schema);
        if !problems.is_empty() {
            return Err(MigrationError::IncompatibleSchema(problems));
        }
        if self.store.collection_schema(dest).await?.is_some() {
            return Err(MigrationError::DestinationExists(dest.to_string()));
        }
        Ok(())
    }

    async fn execute_phase_one(
        &self,
        mut job: MigrationJob,
        schema: &Schema,
        ctx: PhaseContext,
    ) -> Result<JobResult, MigrationError> {
        self.check_phase_one(&job.source, &job.dest, schema).await?;
        job.start()?;
        ctx.status.send_replace(JobStatus::Running);
        info!(
            job_id = %job.id,
            source = %job.source,
            dest = %job.dest,
            throughput = ?job.throughput_limit,
            "phase 1 started"
        );

        let outcome = self.phase_one_steps(&job, schema, ctx.snapshot).await;
        let result = self.finish(job, outcome)?;
        ctx.status.send_replace(result.status);
        Ok(result)
    }

    async fn phase_one_steps(
        &self,
        job: &MigrationJob,
        schema: &Schema,
        snapshot: SnapshotSignal,
    ) -> Result<BulkCopyResponse, PhaseFailure> {
        self.store.create_collection(&job.dest, schema).await?;
        // Destination is not serving reads yet.
        self.store
            .set_collection_settings(&job.dest, &CollectionSettings::bulk_load())
            .await?;
        self.store.refresh(&job.source).await?;

        let copy = self
            .store
            .bulk_copy_observed(&job.copy_request(), snapshot)
            .await?;

        if let Err(error) = self.store.refresh(&job.dest).await {
            return Err(PhaseFailure {
                error,
                copy: Some(copy),
            });
        }
        Ok(copy)
    }

    // ── Phase two ──────────────────────────────────────────────

    /// Replay `source` onto `dest` with external versions, then restore
    /// steady-state settings. Safe to run after a failed phase one.
    pub async fn run_phase_two(
        &self,
        source: &str,
        dest: &str,
        throughput_limit: Option<f64>,
    ) -> Result<JobResult, MigrationError> {
        let job = MigrationJob::phase_two(source, dest, throughput_limit);
        self.execute_phase_two(job, PhaseContext::detached()).await
    }

    /// Spawn phase two and return immediately.
    pub fn start_phase_two(
        &self,
        source: &str,
        dest: &str,
        throughput_limit: Option<f64>,
    ) -> PhaseHandle {
        let job = MigrationJob::phase_two(source, dest, throughput_limit);
        let this = self.clone();
        self.spawn(job, move |job, ctx| async move {
            this.execute_phase_two(job, ctx).await
        })
    }

    async fn check_phase_two(&self, source: &str, dest: &str) -> Result<(), MigrationError> {
        let source_schema = self
            .store
            .collection_schema(source)
            .await?
            .ok_or_else(|| MigrationError::SourceMissing(source.to_string()))?;
        let dest_schema = self
            .store
            .collection_schema(dest)
            .await?
            .ok_or_else(|| MigrationError::DestinationMissing(dest.to_string()))?;
        let problems = dest_schema.incompatibilities(&source_schema);
        if !problems.is_empty() {
            return Err(MigrationError::IncompatibleSchema(problems));
        }
        Ok(())
    }

    async fn execute_phase_two(
        &self,
        mut job: MigrationJob,
        ctx: PhaseContext,
    ) -> Result<JobResult, MigrationError> {
        self.check_phase_two(&job.source, &job.dest).await?;
        job.start()?;
        ctx.status.send_replace(JobStatus::Running);
        info!(
            job_id = %job.id,
            source = %job.source,
            dest = %job.dest,
            throughput = ?job.throughput_limit,
            "phase 2 started"
        );

        let outcome = self.phase_two_steps(&job, ctx.snapshot).await;
        let result = self.finish(job, outcome)?;
        ctx.status.send_replace(result.status);
        Ok(result)
    }

    async fn phase_two_steps(
        &self,
        job: &MigrationJob,
        snapshot: SnapshotSignal,
    ) -> Result<BulkCopyResponse, PhaseFailure> {
        let copy = match self.store.refresh(&job.source).await {
            Ok(()) => {
                self.store
                    .bulk_copy_observed(&job.copy_request(), snapshot)
                    .await
            }
            Err(e) => Err(e),
        };

        // Settings go back to steady state whether or not the replay worked.
        let restored = self.restore_destination(&job.dest).await;

        match (copy, restored) {
            (Ok(copy), Ok(())) => Ok(copy),
            (Ok(copy), Err(error)) => Err(PhaseFailure {
                error,
                copy: Some(copy),
            }),
            (Err(error), restored) => {
                if let Err(e) = restored {
                    warn!(dest = %job.dest, error = %e, "could not restore destination settings");
                }
                Err(PhaseFailure { error, copy: None })
            }
        }
    }

    async fn restore_destination(&self, dest: &str) -> Result<(), StoreError> {
        self.store
            .set_collection_settings(dest, &self.steady_state)
            .await?;
        self.store.refresh(dest).await
    }

    // ── Shared ─────────────────────────────────────────────────

    fn spawn<F, Fut>(&self, job: MigrationJob, run: F) -> PhaseHandle
    where
        F: FnOnce(MigrationJob, PhaseContext) -> Fut,
        Fut: std::future::Future<Output = Result<JobResult, MigrationError>> + Send + 'static,
    {
        let (status_tx, status_rx) = watch::channel(JobStatus::Pending);
        let (snapshot_tx, snapshot_rx) = oneshot::channel();
        let job_id = job.id;
        let phase = job.phase;
        let ctx = PhaseContext {
            status: status_tx,
            snapshot: Some(snapshot_tx),
        };
        let task = tokio::spawn(run(job, ctx));
        PhaseHandle {
            job_id,
            phase,
            status: status_rx,
            snapshot: Some(snapshot_rx),
            task,
        }
    }

    fn finish(
        &self,
        job: MigrationJob,
        outcome: Result<BulkCopyResponse, PhaseFailure>,
    ) -> Result<JobResult, MigrationError> {
        let phase = job.phase;
        let job_id = job.id;
        let result = match outcome {
            Ok(copy) => {
                if copy.version_conflicts > 0 {
                    info!(
                        %job_id,
                        version_conflicts = copy.version_conflicts,
                        "{phase}: skipped documents already at or past the source version"
                    );
                }
                if !copy.failures.is_empty() {
                    warn!(%job_id, failures = copy.failures.len(), "{phase}: per-document failures");
                    for failure in &copy.failures {
                        debug!(%job_id, id = %failure.id, kind = ?failure.kind, "{}", failure.message);
                    }
                }
                job.complete(copy)?
            }
            Err(PhaseFailure { error, copy }) => {
                error!(%job_id, error = %error, "{phase} failed");
                job.fail(error.to_string(), copy)?
            }
        };
        info!(%job_id, "{}", result.summary_line());
        Ok(result)
    }
}
