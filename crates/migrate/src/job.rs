//! Migration jobs: one per phase, `Pending → Running → {Completed | Failed}`.

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use uuid::Uuid;

use reindex_core::{ConflictPolicy, VersionMode};
use reindex_store::{BulkCopyRequest, BulkCopyResponse, DocumentFailure};

use crate::error::MigrationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Phase {
    /// Snapshot copy into a fresh destination.
    One,
    /// Versioned replay that repairs writes made during phase one.
    Two,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::One => write!(f, "phase 1"),
            Phase::Two => write!(f, "phase 2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "Pending"),
            JobStatus::Running => write!(f, "Running"),
            JobStatus::Completed => write!(f, "Completed"),
            JobStatus::Failed => write!(f, "Failed"),
        }
    }
}

/// One phase of a migration. Consumed when it finishes; only its
/// [`JobResult`] survives.
#[derive(Debug)]
pub struct MigrationJob {
    pub id: Uuid,
    pub phase: Phase,
    pub source: String,
    pub dest: String,
    pub conflict_policy: ConflictPolicy,
    pub version_mode: VersionMode,
    /// Docs/sec cap. `None` = unthrottled.
    pub throughput_limit: Option<f64>,
    pub created_at: DateTime<Utc>,
    status: JobStatus,
    started: Option<Instant>,
}

impl MigrationJob {
    fn new(
        phase: Phase,
        source: &str,
        dest: &str,
        conflict_policy: ConflictPolicy,
        throughput_limit: Option<f64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            phase,
            source: source.to_string(),
            dest: dest.to_string(),
            conflict_policy,
            version_mode: VersionMode::External,
            throughput_limit,
            created_at: Utc::now(),
            status: JobStatus::Pending,
            started: None,
        }
    }

    /// Phase one writes into an empty destination, so conflicts cannot occur
    /// and the stricter policy costs nothing.
    pub fn phase_one(source: &str, dest: &str, throughput_limit: Option<f64>) -> Self {
        Self::new(Phase::One, source, dest, ConflictPolicy::FailOnConflict, throughput_limit)
    }

    pub fn phase_two(source: &str, dest: &str, throughput_limit: Option<f64>) -> Self {
        Self::new(Phase::Two, source, dest, ConflictPolicy::ProceedOnConflict, throughput_limit)
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn copy_request(&self) -> BulkCopyRequest {
        BulkCopyRequest {
            source: self.source.clone(),
            dest: self.dest.clone(),
            version_mode: self.version_mode,
            conflict_policy: self.conflict_policy,
            throughput_limit: self.throughput_limit,
        }
    }

    fn transition(&mut self, to: JobStatus) -> Result<(), MigrationError> {
        let allowed = matches!(
            (self.status, to),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Completed)
                | (JobStatus::Pending | JobStatus::Running, JobStatus::Failed)
        );
        if !allowed {
            return Err(MigrationError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), MigrationError> {
        self.transition(JobStatus::Running)?;
        self.started = Some(Instant::now());
        Ok(())
    }

    /// Finish successfully with the store's copy report.
    pub fn complete(mut self, copy: BulkCopyResponse) -> Result<JobResult, MigrationError> {
        self.transition(JobStatus::Completed)?;
        Ok(self.into_result(Some(copy), None))
    }

    /// Finish with a fatal error. `copy` carries counts if the copy itself
    /// finished before the failure.
    pub fn fail(
        mut self,
        reason: String,
        copy: Option<BulkCopyResponse>,
    ) -> Result<JobResult, MigrationError> {
        self.transition(JobStatus::Failed)?;
        Ok(self.into_result(copy, Some(reason)))
    }

    fn into_result(self, copy: Option<BulkCopyResponse>, fatal: Option<String>) -> JobResult {
        let copy = copy.unwrap_or_default();
        JobResult {
            job_id: self.id,
            phase: self.phase,
            status: self.status,
            source: self.source,
            dest: self.dest,
            total: copy.total,
            created: copy.created,
            updated: copy.updated,
            version_conflicts: copy.version_conflicts,
            failures: copy.failures,
            elapsed: self.started.map(|s| s.elapsed()).unwrap_or_default(),
            fatal,
            finished_at: Utc::now(),
        }
    }
}

fn serialize_millis<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// What a finished phase reports.
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job_id: Uuid,
    pub phase: Phase,
    pub status: JobStatus,
    pub source: String,
    pub dest: String,
    pub total: u64,
    pub created: u64,
    pub updated: u64,
    pub version_conflicts: u64,
    pub failures: Vec<DocumentFailure>,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    /// Set when the phase failed as a whole.
    pub fatal: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    pub fn copied(&self) -> u64 {
        self.created + self.updated
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Completed
    }

    /// One-line summary for the checkpoint log.
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "{} {}: total={} created={} updated={} version_conflicts={} failures={} elapsed={}ms",
            self.phase,
            self.status,
            self.total,
            self.created,
            self.updated,
            self.version_conflicts,
            self.failures.len(),
            self.elapsed.as_millis()
        );
        if let Some(reason) = &self.fatal {
            line.push_str(&format!(" fatal=\"{reason}\""));
        }
        line
    }
}
