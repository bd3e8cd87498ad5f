//! Scripted migration run: seed, phase one under concurrent writes, phase
//! two, with a numbered checkpoint log and a PASS/FAIL verdict per
//! expectation.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};

use reindex_core::config::{ScenarioConfig, SettleMode};
use reindex_core::{payload, FieldValue, Payload};
use reindex_migrate::{
    default_payload, default_schema, Checkpoint, ConsistencyVerifier, JobResult,
    MigrationCoordinator, Observation, PhaseHandle, SeedLoader, WorkloadGenerator, WorkloadOp,
};
use reindex_store::DocumentStore;

pub fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
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

#[derive(Debug, Clone)]
pub struct Expectation {
    pub name: &'static str,
    pub passed: bool,
    pub detail: String,
}

impl Expectation {
    fn check(name: &'static str, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed,
            detail: detail.into(),
        }
    }

    pub fn line(&self) -> String {
        let verdict = if self.passed { "PASS" } else { "FAIL" };
        format!("[{verdict}] {}: {}", self.name, self.detail)
    }
}

#[derive(Debug)]
pub struct ScenarioReport {
    pub phase_one: JobResult,
    pub phase_two: JobResult,
    pub expectations: Vec<Expectation>,
}

impl ScenarioReport {
    pub fn all_passed(&self) -> bool {
        self.expectations.iter().all(|e| e.passed)
    }
}

/// Checkpoints the verdict is computed from.
struct Observed {
    initial_source: Checkpoint,
    edited_source: Checkpoint,
    dest_after_one: Checkpoint,
    dest_after_two: Checkpoint,
}

pub struct Scenario<W: Write> {
    store: Arc<dyn DocumentStore>,
    config: ScenarioConfig,
    out: W,
}

impl<W: Write> Scenario<W> {
    pub fn new(store: Arc<dyn DocumentStore>, config: ScenarioConfig, out: W) -> Self {
        Self { store, config, out }
    }

    pub fn into_output(self) -> W {
        self.out
    }

    fn step(&mut self, title: &str) -> Result<()> {
        writeln!(self.out, "\n{title}")?;
        Ok(())
    }

    fn print_lines(&mut self, lines: &[String]) -> Result<()> {
        for line in lines {
            writeln!(self.out, "{line}")?;
        }
        Ok(())
    }

    async fn checkpoint(&mut self, label: &str, collection: &str) -> Result<Checkpoint> {
        let ids = [
            self.config.update_id.as_str(),
            self.config.delete_id.as_str(),
            self.config.create_id.as_str(),
        ];
        let checkpoint = ConsistencyVerifier::new(self.store.clone())
            .checkpoint(label, collection, &ids)
            .await
            .with_context(|| format!("reading checkpoint '{label}' from {collection}"))?;
        self.print_lines(&checkpoint.lines())?;
        Ok(checkpoint)
    }

    /// Run steps 0 to 8 and evaluate the expectations.
    pub async fn run(&mut self) -> Result<ScenarioReport> {
        let source = self.config.source_collection.clone();
        let dest = self.config.dest_collection.clone();
        writeln!(self.out, "Starting reindex test...")?;
        writeln!(self.out, "{}", timestamp())?;

        self.step("0. Setup -- creation, indexing source, refresh.")?;
        let seed = SeedLoader::new(self.store.clone())
            .with_batch_size(self.config.seed_batch_size)
            .seed(&source, &default_schema(), self.config.document_count, default_payload)
            .await
            .with_context(|| format!("seeding {source}"))?;
        writeln!(
            self.out,
            " --- wrote {} docs ({} failed) in {}ms",
            seed.written,
            seed.failed,
            seed.elapsed.as_millis()
        )?;

        self.step("1. Reading initial documents")?;
        let initial_source = self.checkpoint("initial", &source).await?;

        self.step("2. Starting reindex")?;
        let coordinator = MigrationCoordinator::new(self.store.clone());
        let mut phase_one = coordinator.start_phase_one(
            &source,
            &dest,
            &default_schema(),
            self.config.throughput_limit,
        );
        writeln!(self.out, " --- {} job {}", phase_one.phase(), phase_one.job_id())?;

        self.step("3. Doing extra operations")?;
        self.settle(&mut phase_one).await?;
        let report = WorkloadGenerator::new(self.store.clone(), &source)
            .run(vec![
                WorkloadOp::Create {
                    id: self.config.create_id.clone(),
                    payload: created_payload(),
                },
                WorkloadOp::Update {
                    id: self.config.update_id.clone(),
                    payload: updated_payload(),
                },
                WorkloadOp::Delete {
                    id: self.config.delete_id.clone(),
                },
            ])
            .await;
        if report.all_succeeded() {
            writeln!(self.out, " --- Documents created, updated, and deleted")?;
        } else {
            for outcome in report.errors() {
                writeln!(self.out, " --- ERROR: {outcome}")?;
            }
        }

        self.step("4. Waiting on reindex to complete")?;
        let phase_one = phase_one.wait().await.context("phase 1")?;
        writeln!(self.out, " --- {}", phase_one.summary_line())?;

        self.step("5. Reading documents from source to see edits.")?;
        let edited_source = self.checkpoint("source after edits", &source).await?;

        self.step("6. Reading documents from destination to see missing changes.")?;
        let dest_after_one = self.checkpoint("destination after phase 1", &dest).await?;

        self.step("7. Reindex phase 2.")?;
        let phase_two = coordinator
            .run_phase_two(&source, &dest, self.config.throughput_limit)
            .await
            .context("phase 2")?;
        writeln!(self.out, " --- {}", phase_two.summary_line())?;

        self.step("8. Reading documents from destination after phase 2")?;
        let dest_after_two = self.checkpoint("destination after phase 2", &dest).await?;

        let observed = Observed {
            initial_source,
            edited_source,
            dest_after_one,
            dest_after_two,
        };
        let expectations = self.evaluate(&phase_one, &phase_two, &observed);
        writeln!(self.out)?;
        for expectation in &expectations {
            writeln!(self.out, "{}", expectation.line())?;
        }

        writeln!(self.out, "\nCompleted test...")?;
        writeln!(self.out, "{}", timestamp())?;
        Ok(ScenarioReport {
            phase_one,
            phase_two,
            expectations,
        })
    }

    async fn settle(&mut self, phase_one: &mut PhaseHandle) -> Result<()> {
        let delay = Duration::from_millis(self.config.settle_delay_ms);
        let mode = self.config.settle_mode;
        if matches!(mode, SettleMode::Signal | SettleMode::SignalThenDelay) {
            if phase_one.snapshot_taken().await {
                info!(job_id = %phase_one.job_id(), "phase 1 snapshot taken");
            } else {
                warn!(job_id = %phase_one.job_id(), "phase 1 ended before taking a snapshot");
            }
        }
        if matches!(mode, SettleMode::Delay | SettleMode::SignalThenDelay) && !delay.is_zero() {
            writeln!(self.out, " --- waiting {}ms for phase 1 to settle", delay.as_millis())?;
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn evaluate(&self, one: &JobResult, two: &JobResult, seen: &Observed) -> Vec<Expectation> {
        let update_id = self.config.update_id.as_str();
        let delete_id = self.config.delete_id.as_str();
        let create_id = self.config.create_id.as_str();
        let observed = |cp: &Checkpoint, id: &str| cp.get(id).cloned().unwrap_or(Observation::NotFound);

        let mut checks = vec![
            Expectation::check("phase 1 completed", one.is_success(), one.summary_line()),
            Expectation::check("phase 2 completed", two.is_success(), two.summary_line()),
        ];

        // Snapshot isolation: phase one copied the pre-workload state.
        let before = observed(&seen.initial_source, update_id);
        let copied = observed(&seen.dest_after_one, update_id);
        let isolated = before.is_found()
            && before.document().map(|d| &d.payload) == copied.document().map(|d| &d.payload)
            && !observed(&seen.dest_after_one, create_id).is_found();
        checks.push(Expectation::check(
            "snapshot isolation",
            isolated,
            format!("destination {update_id} after phase 1: {copied}"),
        ));

        // Forward repair: phase two carried the update over.
        let edited = observed(&seen.edited_source, update_id);
        let repaired = observed(&seen.dest_after_two, update_id);
        let forward = edited.document().map(|d| &d.payload) == Some(&updated_payload())
            && repaired.document().map(|d| &d.payload) == Some(&updated_payload());
        checks.push(Expectation::check(
            "forward repair",
            forward,
            format!("destination {update_id} after phase 2: {repaired}"),
        ));

        // Known gap: deletes after the snapshot are not propagated.
        let deleted_in_source = !observed(&seen.edited_source, delete_id).is_found();
        let orphan = observed(&seen.dest_after_two, delete_id);
        checks.push(Expectation::check(
            "deletion gap",
            deleted_in_source && orphan.is_found(),
            format!("destination {delete_id} after phase 2: {orphan}"),
        ));

        let created = observed(&seen.dest_after_two, create_id);
        checks.push(Expectation::check(
            "created document copied",
            created.document().map(|d| &d.payload) == Some(&created_payload()),
            format!("destination {create_id} after phase 2: {created}"),
        ));
        checks
    }
}
