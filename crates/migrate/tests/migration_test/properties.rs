use reindex_core::CollectionSettings;
use reindex_migrate::{
    default_schema, ConsistencyVerifier, Divergence, JobStatus, MigrationCoordinator, Observation,
    WorkloadGenerator, WorkloadOp,
};
use reindex_store::DocumentStore;

use crate::helpers::{age_of, created_payload, seeded_store, updated_payload, DEST, SLOW_COPY, SOURCE};

/// Writes made after the snapshot are invisible to phase one.
#[tokio::test(start_paused = true)]
async fn test_phase_one_is_snapshot_isolated() {
    let store = seeded_store(3_000).await;
    let coordinator = MigrationCoordinator::new(store.clone());
    let mut handle = coordinator.start_phase_one(SOURCE, DEST, &default_schema(), SLOW_COPY);
    assert!(handle.snapshot_taken().await);

    let workload = WorkloadGenerator::new(store.clone(), SOURCE);
    let report = workload
        .run(vec![
            WorkloadOp::Update { id: "100".into(), payload: updated_payload() },
            WorkloadOp::Create { id: "999999999".into(), payload: created_payload() },
            WorkloadOp::Delete { id: "200".into() },
        ])
        .await;
    assert!(report.all_succeeded());

    let result = handle.wait().await.unwrap();
    assert_eq!(result.status, JobStatus::Completed);
    assert_eq!(result.total, 3_000);
    assert_eq!(result.created, 3_000);
    assert!(result.failures.is_empty());

    let verifier = ConsistencyVerifier::new(store.clone());
    let doc = verifier.read_at(DEST, "100").await.unwrap();
    assert_eq!(doc.version(), Some(1));
    assert_eq!(doc.document().and_then(age_of), Some(100));
    assert_eq!(verifier.read_at(DEST, "999999999").await.unwrap(), Observation::NotFound);
    assert!(verifier.read_at(DEST, "200").await.unwrap().is_found());
    assert_eq!(store.settings(DEST).await, Some(CollectionSettings::bulk_load()));
}

/// Phase two carries every post-snapshot write forward.
#[tokio::test(start_paused = true)]
async fn test_phase_two_repairs_forward() {
    let store = seeded_store(3_000).await;
    let coordinator = MigrationCoordinator::new(store.clone());
    let mut handle = coordinator.start_phase_one(SOURCE, DEST, &default_schema(), SLOW_COPY);
    assert!(handle.snapshot_taken().await);

    let workload = WorkloadGenerator::new(store.clone(), SOURCE);
    workload.update_document("100", updated_payload()).await.unwrap();
    workload.create_document("999999999", created_payload()).await.unwrap();
    handle.wait().await.unwrap();

    let result = coordinator.run_phase_two(SOURCE, DEST, None).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.total, 3_001);
    assert_eq!(result.created, 1);
    assert_eq!(result.updated, 1);
    assert_eq!(result.version_conflicts, 2_999);
    assert!(result.failures.is_empty());

    let verifier = ConsistencyVerifier::new(store.clone());
    for id in ["1", "100", "2999", "999999999"] {
        assert_eq!(
            verifier.compare(SOURCE, DEST, id).await.unwrap(),
            Divergence::InSync,
            "id {id}"
        );
    }
    let updated = store.get(DEST, "100").await.unwrap().unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.payload, updated_payload());
    assert_eq!(store.settings(DEST).await, Some(CollectionSettings::steady_state()));
}

/// A destination document already at or past the source version is left alone.
#[tokio::test]
async fn test_phase_two_never_regresses_versions() {
    let store = seeded_store(50).await;
    let coordinator = MigrationCoordinator::new(store.clone());
    coordinator
        .run_phase_one(SOURCE, DEST, &default_schema(), None)
        .await
        .unwrap();

    // Source reaches v2, destination independently reaches v3.
    store.index(SOURCE, "7", updated_payload()).await.unwrap();
    store.index(DEST, "7", created_payload()).await.unwrap();
    store.index(DEST, "7", created_payload()).await.unwrap();
    // Equal versions with different payloads: the destination is kept as well.
    store.index(SOURCE, "8", updated_payload()).await.unwrap();
    store.index(DEST, "8", created_payload()).await.unwrap();

    let result = coordinator.run_phase_two(SOURCE, DEST, None).await.unwrap();
    assert_eq!(result.copied(), 0);
    assert_eq!(result.version_conflicts, 50);

    let seven = store.get(DEST, "7").await.unwrap().unwrap();
    assert_eq!(seven.version, 3);
    assert_eq!(seven.payload, created_payload());
    let eight = store.get(DEST, "8").await.unwrap().unwrap();
    assert_eq!(eight.payload, created_payload());
}

/// Deletes from the source after the snapshot are not propagated.
#[tokio::test(start_paused = true)]
async fn test_deletion_gap_survives_phase_two() {
    let store = seeded_store(3_000).await;
    let coordinator = MigrationCoordinator::new(store.clone());
    let mut handle = coordinator.start_phase_one(SOURCE, DEST, &default_schema(), SLOW_COPY);
    assert!(handle.snapshot_taken().await);
    WorkloadGenerator::new(store.clone(), SOURCE)
        .delete_document("200")
        .await
        .unwrap();
    handle.wait().await.unwrap();
    coordinator.run_phase_two(SOURCE, DEST, None).await.unwrap();

    let verifier = ConsistencyVerifier::new(store.clone());
    assert_eq!(
        verifier.compare(SOURCE, DEST, "200").await.unwrap(),
        Divergence::OrphanedInDest { dest_version: 1 }
    );
    let orphan = store.get(DEST, "200").await.unwrap().unwrap();
    assert_eq!(age_of(&orphan), Some(200));
    assert_eq!(store.document_count(SOURCE).await, Some(2_999));
    assert_eq!(store.document_count(DEST).await, Some(3_000));
}

/// Replaying phase two with no intervening source writes changes nothing.
#[tokio::test]
async fn test_phase_two_replay_is_idempotent() {
    let store = seeded_store(200).await;
    let coordinator = MigrationCoordinator::new(store.clone());
    coordinator
        .run_phase_one(SOURCE, DEST, &default_schema(), None)
        .await
        .unwrap();
    store.index(SOURCE, "3", updated_payload()).await.unwrap();

    let first = coordinator.run_phase_two(SOURCE, DEST, None).await.unwrap();
    assert_eq!(first.updated, 1);

    let second = coordinator.run_phase_two(SOURCE, DEST, None).await.unwrap();
    assert!(second.is_success());
    assert_eq!(second.copied(), 0);
    assert_eq!(second.version_conflicts, second.total);
    assert!(second.failures.is_empty());
}
