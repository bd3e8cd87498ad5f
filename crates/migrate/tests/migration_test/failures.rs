use std::sync::atomic::Ordering;
use std::sync::Arc;

use reindex_core::{CollectionSettings, FieldType, Schema};
use reindex_migrate::{default_schema, JobStatus, MigrationCoordinator, MigrationError};
use reindex_store::DocumentStore;

use crate::helpers::{seeded_store, FlakyStore, DEST, SLOW_COPY, SOURCE};

#[tokio::test]
async fn test_missing_source_is_rejected() {
    let store = seeded_store(1).await;
    let coordinator = MigrationCoordinator::new(store.clone());
    let err = coordinator
        .run_phase_one("nope", DEST, &default_schema(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::SourceMissing(ref s) if s == "nope"));
    assert!(store.collection_schema(DEST).await.unwrap().is_none());
}

#[tokio::test]
async fn test_phase_two_rejects_narrower_destination() {
    let store = seeded_store(1).await;
    store
        .create_collection(DEST, &Schema::new().field("name", FieldType::Keyword))
        .await
        .unwrap();
    let err = MigrationCoordinator::new(store)
        .run_phase_two(SOURCE, DEST, None)
        .await
        .unwrap_err();
    match err {
        MigrationError::IncompatibleSchema(problems) => {
            assert_eq!(problems, vec!["missing field 'age'".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

/// The store going away mid-copy fails the job and leaves a partial destination.
#[tokio::test(start_paused = true)]
async fn test_transport_failure_mid_copy_fails_phase_one() {
    let store = seeded_store(3_000).await;
    let coordinator = MigrationCoordinator::new(store.clone());
    let mut handle = coordinator.start_phase_one(SOURCE, DEST, &default_schema(), SLOW_COPY);
    assert!(handle.snapshot_taken().await);
    store.set_unavailable(true);

    let result = handle.wait().await.unwrap();
    assert_eq!(result.status, JobStatus::Failed);
    assert!(result.fatal.as_deref().unwrap_or_default().contains("unavailable"));

    store.set_unavailable(false);
    let copied = store.document_count(DEST).await.unwrap();
    assert!(copied < 3_000, "copied {copied}");
}

/// Phase two completes a destination left behind by a failed phase one.
#[tokio::test(start_paused = true)]
async fn test_phase_two_recovers_failed_phase_one() {
    let store = seeded_store(3_000).await;
    let coordinator = MigrationCoordinator::new(store.clone());
    let mut handle = coordinator.start_phase_one(SOURCE, DEST, &default_schema(), SLOW_COPY);
    assert!(handle.snapshot_taken().await);
    store.set_unavailable(true);
    assert_eq!(handle.wait().await.unwrap().status, JobStatus::Failed);
    store.set_unavailable(false);

    let result = coordinator.run_phase_two(SOURCE, DEST, None).await.unwrap();
    assert!(result.is_success());
    assert_eq!(result.copied() + result.version_conflicts, 3_000);
    assert_eq!(store.document_count(DEST).await, Some(3_000));
    assert_eq!(store.settings(DEST).await, Some(CollectionSettings::steady_state()));
}

/// Settings are restored even when the replay itself fails.
#[tokio::test]
async fn test_failed_replay_still_restores_settings() {
    let inner = seeded_store(10).await;
    let flaky = Arc::new(FlakyStore::new(inner.clone()));
    let coordinator = MigrationCoordinator::new(flaky.clone());
    coordinator
        .run_phase_one(SOURCE, DEST, &default_schema(), None)
        .await
        .unwrap();
    assert_eq!(inner.settings(DEST).await, Some(CollectionSettings::bulk_load()));

    flaky.fail_copy.store(true, Ordering::SeqCst);
    let result = coordinator.run_phase_two(SOURCE, DEST, None).await.unwrap();
    assert_eq!(result.status, JobStatus::Failed);
    assert!(result.fatal.as_deref().unwrap_or_default().contains("_reindex"));
    assert_eq!(inner.settings(DEST).await, Some(CollectionSettings::steady_state()));
}

/// A copy that succeeded but could not restore settings is still a failed phase,
/// with the copy counts kept.
#[tokio::test]
async fn test_restore_failure_keeps_copy_counts() {
    let inner = seeded_store(10).await;
    let flaky = Arc::new(FlakyStore::new(inner.clone()));
    let coordinator = MigrationCoordinator::new(flaky.clone());
    coordinator
        .run_phase_one(SOURCE, DEST, &default_schema(), None)
        .await
        .unwrap();
    inner.index(SOURCE, "4", reindex_migrate::default_payload(40)).await.unwrap();

    flaky.fail_settings.store(true, Ordering::SeqCst);
    let result = coordinator.run_phase_two(SOURCE, DEST, None).await.unwrap();
    assert_eq!(result.status, JobStatus::Failed);
    assert_eq!(result.updated, 1);
    assert_eq!(result.version_conflicts, 9);
    assert_eq!(inner.settings(DEST).await, Some(CollectionSettings::bulk_load()));
}
