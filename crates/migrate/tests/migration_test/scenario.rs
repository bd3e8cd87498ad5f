use reindex_migrate::{
    default_schema, ConsistencyVerifier, JobStatus, MigrationCoordinator, WorkloadGenerator,
    WorkloadOp,
};

use crate::helpers::{age_of, created_payload, seeded_store, updated_payload, DEST, SLOW_COPY, SOURCE};

const UPDATE_ID: &str = "1000";
const DELETE_ID: &str = "2000";
const CREATE_ID: &str = "999999999";

/// The full checkpoint walk: seed, phase one under concurrent writes, phase two.
#[tokio::test(start_paused = true)]
async fn test_checkpoint_scenario() {
    let store = seeded_store(3_000).await;
    let verifier = ConsistencyVerifier::new(store.clone());
    let targets = [UPDATE_ID, DELETE_ID, CREATE_ID];

    // Targets before anything moves.
    let initial = verifier.checkpoint("initial source", SOURCE, &targets).await.unwrap();
    assert!(initial.get(UPDATE_ID).unwrap().is_found());
    assert!(initial.get(DELETE_ID).unwrap().is_found());
    assert!(!initial.get(CREATE_ID).unwrap().is_found());

    let coordinator = MigrationCoordinator::new(store.clone());
    let mut phase_one = coordinator.start_phase_one(SOURCE, DEST, &default_schema(), SLOW_COPY);
    assert!(phase_one.snapshot_taken().await);
    assert_eq!(phase_one.status(), JobStatus::Running);

    let report = WorkloadGenerator::new(store.clone(), SOURCE)
        .run(vec![
            WorkloadOp::Create { id: CREATE_ID.into(), payload: created_payload() },
            WorkloadOp::Update { id: UPDATE_ID.into(), payload: updated_payload() },
            WorkloadOp::Delete { id: DELETE_ID.into() },
        ])
        .await;
    assert!(report.all_succeeded(), "{:?}", report.outcomes);

    let first = phase_one.wait().await.unwrap();
    assert!(first.is_success(), "{}", first.summary_line());

    let source = verifier.checkpoint("source after edits", SOURCE, &targets).await.unwrap();
    assert_eq!(source.get(UPDATE_ID).unwrap().document().and_then(age_of), Some(111_111_111));
    assert!(!source.get(DELETE_ID).unwrap().is_found());
    assert!(source.get(CREATE_ID).unwrap().is_found());

    let dest = verifier.checkpoint("dest after phase 1", DEST, &targets).await.unwrap();
    assert_eq!(dest.get(UPDATE_ID).unwrap().document().and_then(age_of), Some(1_000));
    assert_eq!(dest.get(DELETE_ID).unwrap().document().and_then(age_of), Some(2_000));
    assert!(!dest.get(CREATE_ID).unwrap().is_found());

    let second = coordinator.run_phase_two(SOURCE, DEST, SLOW_COPY).await.unwrap();
    assert!(second.is_success(), "{}", second.summary_line());
    assert_eq!(second.copied(), 2);

    let dest = verifier.checkpoint("dest after phase 2", DEST, &targets).await.unwrap();
    let updated = dest.get(UPDATE_ID).unwrap().document().unwrap();
    assert_eq!(updated.payload, updated_payload());
    assert_eq!(updated.version, 2);
    assert_eq!(dest.get(DELETE_ID).unwrap().document().and_then(age_of), Some(2_000));
    assert_eq!(dest.get(CREATE_ID).unwrap().document().map(|d| &d.payload), Some(&created_payload()));

    let lines = dest.lines();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].contains("dest after phase 2"));
}
