//! Process-start crash reconciliation: a `running`-status dialog found still
//! `proceeding` (the process died mid-round) is rewritten to
//! `interrupted{crash_recovery}`, and a later user message can resume it
//! from there the same way it resumes any other interrupted dialog.

use std::sync::Arc;

use dominds_core::run_state::{InterruptReason, PersistenceStatus, RunState};
use dominds_core::runtime::Runtime;
use dominds_core::store::FsEventStore;

#[tokio::test]
async fn proceeding_dialogs_are_reconciled_to_interrupted_and_idle_ones_are_left_alone() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FsEventStore::new(dir.path()));
    let runtime = Runtime::new(store.clone());

    let mid_round = runtime.create_dialog("alice", "/t.tsk").await.unwrap();
    {
        let mut latest = store
            .load_dialog_latest(&mid_round, &mid_round, PersistenceStatus::Running)
            .await
            .unwrap()
            .unwrap();
        latest.run_state = RunState::Proceeding;
        store
            .save_dialog_latest(&mid_round, &mid_round, PersistenceStatus::Running, &latest)
            .await
            .unwrap();
    }
    let untouched = runtime.create_dialog("bob", "/t.tsk").await.unwrap();

    let recovered = runtime.recover_from_crash().await.unwrap();
    assert_eq!(recovered, 1);

    let mid_round_latest = store
        .load_dialog_latest(&mid_round, &mid_round, PersistenceStatus::Running)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        mid_round_latest.run_state,
        RunState::Interrupted {
            reason: InterruptReason::CrashRecovery
        }
    );

    let untouched_latest = store
        .load_dialog_latest(&untouched, &untouched, PersistenceStatus::Running)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched_latest.run_state, RunState::IdleWaitingUser);

    // A second sweep with nothing left mid-round finds nothing to recover.
    assert_eq!(runtime.recover_from_crash().await.unwrap(), 0);

    // A user message reaching the crash-recovered dialog resumes it, the
    // same path a fresh `interrupted{user_stop}` dialog would take.
    runtime.queue_user_message(&mid_round, &mid_round, "still there?").await.unwrap();
    let resumed = store
        .load_dialog_latest(&mid_round, &mid_round, PersistenceStatus::Running)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resumed.run_state, RunState::Proceeding);
    assert_eq!(runtime.registry.dialogs_needing_drive().await.len(), 1);
}
