//! Backend Driver Loop: the long-running task that waits for drive
//! triggers from the [`crate::registry::DialogRegistry`] and decides, per
//! trigger, whether a root dialog is actually eligible to run a round.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::run_state::{PersistenceStatus, RunState};

use super::round::DriveExecutor;

/// Runs forever, waking on every registry trigger and sweeping every root
/// currently flagged `needsDrive`. Eligibility is decided against the
/// *persisted* `DialogLatest`, not the registry's in-memory `Dialog` copy —
/// the registry only tracks which roots to look at, not their run state.
/// A root found ineligible has its flag cleared with reason `idle` so a
/// stale flag never wedges the loop into re-checking it every wake-up.
pub async fn run_driver_loop(executor: Arc<DriveExecutor>) {
    let mut sub = executor.registry.subscribe_triggers();
    loop {
        sub.wait_for_trigger().await;
        run_one_sweep(&executor).await;
    }
}

async fn run_one_sweep(executor: &DriveExecutor) {
    for root in executor.registry.dialogs_needing_drive().await {
        let root_id = { root.lock().await.core().id.root_id.clone() };
        if drive_if_eligible(executor, &root_id).await {
            continue;
        }
        executor
            .registry
            .mark_not_needing_drive(&root_id, "backend_driver_loop", "idle", now_ms())
            .await;
    }
}

/// Drives one round for `root_id` if it is currently eligible, reporting
/// whether it ran. Store errors are swallowed after a problem event — one
/// root's I/O failure must not take down the loop driving every other root.
async fn drive_if_eligible(executor: &DriveExecutor, root_id: &str) -> bool {
    let latest = match executor
        .store
        .load_dialog_latest(root_id, root_id, PersistenceStatus::Running)
        .await
    {
        Ok(Some(latest)) => latest,
        Ok(None) => return false,
        Err(_) => return false,
    };
    let has_pending_subdialogs = !executor
        .store
        .load_pending_subdialogs(root_id, root_id, PersistenceStatus::Running)
        .await
        .unwrap_or_default()
        .is_empty();
    let has_pending_q4h = executor
        .store
        .load_all_q4h_state(PersistenceStatus::Running)
        .await
        .unwrap_or_default()
        .iter()
        .any(|q| q.root_id == root_id && q.self_id == root_id);

    if !is_eligible_for_drive(&latest.run_state, has_pending_subdialogs, has_pending_q4h) {
        return false;
    }

    if let Err(err) = executor.execute_drive_round(root_id, root_id, None, false).await {
        executor.fanout.write(crate::events::EventEnvelope::Ephemeral(crate::events::EphemeralEnvelope {
            dialog: crate::ids::DialogId::root(root_id),
            timestamp_ms: now_ms(),
            kind: crate::events::EphemeralKind::Problem {
                message: format!("drive round failed: {err}"),
            },
        }));
    }
    true
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// A root is eligible for a drive when its run state is `proceeding` and
/// it has no outstanding subdialog or Q4H work blocking it. Every other
/// state — idle, stop-requested, interrupted, dead, terminal — is not.
pub fn is_eligible_for_drive(
    run_state: &RunState,
    has_pending_subdialogs: bool,
    has_pending_q4h: bool,
) -> bool {
    if has_pending_subdialogs || has_pending_q4h {
        return false;
    }
    matches!(run_state, RunState::Proceeding)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_state::{DeadReason, InterruptReason, PersistenceStatus};

    #[test]
    fn proceeding_with_no_pending_work_is_eligible() {
        assert!(is_eligible_for_drive(&RunState::Proceeding, false, false));
    }

    #[test]
    fn pending_subdialogs_block_eligibility() {
        assert!(!is_eligible_for_drive(&RunState::Proceeding, true, false));
    }

    #[test]
    fn pending_q4h_blocks_eligibility() {
        assert!(!is_eligible_for_drive(&RunState::Proceeding, false, true));
    }

    #[test]
    fn dead_is_never_eligible() {
        assert!(!is_eligible_for_drive(
            &RunState::Dead {
                reason: DeadReason::DeclaredByUser
            },
            false,
            false
        ));
    }

    #[test]
    fn stop_requested_is_not_eligible() {
        assert!(!is_eligible_for_drive(
            &RunState::ProceedingStopRequested { reason: "x".into() },
            false,
            false
        ));
    }

    #[test]
    fn interrupted_is_not_eligible_without_explicit_resume() {
        assert!(!is_eligible_for_drive(
            &RunState::Interrupted {
                reason: InterruptReason::CrashRecovery
            },
            false,
            false
        ));
    }

    #[test]
    fn idle_waiting_user_is_not_eligible() {
        assert!(!is_eligible_for_drive(&RunState::IdleWaitingUser, false, false));
    }

    #[test]
    fn terminal_is_not_eligible() {
        assert!(!is_eligible_for_drive(
            &RunState::Terminal {
                status: PersistenceStatus::Completed
            },
            false,
            false
        ));
    }

    use crate::dialog::{Dialog, DialogCore, RootExtra};
    use crate::driver::round::{GenerationOutcome, GenerationSource};
    use crate::error::CoreResult;
    use crate::fanout::PubChan;
    use crate::ids::DialogId;
    use crate::registry::DialogRegistry;
    use crate::store::records::{DialogLatest, DialogMetadata};
    use crate::store::FsEventStore;
    use async_trait::async_trait;
    use std::sync::Arc;
    use tempfile::tempdir;

    struct SilentGeneration;

    #[async_trait]
    impl GenerationSource for SilentGeneration {
        async fn generate(&self, _dialog_id: &str, _effective_prompt: Option<&str>) -> CoreResult<GenerationOutcome> {
            Ok(GenerationOutcome {
                last_assistant_saying: None,
                interrupted: false,
                special_calls: Vec::new(),
            })
        }
    }

    async fn harness() -> (DriveExecutor, tempfile::TempDir, String) {
        let dir = tempdir().unwrap();
        let store: Arc<dyn crate::store::EventStore> = Arc::new(FsEventStore::new(dir.path()));
        let registry = Arc::new(DialogRegistry::new());
        let root_id = "r1".to_string();
        store
            .save_dialog_metadata(
                PersistenceStatus::Running,
                &DialogMetadata {
                    self_id: root_id.clone(),
                    root_id: root_id.clone(),
                    agent_id: "alice".into(),
                    task_doc_path: "/t.tsk".into(),
                    created_at: time::OffsetDateTime::UNIX_EPOCH,
                    supdialog_self_id: None,
                    session_slug: None,
                },
            )
            .await
            .unwrap();
        registry
            .register(Dialog::Root {
                core: DialogCore::new(DialogId::root(&root_id), "alice".into(), "/t.tsk".into(), time::OffsetDateTime::UNIX_EPOCH),
                root: RootExtra::default(),
            })
            .await;
        let executor = DriveExecutor::new(store, registry, Arc::new(SilentGeneration), Arc::new(PubChan::new()));
        (executor, dir, root_id)
    }

    fn latest(run_state: RunState) -> DialogLatest {
        DialogLatest {
            current_course: 1,
            last_modified: time::OffsetDateTime::UNIX_EPOCH,
            status: PersistenceStatus::Running,
            message_count: 0,
            function_call_count: 0,
            subdialog_count: 0,
            run_state,
            disable_diligence_push: None,
            diligence_push_remaining_budget: None,
        }
    }

    #[tokio::test]
    async fn sweep_drives_an_eligible_root_and_clears_its_flag() {
        let (executor, _dir, root_id) = harness().await;
        executor
            .store
            .save_dialog_latest(&root_id, &root_id, PersistenceStatus::Running, &latest(RunState::Proceeding))
            .await
            .unwrap();
        executor.registry.mark_needs_drive(&root_id, "test", "t", 0).await;

        run_one_sweep(&executor).await;

        let saved = executor
            .store
            .load_dialog_latest(&root_id, &root_id, PersistenceStatus::Running)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(saved.run_state, RunState::IdleWaitingUser));
    }

    #[tokio::test]
    async fn sweep_clears_the_flag_on_an_ineligible_root_without_driving_it() {
        let (executor, _dir, root_id) = harness().await;
        executor
            .store
            .save_dialog_latest(&root_id, &root_id, PersistenceStatus::Running, &latest(RunState::IdleWaitingUser))
            .await
            .unwrap();
        executor.registry.mark_needs_drive(&root_id, "test", "t", 0).await;

        run_one_sweep(&executor).await;

        assert!(executor.registry.dialogs_needing_drive().await.is_empty());
        let saved = executor
            .store
            .load_dialog_latest(&root_id, &root_id, PersistenceStatus::Running)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(saved.run_state, RunState::IdleWaitingUser));
    }
}
