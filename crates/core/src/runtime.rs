//! Runtime: the facade the control-protocol server calls into. Wires the
//! event store, the dialog registry, and the administrative decision
//! modules (diligence, reminders, Q4H, run-state) into one handle per
//! process. Driving an actual generation round is delegated to an
//! injected [`crate::driver::round::GenerationSource`] — this facade owns
//! everything around that boundary: bookkeeping, persistence, and the
//! revival/trigger plumbing.

use std::sync::Arc;

use time::OffsetDateTime;

use crate::dialog::{Dialog, DialogCore, RootExtra};
use crate::diligence;
use crate::error::{CoreError, CoreResult};
use crate::events::{CourseEvent, CourseEventKind, PromptOrigin};
use crate::fanout::PubChan;
use crate::ids::DialogId;
use crate::q4h;
use crate::registry::DialogRegistry;
use crate::run_state::{DeadReason, PersistenceStatus, RunState};
use crate::store::records::{DialogLatest, DialogMetadata};
use crate::store::EventStore;

pub struct Runtime {
    pub store: Arc<dyn EventStore>,
    pub registry: Arc<DialogRegistry>,
    pub fanout: Arc<PubChan>,
}

impl Runtime {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            registry: Arc::new(DialogRegistry::new()),
            fanout: Arc::new(PubChan::new()),
        }
    }

    /// Builds a [`crate::driver::DriveExecutor`] sharing this runtime's
    /// store, registry, and fanout, and spawns the Backend Driver Loop on
    /// it. `generation` is the embedding application's LLM collaborator —
    /// this facade only owns the plumbing around it, not the model call
    /// itself.
    pub fn spawn_driver_loop(
        self: &Arc<Self>,
        generation: Arc<dyn crate::driver::GenerationSource>,
    ) -> tokio::task::JoinHandle<()> {
        let executor = Arc::new(crate::driver::DriveExecutor::new(
            self.store.clone(),
            self.registry.clone(),
            generation,
            self.fanout.clone(),
        ));
        tokio::spawn(crate::driver::run_driver_loop(executor))
    }

    /// Registers a fresh root dialog: writes its metadata once, initializes
    /// the latest pointer, and registers it in memory.
    pub async fn create_dialog(&self, agent_id: &str, task_doc_path: &str) -> CoreResult<String> {
        let root_id = uuid::Uuid::new_v4().to_string();
        let metadata = DialogMetadata {
            self_id: root_id.clone(),
            root_id: root_id.clone(),
            agent_id: agent_id.to_string(),
            task_doc_path: task_doc_path.to_string(),
            created_at: now(),
            supdialog_self_id: None,
            session_slug: None,
        };
        self.store
            .save_dialog_metadata(PersistenceStatus::Running, &metadata)
            .await?;

        let initial_latest = DialogLatest {
            current_course: 1,
            last_modified: now(),
            status: PersistenceStatus::Running,
            message_count: 0,
            function_call_count: 0,
            subdialog_count: 0,
            run_state: RunState::IdleWaitingUser,
            disable_diligence_push: None,
            diligence_push_remaining_budget: None,
        };
        self.store
            .save_dialog_latest(&root_id, &root_id, PersistenceStatus::Running, &initial_latest)
            .await?;

        let core = DialogCore::new(
            DialogId::root(&root_id),
            agent_id.to_string(),
            task_doc_path.to_string(),
            OffsetDateTime::now_utc(),
        );
        let dialog = Dialog::Root {
            core,
            root: RootExtra::default(),
        };
        self.registry.register(dialog).await;
        Ok(root_id)
    }

    /// Process-start crash reconciliation: every `running`-status dialog
    /// still found `proceeding` or `proceeding_stop_requested` (the process
    /// died mid-round, so nothing observed the transition out of it) is
    /// rewritten to `interrupted{crash_recovery}` and persisted. Returns the
    /// number of dialogs rewritten. Registration of the in-memory `Dialog`
    /// for each root is the caller's job, same as any other dialog the
    /// registry doesn't yet know about — this only touches the store.
    pub async fn recover_from_crash(&self) -> CoreResult<usize> {
        let mut recovered = 0;
        for root_id in self.store.list_dialogs(PersistenceStatus::Running).await? {
            let Some(mut latest) = self
                .store
                .load_dialog_latest(&root_id, &root_id, PersistenceStatus::Running)
                .await?
            else {
                continue;
            };
            if latest.run_state.reconcile_after_crash() {
                latest.last_modified = now();
                self.store
                    .save_dialog_latest(&root_id, &root_id, PersistenceStatus::Running, &latest)
                    .await?;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    /// `interrupt_dialog`: idempotent, no-op if the dialog isn't proceeding.
    pub async fn interrupt_dialog(&self, root_id: &str, reason: &str) -> CoreResult<bool> {
        let dialog = self
            .registry
            .get(root_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("dialog {root_id} not registered")))?;
        let mut guard = dialog.lock().await;
        Ok(guard.core_mut().run_state.request_interrupt(reason))
    }

    /// `emergency_stop`: interrupt every currently registered root,
    /// regardless of whether it is mid-drive.
    pub async fn emergency_stop(&self) -> CoreResult<usize> {
        let mut stopped = 0;
        for root_id in self.store.list_dialogs(PersistenceStatus::Running).await? {
            if let Some(dialog) = self.registry.get(&root_id).await {
                let mut guard = dialog.lock().await;
                if guard.core_mut().run_state.request_interrupt("emergency_stop") {
                    stopped += 1;
                }
            }
        }
        Ok(stopped)
    }

    pub async fn resume_dialog(
        &self,
        root_id: &str,
        allow_resume_from_interrupted: bool,
        has_user_prompt: bool,
    ) -> CoreResult<bool> {
        let dialog = self
            .registry
            .get(root_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("dialog {root_id} not registered")))?;
        let mut guard = dialog.lock().await;
        let resumed = guard
            .core_mut()
            .run_state
            .resume(allow_resume_from_interrupted, has_user_prompt);
        if resumed {
            self.registry
                .mark_needs_drive(root_id, "resume_dialog", "user_resumed", now_ms())
                .await;
        }
        Ok(resumed)
    }

    pub async fn set_diligence_push(&self, root_id: &str, disable: bool) -> CoreResult<()> {
        let dialog = self
            .registry
            .get(root_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("dialog {root_id} not registered")))?;
        let mut guard = dialog.lock().await;
        let (_, root) = guard
            .as_root_mut()
            .ok_or_else(|| CoreError::InvariantViolation("set_diligence_push on a non-root".into()))?;
        root.disable_diligence_push = disable;
        Ok(())
    }

    /// Applies diligence refill semantics: a positive configured max resets
    /// to it, else the flat `+3` additive refill.
    pub async fn refill_diligence_push_budget(&self, root_id: &str, configured_max: i64) -> CoreResult<u32> {
        let dialog = self
            .registry
            .get(root_id)
            .await
            .ok_or_else(|| CoreError::NotFound(format!("dialog {root_id} not registered")))?;
        let mut guard = dialog.lock().await;
        let (_, root) = guard
            .as_root_mut()
            .ok_or_else(|| CoreError::InvariantViolation("refill_diligence_push_budget on a non-root".into()))?;
        root.diligence_push_remaining_budget = diligence::refill(configured_max, root.diligence_push_remaining_budget);
        Ok(root.diligence_push_remaining_budget)
    }

    /// `declare_subdialog_dead`: marks the subdialog's persisted run state
    /// dead, supplies a failure response to the caller, and revives it if
    /// nothing else blocks.
    pub async fn declare_subdialog_dead(
        &self,
        parent_root_id: &str,
        parent_self_id: &str,
        subdialog_id: &str,
    ) -> CoreResult<()> {
        let mut latest = self
            .store
            .load_dialog_latest(parent_root_id, subdialog_id, PersistenceStatus::Running)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("subdialog {subdialog_id} has no latest pointer")))?;
        latest.run_state.declare_dead(DeadReason::DeclaredByUser);
        self.store
            .save_dialog_latest(parent_root_id, subdialog_id, PersistenceStatus::Running, &latest)
            .await?;

        let (_, remaining) = crate::reply_routing::take_pending_entry(
            self.store.as_ref(),
            parent_root_id,
            parent_self_id,
            PersistenceStatus::Running,
            subdialog_id,
        )
        .await?;

        let has_pending_q4h = self
            .q4h_questions_for(parent_root_id, parent_self_id)
            .await?
            .iter()
            .count()
            > 0;

        if remaining.is_empty() && !has_pending_q4h {
            self.registry
                .mark_needs_drive(parent_root_id, "declare_subdialog_dead", "callee_declared_dead", now_ms())
                .await;
        }
        Ok(())
    }

    /// `loadAllQ4hState` scans the whole status root; this filters to one
    /// dialog's own questions.
    async fn q4h_questions_for(
        &self,
        root_id: &str,
        self_id: &str,
    ) -> CoreResult<Vec<crate::store::records::HumanQuestion>> {
        let all = self.store.load_all_q4h_state(PersistenceStatus::Running).await?;
        Ok(all
            .into_iter()
            .filter(|q| q.root_id == root_id && q.self_id == self_id)
            .collect())
    }

    pub async fn get_q4h_state(&self, root_id: &str, self_id: &str) -> CoreResult<Vec<String>> {
        let questions = self.q4h_questions_for(root_id, self_id).await?;
        Ok(questions.into_iter().map(|q| q.id).collect())
    }

    /// Queues a human-authored message as the next `Prompting` event,
    /// resumes the persisted run state out of `idle`/`interrupted`, and
    /// flags the dialog for a drive round. Does not itself run a generation
    /// round — that is the Backend Driver Loop's job once it picks up the
    /// trigger this sets, and the loop only ever acts on the persisted
    /// `DialogLatest`, never the registry's in-memory copy.
    pub async fn queue_user_message(&self, root_id: &str, self_id: &str, content: &str) -> CoreResult<()> {
        self.append_prompting_event(root_id, self_id, content, PromptOrigin::User)
            .await?;
        self.resume_persisted_run_state(root_id, self_id).await?;
        self.registry
            .mark_needs_drive(root_id, "drive_dlg_by_user_msg", "user_message_queued", now_ms())
            .await;
        Ok(())
    }

    /// Like [`Self::queue_user_message`], but tagged as an `askHuman` answer
    /// rather than a fresh user message.
    pub async fn queue_user_answer(&self, root_id: &str, self_id: &str, content: &str) -> CoreResult<()> {
        self.append_prompting_event(root_id, self_id, content, PromptOrigin::Answer)
            .await?;
        self.resume_persisted_run_state(root_id, self_id).await?;
        self.registry
            .mark_needs_drive(root_id, "drive_dialog_by_user_answer", "user_answer_queued", now_ms())
            .await;
        Ok(())
    }

    /// Resumes the persisted `DialogLatest.run_state` with an explicit user
    /// prompt in hand: `idle_waiting_user` and `interrupted` both move to
    /// `proceeding`, everything else (including `dead`) is left untouched.
    /// Without this, a driver-loop sweep triggered by `mark_needs_drive`
    /// would find the dialog still `idle` and decline to drive it — the
    /// loop only auto-resumes on an `executeDriveRound` call that already
    /// carries a human prompt, which the loop's own unattended sweeps never
    /// do.
    async fn resume_persisted_run_state(&self, root_id: &str, self_id: &str) -> CoreResult<()> {
        let Some(mut latest) = self
            .store
            .load_dialog_latest(root_id, self_id, PersistenceStatus::Running)
            .await?
        else {
            return Ok(());
        };
        if latest.run_state.resume(true, true) {
            latest.last_modified = now();
            self.store
                .save_dialog_latest(root_id, self_id, PersistenceStatus::Running, &latest)
                .await?;
        }
        Ok(())
    }

    async fn append_prompting_event(
        &self,
        root_id: &str,
        self_id: &str,
        content: &str,
        origin: PromptOrigin,
    ) -> CoreResult<()> {
        let course = self
            .store
            .get_current_course_number(root_id, self_id, PersistenceStatus::Running)
            .await?
            .max(1);
        let existing = self
            .store
            .read_course_events(root_id, self_id, PersistenceStatus::Running, course)
            .await?;
        let event = CourseEvent {
            genseq: existing.len() as u64 + 1,
            timestamp_ms: now_ms(),
            kind: CourseEventKind::Prompting {
                content: content.to_string(),
                origin,
            },
        };
        self.store
            .append_event(root_id, self_id, PersistenceStatus::Running, course, &event)
            .await
    }

    pub async fn answer_question(
        &self,
        root_id: &str,
        self_id: &str,
        question_id: &str,
        has_pending_subdialogs: bool,
    ) -> CoreResult<Option<crate::q4h::AnswerOutcome>> {
        let outcome = q4h::answer(
            self.store.as_ref(),
            root_id,
            self_id,
            PersistenceStatus::Running,
            question_id,
        )
        .await?;
        if outcome.is_some() && !q4h::should_queue_as_up_next(has_pending_subdialogs) {
            self.registry
                .mark_needs_drive(root_id, "answer_question", "human_answer_ready", now_ms())
                .await;
        }
        Ok(outcome)
    }
}

fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FsEventStore;
    use tempfile::tempdir;

    fn runtime() -> (Runtime, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let store = Arc::new(FsEventStore::new(dir.path()));
        (Runtime::new(store), dir)
    }

    #[tokio::test]
    async fn create_dialog_registers_and_persists_metadata() {
        let (runtime, _dir) = runtime();
        let root_id = runtime.create_dialog("alice", "/t.tsk").await.unwrap();
        assert!(runtime.registry.get(&root_id).await.is_some());
        let metadata = runtime
            .store
            .load_dialog_metadata(&root_id, &root_id, PersistenceStatus::Running)
            .await
            .unwrap();
        assert!(metadata.is_some());
    }

    #[tokio::test]
    async fn interrupt_then_resume_round_trips_run_state() {
        let (runtime, _dir) = runtime();
        let root_id = runtime.create_dialog("alice", "/t.tsk").await.unwrap();
        {
            let dialog = runtime.registry.get(&root_id).await.unwrap();
            dialog.lock().await.core_mut().run_state = RunState::Proceeding;
        }
        assert!(runtime.interrupt_dialog(&root_id, "user_stop").await.unwrap());
        assert!(!runtime.resume_dialog(&root_id, false, false).await.unwrap());
        assert!(runtime.resume_dialog(&root_id, false, true).await.unwrap());
    }

    #[tokio::test]
    async fn set_diligence_push_toggles_the_flag() {
        let (runtime, _dir) = runtime();
        let root_id = runtime.create_dialog("alice", "/t.tsk").await.unwrap();
        runtime.set_diligence_push(&root_id, true).await.unwrap();
        let dialog = runtime.registry.get(&root_id).await.unwrap();
        let guard = dialog.lock().await;
        let (_, root) = guard.as_root().unwrap();
        assert!(root.disable_diligence_push);
    }

    #[tokio::test]
    async fn refill_diligence_push_budget_applies_configured_max() {
        let (runtime, _dir) = runtime();
        let root_id = runtime.create_dialog("alice", "/t.tsk").await.unwrap();
        let remaining = runtime.refill_diligence_push_budget(&root_id, 10).await.unwrap();
        assert_eq!(remaining, 10);
    }

    #[tokio::test]
    async fn queue_user_message_appends_a_prompting_event_and_flags_drive() {
        let (runtime, _dir) = runtime();
        let root_id = runtime.create_dialog("alice", "/t.tsk").await.unwrap();
        runtime.queue_user_message(&root_id, &root_id, "hello").await.unwrap();

        let events = runtime
            .store
            .read_course_events(&root_id, &root_id, PersistenceStatus::Running, 1)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            CourseEventKind::Prompting { content, origin } => {
                assert_eq!(content, "hello");
                assert_eq!(*origin, PromptOrigin::User);
            }
            other => panic!("expected Prompting, got {other:?}"),
        }

        let needing_drive = runtime.registry.dialogs_needing_drive().await;
        assert_eq!(needing_drive.len(), 1);

        let latest = runtime
            .store
            .load_dialog_latest(&root_id, &root_id, PersistenceStatus::Running)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(latest.run_state, RunState::Proceeding));
    }

    #[tokio::test]
    async fn queue_user_answer_resumes_an_interrupted_dialog() {
        let (runtime, _dir) = runtime();
        let root_id = runtime.create_dialog("alice", "/t.tsk").await.unwrap();
        {
            let mut latest = runtime
                .store
                .load_dialog_latest(&root_id, &root_id, PersistenceStatus::Running)
                .await
                .unwrap()
                .unwrap();
            latest.run_state = RunState::Interrupted {
                reason: crate::run_state::InterruptReason::UserStop,
            };
            runtime
                .store
                .save_dialog_latest(&root_id, &root_id, PersistenceStatus::Running, &latest)
                .await
                .unwrap();
        }

        runtime.queue_user_answer(&root_id, &root_id, "42").await.unwrap();

        let latest = runtime
            .store
            .load_dialog_latest(&root_id, &root_id, PersistenceStatus::Running)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(latest.run_state, RunState::Proceeding));
    }

    #[tokio::test]
    async fn queue_user_message_leaves_a_dead_dialog_dead() {
        let (runtime, _dir) = runtime();
        let root_id = runtime.create_dialog("alice", "/t.tsk").await.unwrap();
        {
            let mut latest = runtime
                .store
                .load_dialog_latest(&root_id, &root_id, PersistenceStatus::Running)
                .await
                .unwrap()
                .unwrap();
            latest.run_state.declare_dead(DeadReason::DeclaredByUser);
            runtime
                .store
                .save_dialog_latest(&root_id, &root_id, PersistenceStatus::Running, &latest)
                .await
                .unwrap();
        }

        runtime.queue_user_message(&root_id, &root_id, "hello").await.unwrap();

        let latest = runtime
            .store
            .load_dialog_latest(&root_id, &root_id, PersistenceStatus::Running)
            .await
            .unwrap()
            .unwrap();
        assert!(latest.run_state.is_dead());
    }
}
