//! Drive Executor — the decision logic for one round. The actual model
//! invocation is an external collaborator (`GenerationSource`); this module
//! owns effective-prompt resolution, the reply-target tie-break, and the
//! follow-up-scheduling decision around it.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::{CoreError, CoreResult};
use crate::fanout::PubChan;
use crate::ids::CallId;
use crate::registry::DialogRegistry;
use crate::run_state::{InterruptReason, PersistenceStatus, RunState};
use crate::special_call::{CallType, ParsedCall};
use crate::store::EventStore;

use super::special_call_exec;

/// The external LLM stream core. Side-effects the event log and emits the
/// function calls a generation produced; the special-call executor and
/// reply-routing path around it are the driver's own responsibility, not
/// this trait's.
#[async_trait]
pub trait GenerationSource: Send + Sync {
    async fn generate(&self, dialog_id: &str, effective_prompt: Option<&str>) -> CoreResult<GenerationOutcome>;
}

/// One model-emitted inter-agent call, already parsed, carried out of a
/// generation round for the executor to act on.
#[derive(Debug, Clone)]
pub struct EmittedCall {
    pub call_id: CallId,
    pub parsed: ParsedCall,
}

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub last_assistant_saying: Option<String>,
    pub interrupted: bool,
    pub special_calls: Vec<EmittedCall>,
}

/// A reply target attached to a drive prompt, carried from the caller that
/// scheduled the callee's round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubdialogReplyTarget {
    pub owner_dialog_id: String,
    pub call_type: CallType,
    pub call_id: CallId,
}

/// Resolves the effective prompt: an explicit human prompt wins, else the
/// dialog's queued `upNext` (already taken by the caller), else none.
pub fn resolve_effective_prompt(human_prompt: Option<String>, up_next: Option<String>) -> Option<String> {
    human_prompt.or(up_next)
}

/// Whether the core should schedule itself again: only when the round
/// returned without interruption and a fresh `upNext` is now queued.
pub fn should_reschedule_follow_up(interrupted: bool, up_next_now_present: bool) -> bool {
    !interrupted && up_next_now_present
}

/// Resolves which caller to route a subdialog's reply supply to: the
/// round's attached reply target if its call type matches the pending
/// record found for it, else the fallback `assignmentFromSup` caller. A
/// target whose call type disagrees with the matching pending record is
/// dropped as stale rather than erroring.
pub fn resolve_reply_target(
    attached: Option<&SubdialogReplyTarget>,
    pending_call_type_for_attached_owner: Option<CallType>,
    assignment_caller_dialog_id: &str,
    assignment_caller_has_pending_record: bool,
) -> Option<String> {
    if let Some(target) = attached {
        match pending_call_type_for_attached_owner {
            Some(pending_type) if pending_type == target.call_type => {
                return Some(target.owner_dialog_id.clone());
            }
            _ => {
                // Stale target: dropped with a warning by the caller, fall
                // through to assignmentFromSup.
            }
        }
    }
    if assignment_caller_has_pending_record {
        Some(assignment_caller_dialog_id.to_string())
    } else {
        None
    }
}

/// What a drive round did, reported back to whatever scheduled it (the
/// Backend Driver Loop, or an inline recursive call from the special-call
/// executor).
#[derive(Debug, Clone, Default)]
pub struct RoundOutcome {
    pub ran: bool,
    pub interrupted: bool,
    pub rescheduled_follow_up: bool,
    /// The round's last assistant saying, carried out for the FBR serial
    /// loop to accumulate per-round sayings without re-reading the course
    /// log after each round.
    pub last_saying: Option<String>,
}

/// The Drive Executor: owns the per-round contract (`executeDriveRound`)
/// around one injected [`GenerationSource`]. Shared by the Backend Driver
/// Loop (one round per eligible root) and the special-call executor
/// (inline recursive rounds for Type-A resumption and FBR's serial loop).
pub struct DriveExecutor {
    pub store: Arc<dyn EventStore>,
    pub registry: Arc<DialogRegistry>,
    pub generation: Arc<dyn GenerationSource>,
    pub fanout: Arc<PubChan>,
}

impl DriveExecutor {
    pub fn new(
        store: Arc<dyn EventStore>,
        registry: Arc<DialogRegistry>,
        generation: Arc<dyn GenerationSource>,
        fanout: Arc<PubChan>,
    ) -> Self {
        Self {
            store,
            registry,
            generation,
            fanout,
        }
    }

    /// Runs one drive round for `self_id` within `root_id`'s tree. Steps:
    /// fail-fast busy check, lock acquire, active-run marker, latest-pointer
    /// run-state gate, Context Health Gate, the generation invocation, the
    /// special-call executor, follow-up reschedule, and lock release (via
    /// the guard's `Drop`).
    pub async fn execute_drive_round(
        &self,
        root_id: &str,
        self_id: &str,
        human_prompt: Option<String>,
        wait_in_queue: bool,
    ) -> CoreResult<RoundOutcome> {
        let lock = self.registry.dialog_lock(self_id).await;
        let _guard = lock.acquire(wait_in_queue).await?;

        // Active-run marker: clear the trigger for this root immediately so
        // the loop doesn't re-dispatch the same work while this round is
        // in flight. A fresh trigger raised mid-round (follow-up reschedule,
        // a nested call) sets it again below.
        if self_id == root_id {
            self.registry
                .mark_not_needing_drive(root_id, "execute_drive_round", "active_run_started", now_ms())
                .await;
        }

        let Some(mut latest) = self
            .store
            .load_dialog_latest(root_id, self_id, PersistenceStatus::Running)
            .await?
        else {
            return Err(CoreError::NotFound(format!("dialog {self_id} has no latest pointer")));
        };

        if latest.run_state.is_dead() {
            return Ok(RoundOutcome::default());
        }
        if !latest.run_state.is_proceeding() && human_prompt.is_none() {
            return Ok(RoundOutcome::default());
        }
        if matches!(latest.run_state, RunState::IdleWaitingUser) {
            latest.run_state = RunState::Proceeding;
        }

        let gate = super::context_health::consult(None, human_prompt.is_some(), None);
        if let super::context_health::GateDecision::Suspend { reason } = gate {
            latest.run_state = RunState::IdleWaitingUser;
            self.store
                .save_dialog_latest(root_id, self_id, PersistenceStatus::Running, &latest)
                .await?;
            self.fanout.write(crate::events::EventEnvelope::Ephemeral(crate::events::EphemeralEnvelope {
                dialog: crate::ids::DialogId::new(self_id, root_id),
                timestamp_ms: now_ms(),
                kind: crate::events::EphemeralKind::Problem { message: reason },
            }));
            return Ok(RoundOutcome::default());
        }

        let outcome = self.generation.generate(self_id, human_prompt.as_deref()).await?;

        let produced_up_next =
            special_call_exec::execute_emitted_calls(self, root_id, self_id, &outcome.special_calls).await?;

        if outcome.interrupted {
            latest.run_state.observe_interrupted(InterruptReason::UserStop);
        } else if !latest.run_state.is_dead() {
            latest.run_state = RunState::IdleWaitingUser;
        }
        latest.last_modified = OffsetDateTime::now_utc();
        self.store
            .save_dialog_latest(root_id, self_id, PersistenceStatus::Running, &latest)
            .await?;

        let reschedule = should_reschedule_follow_up(outcome.interrupted, produced_up_next);
        if reschedule {
            self.registry
                .mark_needs_drive(root_id, "execute_drive_round", "follow_up_up_next", now_ms())
                .await;
        }

        Ok(RoundOutcome {
            ran: true,
            interrupted: outcome.interrupted,
            rescheduled_follow_up: reschedule,
            last_saying: outcome.last_assistant_saying,
        })
    }
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_human_prompt_wins_over_up_next() {
        assert_eq!(
            resolve_effective_prompt(Some("hi".into()), Some("queued".into())),
            Some("hi".into())
        );
    }

    #[test]
    fn falls_back_to_up_next_when_no_human_prompt() {
        assert_eq!(resolve_effective_prompt(None, Some("queued".into())), Some("queued".into()));
    }

    #[test]
    fn none_when_neither_present() {
        assert_eq!(resolve_effective_prompt(None, None), None);
    }

    #[test]
    fn reschedules_only_when_not_interrupted_and_up_next_present() {
        assert!(should_reschedule_follow_up(false, true));
        assert!(!should_reschedule_follow_up(true, true));
        assert!(!should_reschedule_follow_up(false, false));
    }

    #[test]
    fn attached_target_wins_when_call_type_matches() {
        let target = SubdialogReplyTarget {
            owner_dialog_id: "caller-a".into(),
            call_type: CallType::B,
            call_id: "c1".into(),
        };
        let resolved = resolve_reply_target(Some(&target), Some(CallType::B), "caller-b", true);
        assert_eq!(resolved, Some("caller-a".to_string()));
    }

    #[test]
    fn stale_target_falls_back_to_assignment_caller() {
        let target = SubdialogReplyTarget {
            owner_dialog_id: "caller-a".into(),
            call_type: CallType::B,
            call_id: "c1".into(),
        };
        let resolved = resolve_reply_target(Some(&target), Some(CallType::C), "caller-b", true);
        assert_eq!(resolved, Some("caller-b".to_string()));
    }

    #[test]
    fn no_target_and_no_pending_record_resolves_to_none() {
        let resolved = resolve_reply_target(None, None, "caller-b", false);
        assert_eq!(resolved, None);
    }
}
