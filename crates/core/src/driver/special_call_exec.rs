//! The special-call executor: turns a generation round's emitted calls into
//! the stateful dispatch the driver promised — `askHuman` merge-and-persist,
//! Type A's synchronous reply, Type B's session-keyed subdialog (fresh or
//! reused), Type C's one-shot subdialog, and `freshBootsReasoning`'s serial
//! multi-round loop. `plan_call`/`resolve_type_b_subdialog` in
//! `special_call::execute` stay pure; this module is where their output
//! meets the store, the registry, and a recursive drive round.

use time::OffsetDateTime;

use crate::error::{CoreError, CoreResult};
use crate::events::{AnchorRole, CourseEvent, CourseEventKind, DurableEnvelope, EventEnvelope, ToolResultStatus};
use crate::ids::{CallId, DialogId};
use crate::q4h;
use crate::reply_routing::{supply_response_to_supdialog, RevivalAction, SupplyResponseRequest};
use crate::run_state::{PersistenceStatus, RunState};
use crate::special_call::{
    classify, environment_failure_message, fbr, plan_call, resolve_type_b_subdialog, tellask_result_message,
    AskHumanCall, CallType, ParsedCall, ReplyPlan, SessionResolution,
};
use crate::store::records::{DialogLatest, DialogMetadata};

use super::round::{DriveExecutor, EmittedCall};

/// Effort `freshBootsReasoning` resolves to absent a per-agent override.
/// No per-agent configuration registry exists to source this from; see
/// `special_call::fbr::resolve_effort` for the override precedence.
const DEFAULT_FBR_EFFORT: i64 = 3;

/// Dispatches every call a round emitted. Returns whether a fresh `upNext`
/// prompt is now queued for the caller — always `false` in this persistence
/// model, since revival after a subdialog reply runs through the registry
/// trigger or a direct recursive drive rather than an in-memory `upNext`
/// slot.
pub async fn execute_emitted_calls(
    executor: &DriveExecutor,
    root_id: &str,
    self_id: &str,
    calls: &[EmittedCall],
) -> CoreResult<bool> {
    let mut ask_human_calls = Vec::new();
    let mut other_calls = Vec::new();
    for call in calls {
        match &call.parsed {
            ParsedCall::AskHuman { tellask_content } => ask_human_calls.push(AskHumanCall {
                call_id: call.call_id.clone(),
                tellask_content: tellask_content.clone(),
            }),
            _ => other_calls.push(call),
        }
    }

    if !ask_human_calls.is_empty() {
        execute_ask_human(executor, root_id, self_id, &ask_human_calls).await?;
    }

    for call in other_calls {
        execute_tellask_like(executor, root_id, self_id, call).await?;
    }

    Ok(false)
}

fn call_name(call: &ParsedCall) -> &'static str {
    match call {
        ParsedCall::TellaskBack { .. } => "tellaskBack",
        ParsedCall::Tellask { .. } => "tellask",
        ParsedCall::TellaskSessionless { .. } => "tellaskSessionless",
        ParsedCall::AskHuman { .. } => "askHuman",
        ParsedCall::FreshBootsReasoning { .. } => "freshBootsReasoning",
    }
}

/// Merges this round's `askHuman` calls into one persisted question and
/// publishes the `Q4hAsked` anchor so a live dashboard sees the fan-out.
async fn execute_ask_human(
    executor: &DriveExecutor,
    root_id: &str,
    self_id: &str,
    calls: &[AskHumanCall],
) -> CoreResult<()> {
    let metadata = executor
        .store
        .load_dialog_metadata(root_id, self_id, PersistenceStatus::Running)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("dialog {self_id} has no metadata")))?;
    let course = executor
        .store
        .get_current_course_number(root_id, self_id, PersistenceStatus::Running)
        .await?
        .max(1);

    let question = q4h::ask(
        executor.store.as_ref(),
        root_id,
        self_id,
        PersistenceStatus::Running,
        &metadata.agent_id,
        &metadata.task_doc_path,
        course,
        0,
        calls,
        "Multiple questions were raised for you:",
    )
    .await?;

    let event = CourseEvent {
        genseq: next_genseq(executor, root_id, self_id, course).await?,
        timestamp_ms: now_ms(),
        kind: CourseEventKind::Q4hAsked {
            question_id: question.id.clone(),
            call_ids: question.all_call_ids(),
        },
    };
    publish_event(executor, root_id, self_id, course, event).await
}

/// Classifies one non-`askHuman` call and dispatches it to its Type A/B/C
/// handler. A classify issue (`tellaskBack` from a root, a direct self-call)
/// is surfaced as a failed tool result rather than propagated — the model
/// that emitted the bad call gets to see why and try again, the round
/// itself does not abort.
async fn execute_tellask_like(
    executor: &DriveExecutor,
    root_id: &str,
    self_id: &str,
    call: &EmittedCall,
) -> CoreResult<()> {
    let caller_is_root = self_id == root_id;
    let caller_agent_id = executor
        .store
        .load_dialog_metadata(root_id, self_id, PersistenceStatus::Running)
        .await?
        .map(|m| m.agent_id)
        .unwrap_or_default();

    let call_type = match classify(&call.parsed, caller_is_root, &caller_agent_id) {
        Ok(call_type) => call_type,
        Err(issue) => {
            let content = environment_failure_message(call_name(&call.parsed), &issue.to_string()).content;
            return append_tool_result(executor, root_id, self_id, call.call_id.clone(), ToolResultStatus::Failed, content).await;
        }
    };

    match (call_type, &call.parsed) {
        (CallType::A, _) => execute_type_a(executor, root_id, self_id, call).await,
        (CallType::B, _) => execute_type_b(executor, root_id, self_id, call).await,
        (CallType::C, ParsedCall::FreshBootsReasoning { .. }) => execute_fbr_call(executor, root_id, self_id, call).await,
        (CallType::C, _) => execute_type_c(executor, root_id, self_id, call).await,
    }
}

/// `tellaskBack`: the universal reply mechanism for any subdialog, whatever
/// spawned it. Mirrors the call's own completion as a `tool_result` on the
/// callee's own log (the synchronous half `tellask_result_msg` documents),
/// then relays the content to the caller.
async fn execute_type_a(executor: &DriveExecutor, root_id: &str, self_id: &str, call: &EmittedCall) -> CoreResult<()> {
    let ParsedCall::TellaskBack { tellask_content } = &call.parsed else {
        unreachable!("classify() pairs CallType::A only with TellaskBack");
    };
    let metadata = executor
        .store
        .load_dialog_metadata(root_id, self_id, PersistenceStatus::Running)
        .await?
        .ok_or_else(|| CoreError::NotFound(format!("dialog {self_id} has no metadata")))?;
    let parent_self_id = metadata
        .supdialog_self_id
        .ok_or_else(|| CoreError::InvariantViolation(format!("subdialog {self_id} has no supdialog on record")))?;

    let mirror = tellask_result_message("tellaskBack", ToolResultStatus::Completed, tellask_content).content;
    append_tool_result(executor, root_id, self_id, call.call_id.clone(), ToolResultStatus::Completed, mirror).await?;

    relay_and_maybe_drive(
        executor,
        root_id,
        &parent_self_id,
        self_id,
        ToolResultStatus::Completed,
        tellask_content.clone(),
        None,
        None,
    )
    .await
}

/// `tellask`: reuses a live same-session subdialog when one exists under
/// this root, otherwise creates and indexes a fresh one.
async fn execute_type_b(executor: &DriveExecutor, root_id: &str, self_id: &str, call: &EmittedCall) -> CoreResult<()> {
    let ParsedCall::Tellask {
        tellask_content,
        target_agent_id,
        session_slug,
    } = &call.parsed
    else {
        unreachable!("classify() pairs CallType::B only with Tellask");
    };

    let root_dialog = executor
        .registry
        .get(root_id)
        .await
        .ok_or_else(|| CoreError::InvariantViolation(format!("root {root_id} not registered")))?;
    let resolution = {
        let mut guard = root_dialog.lock().await;
        let (_, root_extra) = guard
            .as_root_mut()
            .ok_or_else(|| CoreError::InvariantViolation(format!("dialog {root_id} is not a root")))?;
        resolve_type_b_subdialog(
            executor.store.as_ref(),
            root_extra,
            root_id,
            target_agent_id,
            session_slug,
            || uuid::Uuid::new_v4().to_string(),
        )
        .await?
    };
    let subdialog_id = resolution.subdialog_id().to_string();

    append_pending_record(executor, root_id, self_id, &call.parsed, CallType::B, call.call_id.clone(), subdialog_id.clone()).await?;

    if let SessionResolution::Created { .. } = resolution {
        ensure_subdialog_exists(executor, root_id, &subdialog_id, target_agent_id, self_id, Some(session_slug.clone())).await?;
    }
    append_assignment_anchor(executor, root_id, &subdialog_id, call.call_id.clone(), self_id).await?;

    Box::pin(executor.execute_drive_round(root_id, &subdialog_id, Some(tellask_content.clone()), true)).await?;
    Ok(())
}

/// `tellaskSessionless`: always a fresh, unindexed subdialog.
async fn execute_type_c(executor: &DriveExecutor, root_id: &str, self_id: &str, call: &EmittedCall) -> CoreResult<()> {
    let ParsedCall::TellaskSessionless {
        tellask_content,
        target_agent_id,
    } = &call.parsed
    else {
        unreachable!("classify() pairs a non-FBR CallType::C only with TellaskSessionless");
    };
    let subdialog_id = uuid::Uuid::new_v4().to_string();

    append_pending_record(executor, root_id, self_id, &call.parsed, CallType::C, call.call_id.clone(), subdialog_id.clone()).await?;
    ensure_subdialog_exists(executor, root_id, &subdialog_id, target_agent_id, self_id, None).await?;
    append_assignment_anchor(executor, root_id, &subdialog_id, call.call_id.clone(), self_id).await?;

    Box::pin(executor.execute_drive_round(root_id, &subdialog_id, Some(tellask_content.clone()), true)).await?;
    Ok(())
}

/// `freshBootsReasoning`: one self-directed subdialog, driven serially for
/// `effort` rounds under a rotating perspective header. The pending record
/// is written only before the final round — an early round never leaves a
/// caller waiting on a reply it hasn't promised yet. Suspension (the
/// Context Health Gate, an interrupt, a declared-dead callee) at any round
/// ends the loop without relaying, leaving the subdialog to be resumed by
/// its own later drive.
async fn execute_fbr_call(executor: &DriveExecutor, root_id: &str, self_id: &str, call: &EmittedCall) -> CoreResult<()> {
    let ParsedCall::FreshBootsReasoning {
        tellask_content,
        effort_override,
    } = &call.parsed
    else {
        unreachable!("classify() pairs CallType::C/FreshBootsReasoning only with FreshBootsReasoning");
    };

    let effort = fbr::resolve_effort(*effort_override, DEFAULT_FBR_EFFORT);
    if fbr::is_disabled(effort) {
        let content = environment_failure_message("freshBootsReasoning", "fresh-boots reasoning is disabled at this effort").content;
        return append_tool_result(executor, root_id, self_id, call.call_id.clone(), ToolResultStatus::Failed, content).await;
    }

    let subdialog_id = format!("fbr-{}", call.call_id);
    let caller_agent_id = executor
        .store
        .load_dialog_metadata(root_id, self_id, PersistenceStatus::Running)
        .await?
        .map(|m| m.agent_id)
        .unwrap_or_default();
    ensure_subdialog_exists(executor, root_id, &subdialog_id, &caller_agent_id, self_id, None).await?;
    append_assignment_anchor(executor, root_id, &subdialog_id, call.call_id.clone(), self_id).await?;

    let mut round_sayings = Vec::new();
    for round in 1..=effort {
        if fbr::writes_pending_record(round, effort) {
            append_pending_record(executor, root_id, self_id, &call.parsed, CallType::C, call.call_id.clone(), subdialog_id.clone()).await?;
        }
        let prompt = format!("{}\n\n{}", fbr::round_prompt_header(round, effort), tellask_content);
        let outcome = Box::pin(executor.execute_drive_round(root_id, &subdialog_id, Some(prompt), true)).await?;
        if !outcome.ran || outcome.interrupted {
            return Ok(());
        }
        if let Some(saying) = outcome.last_saying {
            round_sayings.push(saying);
        }
    }

    let distill_note = (effort > 1).then_some("Synthesize the distinct perspectives above into one coherent recommendation.");
    relay_and_maybe_drive(
        executor,
        root_id,
        self_id,
        &subdialog_id,
        ToolResultStatus::Completed,
        String::new(),
        Some(&round_sayings),
        distill_note,
    )
    .await
}

/// Builds the `PendingSubdialogRecord` via `plan_call` and appends it to the
/// caller's pending list. `plan_call` always returns `AwaitReply` for these
/// three call shapes; `DirectReply` only ever comes back for `tellaskBack`.
async fn append_pending_record(
    executor: &DriveExecutor,
    root_id: &str,
    self_id: &str,
    parsed: &ParsedCall,
    call_type: CallType,
    call_id: CallId,
    subdialog_id: String,
) -> CoreResult<()> {
    let calling_course = Some(
        executor
            .store
            .get_current_course_number(root_id, self_id, PersistenceStatus::Running)
            .await?
            .max(1),
    );
    let plan = plan_call(parsed, call_type, call_id, subdialog_id, calling_course, OffsetDateTime::now_utc());
    let ReplyPlan::AwaitReply(record) = plan else {
        unreachable!("plan_call only returns DirectReply for tellaskBack");
    };
    executor
        .store
        .append_pending_subdialog(root_id, self_id, PersistenceStatus::Running, record)
        .await
}

/// Writes a subdialog's metadata and initial latest pointer the first time
/// it is dispatched. Idempotent: a second call for an already-known id is a
/// no-op, so a reused Type-B session or a repeat FBR call never clobbers
/// live state.
async fn ensure_subdialog_exists(
    executor: &DriveExecutor,
    root_id: &str,
    subdialog_id: &str,
    agent_id: &str,
    caller_self_id: &str,
    session_slug: Option<String>,
) -> CoreResult<()> {
    if executor
        .store
        .load_dialog_metadata(root_id, subdialog_id, PersistenceStatus::Running)
        .await?
        .is_some()
    {
        return Ok(());
    }
    let task_doc_path = executor
        .store
        .load_dialog_metadata(root_id, caller_self_id, PersistenceStatus::Running)
        .await?
        .map(|m| m.task_doc_path)
        .unwrap_or_default();

    executor
        .store
        .save_dialog_metadata(
            PersistenceStatus::Running,
            &DialogMetadata {
                self_id: subdialog_id.to_string(),
                root_id: root_id.to_string(),
                agent_id: agent_id.to_string(),
                task_doc_path,
                created_at: OffsetDateTime::now_utc(),
                supdialog_self_id: Some(caller_self_id.to_string()),
                session_slug,
            },
        )
        .await?;

    executor
        .store
        .save_dialog_latest(
            root_id,
            subdialog_id,
            PersistenceStatus::Running,
            &DialogLatest {
                current_course: 1,
                last_modified: OffsetDateTime::now_utc(),
                status: PersistenceStatus::Running,
                message_count: 0,
                function_call_count: 0,
                subdialog_count: 0,
                run_state: RunState::Proceeding,
                disable_diligence_push: None,
                diligence_push_remaining_budget: None,
            },
        )
        .await
}

/// Appends the `assignment` half of the teammate-call anchor pair to the
/// callee's own log, every dispatch (fresh or reused) — each call carries
/// its own `callId`, so a reused session still needs a fresh anchor.
async fn append_assignment_anchor(
    executor: &DriveExecutor,
    root_id: &str,
    subdialog_id: &str,
    call_id: CallId,
    caller_self_id: &str,
) -> CoreResult<()> {
    let course = executor
        .store
        .get_current_course_number(root_id, subdialog_id, PersistenceStatus::Running)
        .await?
        .max(1);
    let event = CourseEvent {
        genseq: next_genseq(executor, root_id, subdialog_id, course).await?,
        timestamp_ms: now_ms(),
        kind: CourseEventKind::TeammateCallAnchor {
            role: AnchorRole::Assignment,
            call_id,
            assignment_genseq: None,
            caller_self_id: Some(caller_self_id.to_string()),
        },
    };
    publish_event(executor, root_id, subdialog_id, course, event).await
}

/// Delivers a callee's reply to its caller via `supplyResponseToSupdialog`
/// and, on `DirectDrive`, resumes the caller out of `idle_waiting_user` and
/// recursively drives it.
#[allow(clippy::too_many_arguments)]
async fn relay_and_maybe_drive(
    executor: &DriveExecutor,
    root_id: &str,
    parent_self_id: &str,
    callee_self_id: &str,
    status: ToolResultStatus,
    response_text: String,
    fbr_round_sayings: Option<&[String]>,
    distill_note: Option<&str>,
) -> CoreResult<()> {
    let callee_current_course = executor
        .store
        .get_current_course_number(root_id, callee_self_id, PersistenceStatus::Running)
        .await?
        .max(1);
    let parent_is_root = parent_self_id == root_id;
    let registry_has_root = executor.registry.get(root_id).await.is_some();
    let parent_disable_diligence_push = match executor.registry.get(root_id).await {
        Some(dialog) => {
            let guard = dialog.lock().await;
            guard.as_root().map(|(_, root)| root.disable_diligence_push).unwrap_or(false)
        }
        None => false,
    };
    let parent_has_pending_q4h = executor
        .store
        .load_all_q4h_state(PersistenceStatus::Running)
        .await?
        .iter()
        .any(|q| q.root_id == root_id && q.self_id == parent_self_id);

    let action = supply_response_to_supdialog(
        executor.store.as_ref(),
        executor.registry.as_ref(),
        SupplyResponseRequest {
            parent_root_id: root_id,
            parent_self_id,
            callee_self_id,
            callee_current_course,
            status,
            response_text,
            fbr_round_sayings,
            distill_note,
            parent_is_root,
            registry_has_root,
            parent_disable_diligence_push,
            parent_has_pending_q4h,
        },
    )
    .await?;

    if let RevivalAction::DirectDrive { .. } = action {
        if resume_idle_to_proceeding(executor, root_id, parent_self_id).await? {
            Box::pin(executor.execute_drive_round(root_id, parent_self_id, None, true)).await?;
        }
    }
    Ok(())
}

/// Transitions `idle_waiting_user` to `proceeding` for a dialog about to be
/// driven with no explicit prompt attached (the reply it should act on
/// already landed as a durable course event). Returns `false` only when the
/// dialog is dead, signaling the caller to skip the drive entirely; a
/// missing latest pointer is left for the caller to create.
async fn resume_idle_to_proceeding(executor: &DriveExecutor, root_id: &str, self_id: &str) -> CoreResult<bool> {
    let Some(mut latest) = executor.store.load_dialog_latest(root_id, self_id, PersistenceStatus::Running).await? else {
        return Ok(true);
    };
    if latest.run_state.is_dead() {
        return Ok(false);
    }
    if matches!(latest.run_state, RunState::IdleWaitingUser) {
        latest.run_state = RunState::Proceeding;
        latest.last_modified = OffsetDateTime::now_utc();
        executor
            .store
            .save_dialog_latest(root_id, self_id, PersistenceStatus::Running, &latest)
            .await?;
    }
    Ok(true)
}

/// Appends a `tool_result` course event and fans it out live.
async fn append_tool_result(
    executor: &DriveExecutor,
    root_id: &str,
    self_id: &str,
    call_id: CallId,
    status: ToolResultStatus,
    content: String,
) -> CoreResult<()> {
    let course = executor
        .store
        .get_current_course_number(root_id, self_id, PersistenceStatus::Running)
        .await?
        .max(1);
    let event = CourseEvent {
        genseq: next_genseq(executor, root_id, self_id, course).await?,
        timestamp_ms: now_ms(),
        kind: CourseEventKind::ToolResult { call_id, status, content },
    };
    publish_event(executor, root_id, self_id, course, event).await
}

async fn next_genseq(executor: &DriveExecutor, root_id: &str, self_id: &str, course: u64) -> CoreResult<u64> {
    let existing = executor
        .store
        .read_course_events(root_id, self_id, PersistenceStatus::Running, course)
        .await?;
    Ok(existing.len() as u64 + 1)
}

async fn publish_event(executor: &DriveExecutor, root_id: &str, self_id: &str, course: u64, event: CourseEvent) -> CoreResult<()> {
    executor
        .store
        .append_event(root_id, self_id, PersistenceStatus::Running, course, &event)
        .await?;
    executor.fanout.write(EventEnvelope::Durable(DurableEnvelope {
        dialog: DialogId::new(self_id, root_id),
        course,
        event,
    }));
    Ok(())
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
