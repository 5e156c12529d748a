//! Reply Routing and Revival: `supplyResponseToSupdialog` and the
//! subsequent decision to wake the root driver or fall back to a direct
//! drive.

use time::OffsetDateTime;

use crate::error::{CoreError, CoreResult};
use crate::events::{AnchorRole, CourseEvent, CourseEventKind, ToolResultStatus};
use crate::ids::CallId;
use crate::registry::DialogRegistry;
use crate::run_state::PersistenceStatus;
use crate::special_call::CallType;
use crate::store::records::PendingSubdialogRecord;
use crate::store::EventStore;

/// What the caller should do once `supply_response` returns: either the
/// parent is a registered root and the registry trigger already woke the
/// driver loop, or the caller must schedule a direct drive itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevivalAction {
    /// The parent is a root with a live registry entry; `needsDrive` was
    /// persisted and a trigger was emitted by the caller's registry handle.
    RegistryTriggered { reason: String },
    /// The parent is a non-root, or the registry has no entry for its root;
    /// the caller must invoke a direct drive.
    DirectDrive { suppress_diligence_push: bool },
    /// Pending subdialogs or an outstanding Q4H question remain; no
    /// revival yet.
    NotYet,
}

pub struct SupplyResponseInput<'a> {
    pub subdialog_id: &'a str,
    pub call_id: Option<&'a CallId>,
    pub call_type: CallType,
    pub status: ToolResultStatus,
    pub response_text: String,
    pub fbr_round_sayings: Option<&'a [String]>,
    pub distill_note: Option<&'a str>,
}

/// Composes the body delivered to the parent: the FBR upstream-relay
/// payload when `fbr_round_sayings` is present (one labeled section per
/// round plus a distill note), otherwise the callee's last saying as-is.
fn compose_response_body(input: &SupplyResponseInput) -> String {
    match input.fbr_round_sayings {
        Some(sayings) if !sayings.is_empty() => {
            let mut sections = Vec::with_capacity(sayings.len() + 1);
            for (i, saying) in sayings.iter().enumerate() {
                sections.push(format!("--- Round {} ---\n{}", i + 1, saying));
            }
            if let Some(note) = input.distill_note {
                sections.push(note.to_string());
            }
            sections.join("\n\n")
        }
        _ => input.response_text.clone(),
    }
}

/// Step 1-2: removes and returns the pending entry for `subdialog_id`,
/// preserving order for the rest. Persists the filtered list either way.
pub async fn take_pending_entry(
    store: &dyn EventStore,
    parent_root_id: &str,
    parent_self_id: &str,
    status: PersistenceStatus,
    subdialog_id: &str,
) -> CoreResult<(Option<PendingSubdialogRecord>, Vec<PendingSubdialogRecord>)> {
    let subdialog_id = subdialog_id.to_string();
    let taken_slot: std::sync::Arc<std::sync::Mutex<Option<PendingSubdialogRecord>>> =
        std::sync::Arc::new(std::sync::Mutex::new(None));
    let taken_slot_writer = taken_slot.clone();
    let remaining = store
        .mutate_pending_subdialogs(
            parent_root_id,
            parent_self_id,
            status,
            Box::new(move |current| {
                let mut kept = Vec::with_capacity(current.len());
                let mut slot = taken_slot_writer.lock().expect("lock poisoned");
                for record in current {
                    if record.subdialog_id == subdialog_id && slot.is_none() {
                        *slot = Some(record);
                    } else {
                        kept.push(record);
                    }
                }
                kept
            }),
        )
        .await?;
    let taken = taken_slot.lock().expect("lock poisoned").take();
    Ok((taken, remaining))
}

/// Resolves the most recent `teammate_call_anchor_record` with
/// `role=assignment` and a matching `call_id`, scanning the callee's
/// current course backward. `None` if no such anchor exists (a stale or
/// malformed history — surfaced by the caller as an invariant violation).
pub async fn resolve_assignment_anchor(
    store: &dyn EventStore,
    callee_root_id: &str,
    callee_self_id: &str,
    status: PersistenceStatus,
    current_course: u64,
    call_id: &CallId,
) -> CoreResult<Option<CourseEvent>> {
    let mut course = current_course;
    loop {
        let events = store
            .read_course_events(callee_root_id, callee_self_id, status, course)
            .await?;
        if let Some(found) = events.into_iter().rev().find(|e| {
            matches!(
                &e.kind,
                CourseEventKind::TeammateCallAnchor { role: AnchorRole::Assignment, call_id: cid, .. }
                    if cid == call_id
            )
        }) {
            return Ok(Some(found));
        }
        if course <= 1 {
            return Ok(None);
        }
        course -= 1;
    }
}

/// Appends the `response` anchor to the callee's log, carrying a
/// back-reference to the assignment anchor it answers.
pub async fn append_response_anchor(
    store: &dyn EventStore,
    callee_root_id: &str,
    callee_self_id: &str,
    status: PersistenceStatus,
    course: u64,
    genseq: u64,
    call_id: CallId,
    assignment_genseq: u64,
    caller_self_id: String,
) -> CoreResult<()> {
    let event = CourseEvent {
        genseq,
        timestamp_ms: now_ms(),
        kind: CourseEventKind::TeammateCallAnchor {
            role: AnchorRole::Response,
            call_id,
            assignment_genseq: Some(assignment_genseq),
            caller_self_id: Some(caller_self_id),
        },
    };
    store
        .append_event(callee_root_id, callee_self_id, status, course, &event)
        .await
}

/// Appends the `teammate_response_record` to the parent's course log. The
/// in-memory mirror (`tellask_result_msg`) is the caller's responsibility
/// since it touches the live `Dialog`, not just the store.
pub async fn receive_teammate_response(
    store: &dyn EventStore,
    parent_root_id: &str,
    parent_self_id: &str,
    status: PersistenceStatus,
    course: u64,
    genseq: u64,
    input: &SupplyResponseInput<'_>,
) -> CoreResult<String> {
    let body = compose_response_body(input);
    let call_id = input
        .call_id
        .cloned()
        .ok_or_else(|| CoreError::InvariantViolation("teammate response missing callId".into()))?;
    let event = CourseEvent {
        genseq,
        timestamp_ms: now_ms(),
        kind: CourseEventKind::TeammateResponseRecord {
            subdialog_id: input.subdialog_id.to_string(),
            call_id,
            call_type: input.call_type,
            status: input.status,
            response_text: body.clone(),
        },
    };
    store
        .append_event(parent_root_id, parent_self_id, status, course, &event)
        .await?;
    Ok(body)
}

/// Step 7: decides the revival action once the filtered pending list and
/// Q4H state are known. `parent_is_root` and `registry_has_root` together
/// decide registry-trigger vs. direct-drive fallback.
pub fn decide_revival(
    filtered_pending_is_empty: bool,
    parent_has_pending_q4h: bool,
    parent_is_root: bool,
    registry_has_root: bool,
    call_type: CallType,
    parent_disable_diligence_push: bool,
) -> RevivalAction {
    let should_revive = filtered_pending_is_empty && !parent_has_pending_q4h;
    if !should_revive {
        return RevivalAction::NotYet;
    }
    if parent_is_root && registry_has_root {
        let label = match call_type {
            CallType::A => "a",
            CallType::B => "b",
            CallType::C => "c",
        };
        RevivalAction::RegistryTriggered {
            reason: format!("all_pending_subdialogs_resolved:type_{label}"),
        }
    } else {
        RevivalAction::DirectDrive {
            suppress_diligence_push: parent_disable_diligence_push,
        }
    }
}

/// Everything `supply_response_to_supdialog` needs about the callee's
/// reply, short of the originating call's `callId`/`callType` — those are
/// recovered internally from the parent's own pending-subdialog record, not
/// supplied by the caller.
pub struct SupplyResponseRequest<'a> {
    pub parent_root_id: &'a str,
    pub parent_self_id: &'a str,
    pub callee_self_id: &'a str,
    pub callee_current_course: u64,
    pub status: ToolResultStatus,
    pub response_text: String,
    pub fbr_round_sayings: Option<&'a [String]>,
    pub distill_note: Option<&'a str>,
    pub parent_is_root: bool,
    pub registry_has_root: bool,
    pub parent_disable_diligence_push: bool,
    pub parent_has_pending_q4h: bool,
}

/// `supplyResponseToSupdialog`: the full orchestrator. Takes the pending
/// entry (recovering the originating call's id/type from it), appends the
/// response anchor and the `teammate_response_record`, and decides the
/// revival action. Returns `NotYet` untouched when no matching pending
/// entry is found — a reply for a call the parent never recorded (or
/// already resolved) is a no-op, not an error.
pub async fn supply_response_to_supdialog(
    store: &dyn EventStore,
    registry: &DialogRegistry,
    request: SupplyResponseRequest<'_>,
) -> CoreResult<RevivalAction> {
    let (taken, remaining) = take_pending_entry(
        store,
        request.parent_root_id,
        request.parent_self_id,
        PersistenceStatus::Running,
        request.callee_self_id,
    )
    .await?;
    let Some(record) = taken else {
        return Ok(RevivalAction::NotYet);
    };

    let anchor = resolve_assignment_anchor(
        store,
        request.parent_root_id,
        request.callee_self_id,
        PersistenceStatus::Running,
        request.callee_current_course,
        &record.call_id,
    )
    .await?;

    let input = SupplyResponseInput {
        subdialog_id: request.callee_self_id,
        call_id: Some(&record.call_id),
        call_type: record.call_type,
        status: request.status,
        response_text: request.response_text,
        fbr_round_sayings: request.fbr_round_sayings,
        distill_note: request.distill_note,
    };

    let parent_course = store
        .get_current_course_number(request.parent_root_id, request.parent_self_id, PersistenceStatus::Running)
        .await?
        .max(1);
    let parent_events = store
        .read_course_events(request.parent_root_id, request.parent_self_id, PersistenceStatus::Running, parent_course)
        .await?;
    let parent_genseq = parent_events.len() as u64 + 1;
    receive_teammate_response(
        store,
        request.parent_root_id,
        request.parent_self_id,
        PersistenceStatus::Running,
        parent_course,
        parent_genseq,
        &input,
    )
    .await?;

    if let Some(anchor_event) = anchor {
        let callee_course = request.callee_current_course;
        let callee_events = store
            .read_course_events(request.parent_root_id, request.callee_self_id, PersistenceStatus::Running, callee_course)
            .await?;
        let callee_genseq = callee_events.len() as u64 + 1;
        append_response_anchor(
            store,
            request.parent_root_id,
            request.callee_self_id,
            PersistenceStatus::Running,
            callee_course,
            callee_genseq,
            record.call_id.clone(),
            anchor_event.genseq,
            request.parent_self_id.to_string(),
        )
        .await?;
    }

    let action = decide_revival(
        remaining.is_empty(),
        request.parent_has_pending_q4h,
        request.parent_is_root,
        request.registry_has_root,
        record.call_type,
        request.parent_disable_diligence_push,
    );

    if let RevivalAction::RegistryTriggered { reason } = &action {
        registry
            .mark_needs_drive(request.parent_root_id, "supply_response_to_supdialog", reason, now_ms())
            .await;
    }

    Ok(action)
}

fn now_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::records::PendingCallName;
    use crate::store::FsEventStore;
    use tempfile::tempdir;

    fn record(id: &str) -> PendingSubdialogRecord {
        PendingSubdialogRecord {
            subdialog_id: id.into(),
            created_at: OffsetDateTime::UNIX_EPOCH,
            call_name: PendingCallName::Tellask,
            mention_list: None,
            tellask_content: "ping".into(),
            target_agent_id: "alice".into(),
            call_id: "c1".into(),
            calling_course: Some(1),
            call_type: CallType::B,
            session_slug: Some("loop".into()),
        }
    }

    #[tokio::test]
    async fn take_pending_entry_removes_only_the_matching_id() {
        let dir = tempdir().unwrap();
        let store = FsEventStore::new(dir.path());
        store
            .append_pending_subdialog("r1", "r1", PersistenceStatus::Running, record("s1"))
            .await
            .unwrap();
        store
            .append_pending_subdialog("r1", "r1", PersistenceStatus::Running, record("s2"))
            .await
            .unwrap();

        let (taken, remaining) =
            take_pending_entry(&store, "r1", "r1", PersistenceStatus::Running, "s1")
                .await
                .unwrap();

        assert_eq!(taken.unwrap().subdialog_id, "s1");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].subdialog_id, "s2");
    }

    #[tokio::test]
    async fn take_pending_entry_on_missing_id_returns_none_unchanged() {
        let dir = tempdir().unwrap();
        let store = FsEventStore::new(dir.path());
        store
            .append_pending_subdialog("r1", "r1", PersistenceStatus::Running, record("s1"))
            .await
            .unwrap();

        let (taken, remaining) =
            take_pending_entry(&store, "r1", "r1", PersistenceStatus::Running, "ghost")
                .await
                .unwrap();

        assert!(taken.is_none());
        assert_eq!(remaining.len(), 1);
    }

    #[test]
    fn fbr_body_concatenates_rounds_and_appends_distill_note() {
        let input = SupplyResponseInput {
            subdialog_id: "s1",
            call_id: Some(&"c1".to_string()),
            call_type: CallType::C,
            status: ToolResultStatus::Completed,
            response_text: "unused".into(),
            fbr_round_sayings: Some(&["first".to_string(), "second".to_string()]),
            distill_note: Some("synthesize across rounds"),
        };
        let body = compose_response_body(&input);
        assert!(body.contains("Round 1"));
        assert!(body.contains("first"));
        assert!(body.contains("Round 2"));
        assert!(body.contains("second"));
        assert!(body.contains("synthesize across rounds"));
    }

    #[test]
    fn non_fbr_body_is_the_response_text_verbatim() {
        let input = SupplyResponseInput {
            subdialog_id: "s1",
            call_id: Some(&"c1".to_string()),
            call_type: CallType::B,
            status: ToolResultStatus::Completed,
            response_text: "the answer".into(),
            fbr_round_sayings: None,
            distill_note: None,
        };
        assert_eq!(compose_response_body(&input), "the answer");
    }

    #[test]
    fn revival_requires_empty_pending_and_no_q4h() {
        assert_eq!(
            decide_revival(false, false, true, true, CallType::B, false),
            RevivalAction::NotYet
        );
        assert_eq!(
            decide_revival(true, true, true, true, CallType::B, false),
            RevivalAction::NotYet
        );
    }

    #[test]
    fn revival_on_root_with_registry_entry_triggers_registry() {
        let action = decide_revival(true, false, true, true, CallType::B, false);
        assert_eq!(
            action,
            RevivalAction::RegistryTriggered {
                reason: "all_pending_subdialogs_resolved:type_b".into()
            }
        );
    }

    #[test]
    fn revival_on_non_root_falls_back_to_direct_drive() {
        let action = decide_revival(true, false, false, false, CallType::A, true);
        assert_eq!(
            action,
            RevivalAction::DirectDrive {
                suppress_diligence_push: true
            }
        );
    }

    #[test]
    fn revival_on_root_missing_from_registry_falls_back_to_direct_drive() {
        let action = decide_revival(true, false, true, false, CallType::C, false);
        assert_eq!(
            action,
            RevivalAction::DirectDrive {
                suppress_diligence_push: false
            }
        );
    }

    #[tokio::test]
    async fn supply_response_recovers_call_id_from_pending_record_and_revives() {
        let dir = tempdir().unwrap();
        let store = FsEventStore::new(dir.path());
        let registry = DialogRegistry::new();
        store
            .append_pending_subdialog("r1", "r1", PersistenceStatus::Running, record("s1"))
            .await
            .unwrap();

        let action = supply_response_to_supdialog(
            &store,
            &registry,
            SupplyResponseRequest {
                parent_root_id: "r1",
                parent_self_id: "r1",
                callee_self_id: "s1",
                callee_current_course: 1,
                status: ToolResultStatus::Completed,
                response_text: "the answer".into(),
                fbr_round_sayings: None,
                distill_note: None,
                parent_is_root: true,
                registry_has_root: true,
                parent_disable_diligence_push: false,
                parent_has_pending_q4h: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(
            action,
            RevivalAction::RegistryTriggered {
                reason: "all_pending_subdialogs_resolved:type_b".into()
            }
        );

        let events = store
            .read_course_events("r1", "r1", PersistenceStatus::Running, 1)
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        match &events[0].kind {
            CourseEventKind::TeammateResponseRecord {
                call_id,
                response_text,
                ..
            } => {
                assert_eq!(call_id, "c1");
                assert_eq!(response_text, "the answer");
            }
            other => panic!("expected TeammateResponseRecord, got {other:?}"),
        }

        let remaining = store
            .load_pending_subdialogs("r1", "r1", PersistenceStatus::Running)
            .await
            .unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn supply_response_on_unknown_callee_is_a_noop() {
        let dir = tempdir().unwrap();
        let store = FsEventStore::new(dir.path());
        let registry = DialogRegistry::new();

        let action = supply_response_to_supdialog(
            &store,
            &registry,
            SupplyResponseRequest {
                parent_root_id: "r1",
                parent_self_id: "r1",
                callee_self_id: "ghost",
                callee_current_course: 1,
                status: ToolResultStatus::Completed,
                response_text: "unused".into(),
                fbr_round_sayings: None,
                distill_note: None,
                parent_is_root: true,
                registry_has_root: true,
                parent_disable_diligence_push: false,
                parent_has_pending_q4h: false,
            },
        )
        .await
        .unwrap();

        assert_eq!(action, RevivalAction::NotYet);
    }
}
