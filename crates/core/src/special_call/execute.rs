//! Turns a classified call into the record-level decision the driver must
//! act on. `plan_call` is pure; `resolve_type_b_subdialog` is the one
//! stateful seam in this module, since Type-B session reuse genuinely needs
//! the store (to check whether the indexed subdialog is still alive) and
//! the caller's in-memory `RootExtra` (the session index itself).

use crate::dialog::RootExtra;
use crate::error::CoreResult;
use crate::ids::CallId;
use crate::run_state::PersistenceStatus;
use crate::store::records::{PendingCallName, PendingSubdialogRecord};
use crate::store::EventStore;

use super::classify::CallType;
use super::parse::ParsedCall;

/// What the driver does with a classified call once its target subdialog id
/// is known.
#[derive(Debug, Clone)]
pub enum ReplyPlan {
    /// `tellaskBack`: answered synchronously against the caller's own
    /// supdialog anchor, never through the pending-subdialog list.
    DirectReply,
    /// `tellask` / `tellaskSessionless` / `freshBootsReasoning`: append this
    /// record and await the callee's reply (or, for FBR, the final round).
    AwaitReply(PendingSubdialogRecord),
}

/// Builds the plan for a classified, non-`askHuman` call. `subdialog_id` is
/// the id the call resolves to — reused from an existing same-session
/// subdialog for Type B when the caller found one, freshly generated
/// otherwise. `now` is the record's `created_at`.
pub fn plan_call(
    call: &ParsedCall,
    call_type: CallType,
    call_id: CallId,
    subdialog_id: String,
    calling_course: Option<u64>,
    now: time::OffsetDateTime,
) -> ReplyPlan {
    match (call, call_type) {
        (ParsedCall::TellaskBack { .. }, CallType::A) => ReplyPlan::DirectReply,
        (
            ParsedCall::Tellask {
                tellask_content,
                target_agent_id,
                session_slug,
            },
            CallType::B,
        ) => ReplyPlan::AwaitReply(PendingSubdialogRecord {
            subdialog_id,
            created_at: now,
            call_name: PendingCallName::Tellask,
            mention_list: None,
            tellask_content: tellask_content.clone(),
            target_agent_id: target_agent_id.clone(),
            call_id,
            calling_course,
            call_type,
            session_slug: Some(session_slug.clone()),
        }),
        (
            ParsedCall::TellaskSessionless {
                tellask_content,
                target_agent_id,
            },
            CallType::C,
        ) => ReplyPlan::AwaitReply(PendingSubdialogRecord {
            subdialog_id,
            created_at: now,
            call_name: PendingCallName::TellaskSessionless,
            mention_list: None,
            tellask_content: tellask_content.clone(),
            target_agent_id: target_agent_id.clone(),
            call_id,
            calling_course,
            call_type,
            session_slug: None,
        }),
        (
            ParsedCall::FreshBootsReasoning { tellask_content, .. },
            CallType::C,
        ) => ReplyPlan::AwaitReply(PendingSubdialogRecord {
            subdialog_id: subdialog_id.clone(),
            created_at: now,
            call_name: PendingCallName::FreshBootsReasoning,
            mention_list: None,
            tellask_content: tellask_content.clone(),
            target_agent_id: subdialog_id,
            call_id,
            calling_course,
            call_type,
            session_slug: None,
        }),
        (call, call_type) => {
            unreachable!("classify() never pairs {call:?} with {call_type:?}")
        }
    }
}

/// Outcome of resolving the subdialog a Type-B call should target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionResolution {
    /// An existing, live subdialog for this `(agentId, sessionSlug)` pair
    /// was found and is reused; no new pending record creation or dialog
    /// registration is needed beyond scheduling a drive on it.
    Reused { subdialog_id: String },
    /// No reusable subdialog existed — either none had been created yet,
    /// or the one on record is dead and was pruned — so a fresh id is
    /// generated and indexed.
    Created { subdialog_id: String },
}

impl SessionResolution {
    pub fn subdialog_id(&self) -> &str {
        match self {
            SessionResolution::Reused { subdialog_id } | SessionResolution::Created { subdialog_id } => subdialog_id,
        }
    }
}

/// A Type B tellask reuses an existing subdialog when one was already
/// created for the same `(targetAgentId, sessionSlug)` pair under this
/// caller's root, unless that subdialog has since gone dead — in which
/// case the stale index entry is pruned and a fresh subdialog is indexed
/// in its place. `generate_id` is called at most once, only when a fresh
/// id is actually needed.
pub async fn resolve_type_b_subdialog(
    store: &dyn EventStore,
    root: &mut RootExtra,
    root_id: &str,
    target_agent_id: &str,
    session_slug: &str,
    generate_id: impl FnOnce() -> String,
) -> CoreResult<SessionResolution> {
    if let Some(existing) = root.lookup_subdialog_session(target_agent_id, session_slug) {
        let latest = store
            .load_dialog_latest(root_id, &existing, PersistenceStatus::Running)
            .await?;
        let reusable = latest.map(|l| !l.run_state.is_dead()).unwrap_or(false);
        if reusable {
            return Ok(SessionResolution::Reused { subdialog_id: existing });
        }
        root.prune_subdialog_session(&existing);
    }
    let fresh = generate_id();
    root.register_subdialog_session(target_agent_id.to_string(), session_slug.to_string(), fresh.clone());
    Ok(SessionResolution::Created { subdialog_id: fresh })
}
