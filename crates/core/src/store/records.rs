//! Whole-object file schemas: `DialogMetadata`, `DialogLatest`,
//! `PendingSubdialogRecord`, and `HumanQuestion`.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::CallId;
use crate::run_state::{PersistenceStatus, RunState};
use crate::special_call::CallType;

/// One-shot write on dialog creation: immutable fields plus the
/// supdialog/assignment back-reference for subdialogs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogMetadata {
    pub self_id: String,
    pub root_id: String,
    pub agent_id: String,
    pub task_doc_path: String,
    pub created_at: OffsetDateTime,
    pub supdialog_self_id: Option<String>,
    pub session_slug: Option<String>,
}

/// The single mutable file replaced atomically on every drive round.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogLatest {
    pub current_course: u64,
    pub last_modified: OffsetDateTime,
    pub status: PersistenceStatus,
    pub message_count: u64,
    pub function_call_count: u64,
    pub subdialog_count: u64,
    pub run_state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disable_diligence_push: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diligence_push_remaining_budget: Option<u32>,
}

/// A patch or full replacement returned by a `mutateDialogLatest` mutator.
pub enum LatestMutation {
    Patch(Box<dyn FnOnce(&mut DialogLatest) + Send>),
    Replace(DialogLatest),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingCallName {
    Tellask,
    TellaskSessionless,
    FreshBootsReasoning,
}

/// A persisted entry in a caller dialog's pending-subdialog list. At any
/// moment a given `subdialog_id` appears at most once per caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingSubdialogRecord {
    pub subdialog_id: String,
    pub created_at: OffsetDateTime,
    pub call_name: PendingCallName,
    pub mention_list: Option<Vec<String>>,
    pub tellask_content: String,
    pub target_agent_id: String,
    pub call_id: CallId,
    pub calling_course: Option<u64>,
    pub call_type: CallType,
    pub session_slug: Option<String>,
}

/// A patch or full replacement returned by a `mutatePendingSubdialogs` call.
pub enum PendingMutation {
    Replace(Vec<PendingSubdialogRecord>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSiteRef {
    pub course: u64,
    pub message_index: u64,
}

/// A queued ask-human question. Multiple `askHuman` calls in one generation
/// merge into a single question whose `remaining_call_ids` lists every call
/// besides the primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanQuestion {
    pub id: String,
    pub root_id: String,
    pub self_id: String,
    pub agent_id: String,
    pub task_doc_path: String,
    pub tellask_content: String,
    pub asked_at: OffsetDateTime,
    pub call_id: CallId,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remaining_call_ids: Vec<CallId>,
    pub call_site_ref: CallSiteRef,
}

impl HumanQuestion {
    /// `q4h-<rootId>-<selfId>-c<course>-<callId>`.
    pub fn make_id(root_id: &str, self_id: &str, course: u64, call_id: &str) -> String {
        format!("q4h-{root_id}-{self_id}-c{course}-{call_id}")
    }

    /// Every call id an answer to this question must fan out to.
    pub fn all_call_ids(&self) -> Vec<CallId> {
        let mut ids = vec![self.call_id.clone()];
        ids.extend(self.remaining_call_ids.iter().cloned());
        ids
    }
}
