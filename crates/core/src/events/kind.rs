//! Course events: the typed, append-only record kinds written to a dialog's
//! current-course event log.

use serde::{Deserialize, Serialize};

use crate::ids::CallId;
use crate::special_call::CallType;

/// Role of a teammate-call anchor: ties a callee's reply back to the call
/// that spawned it, so UI/replay can reconstruct the call graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorRole {
    Assignment,
    Response,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderMutationKind {
    Added,
    Updated,
    Removed,
}

/// A single append-only record within one course's `events.log`.
///
/// Every `CourseEvent` carries a monotonically increasing `genseq` within its
/// course. Event append order is the causal order observable to the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CourseEvent {
    pub genseq: u64,
    pub timestamp_ms: i64,
    #[serde(flatten)]
    pub kind: CourseEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CourseEventKind {
    Prompting {
        content: String,
        origin: PromptOrigin,
    },
    ThinkingStart {
        message_id: String,
    },
    ThinkingChunk {
        message_id: String,
        delta: String,
    },
    ThinkingFinish {
        message_id: String,
    },
    SayingStart {
        message_id: String,
    },
    SayingChunk {
        message_id: String,
        delta: String,
    },
    SayingFinish {
        message_id: String,
        content: String,
    },
    FunctionCall {
        call_id: CallId,
        name: String,
        arguments: serde_json::Value,
    },
    TeammateCallAnchor {
        role: AnchorRole,
        call_id: CallId,
        /// Present on a `response` anchor: back-reference to the assignment.
        #[serde(skip_serializing_if = "Option::is_none")]
        assignment_genseq: Option<u64>,
        /// Present on a `response` anchor: the caller dialog's self id.
        #[serde(skip_serializing_if = "Option::is_none")]
        caller_self_id: Option<String>,
    },
    ToolResult {
        call_id: CallId,
        status: ToolResultStatus,
        content: String,
    },
    TeammateResponseRecord {
        subdialog_id: String,
        call_id: CallId,
        call_type: CallType,
        status: ToolResultStatus,
        response_text: String,
    },
    ContextHealthSnapshot {
        used_tokens: u64,
        limit_tokens: u64,
        verdict: String,
    },
    ReminderMutation {
        owner: String,
        kind: ReminderMutationKind,
    },
    Q4hAsked {
        question_id: String,
        call_ids: Vec<CallId>,
    },
    Q4hAnswered {
        question_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptOrigin {
    User,
    Diligence,
    Revival,
    Answer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolResultStatus {
    Completed,
    Failed,
}
