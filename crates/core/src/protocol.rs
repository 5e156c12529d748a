//! Control-protocol wire types exchanged with WebSocket clients: one
//! tagged enum per direction, dispatched by `"type"`.

use serde::{Deserialize, Serialize};

use crate::run_state::RunState;
use crate::special_call::CallType;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    CreateDialog {
        agent_id: String,
        task_doc_path: String,
    },
    DisplayDialog {
        root_id: String,
        self_id: String,
    },
    DisplayCourse {
        root_id: String,
        self_id: String,
        course: u64,
    },
    DriveDlgByUserMsg {
        root_id: String,
        self_id: String,
        content: String,
    },
    DriveDialogByUserAnswer {
        question_id: String,
        content: String,
    },
    InterruptDialog {
        root_id: String,
        reason: String,
    },
    EmergencyStop,
    ResumeDialog {
        root_id: String,
    },
    ResumeAll,
    SetDiligencePush {
        root_id: String,
        disable_diligence_push: bool,
    },
    RefillDiligencePushBudget {
        root_id: String,
    },
    DeclareSubdialogDead {
        root_id: String,
        self_id: String,
    },
    GetQ4hState,
    DisplayReminders {
        root_id: String,
    },
    SetUiLanguage {
        ui_language: String,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Welcome {
        server_work_language: String,
        supported_language_codes: Vec<String>,
    },
    Error {
        message: String,
    },
    DialogReady {
        root_id: String,
        self_id: String,
    },
    DlgRunStateEvt {
        root_id: String,
        self_id: String,
        run_state: RunState,
    },
    DiligencePushUpdated {
        root_id: String,
        disable_diligence_push: bool,
    },
    DiligenceBudgetEvt {
        root_id: String,
        remaining_budget: u32,
    },
    DialogsCreated {
        root_ids: Vec<String>,
    },
    DialogsMoved {
        root_ids: Vec<String>,
    },
    DialogsDeleted {
        root_ids: Vec<String>,
    },
    RunControlRefresh,
    RunControlCountsEvt {
        proceeding: u64,
        idle_waiting_user: u64,
        interrupted: u64,
        dead: u64,
    },
    ProblemsSnapshot {
        problems: Vec<String>,
    },
    NewQ4hAsked {
        question_id: String,
        root_id: String,
        self_id: String,
        content: String,
    },
    Q4hAnswered {
        question_id: String,
    },
    Q4hStateResponse {
        question_ids: Vec<String>,
    },
    ThinkingChunk {
        root_id: String,
        self_id: String,
        message_id: String,
        delta: String,
    },
    SayingChunk {
        root_id: String,
        self_id: String,
        message_id: String,
        delta: String,
    },
    FunctionCallEvt {
        root_id: String,
        self_id: String,
        call_id: String,
        name: String,
        call_type: CallType,
    },
    ReminderUpdated {
        root_id: String,
        owner: String,
        content: Option<String>,
    },
}
