//! The dialog object model.
//!
//! The `Dialog`/`RootDialog`/`SubDialog` class hierarchy is replaced by a
//! tagged variant over a shared capability record plus root-only / sub-only
//! extensions. Cyclic references (root ↔ sub) are modeled as id lookups
//! through the registry's table, never raw pointers.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::ids::{CallId, DialogId};
use crate::run_state::{PersistenceStatus, RunState};
use crate::special_call::CallType;

/// Named reminder-owner strategies. A dialog may carry at most one reminder
/// per owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderOwner {
    PendingTellask,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderMeta {
    pub pending_signature: String,
    pub pending_count: usize,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reminder {
    pub owner: ReminderOwner,
    pub content: String,
    pub meta: Option<ReminderMeta>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextHealthSnapshot {
    pub used_tokens: u64,
    pub limit_tokens: u64,
    pub critical_countdown: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Immutable originating-call record carried by a `SubDialog`
/// (`assignmentFromSup`). Mutable only via the atomic Type-B reassignment
/// path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignmentFromSup {
    pub call_name: String,
    pub mention_list: Option<Vec<String>>,
    pub tellask_content: String,
    pub origin_member_id: Option<String>,
    pub caller_dialog_id: String,
    pub call_id: CallId,
    pub session_slug: Option<String>,
    pub collective_targets: Option<Vec<String>>,
}

/// Fields shared by every dialog, root or sub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogCore {
    pub id: DialogId,
    pub agent_id: String,
    pub task_doc_path: String,
    pub created_at: OffsetDateTime,

    pub current_course: u64,
    pub messages: Vec<ChatMessage>,
    pub reminders: Vec<Reminder>,
    pub context_health: Option<ContextHealthSnapshot>,
    pub persistence_status: PersistenceStatus,
    pub last_user_language_code: Option<String>,
    pub up_next_prompt: Option<String>,
    pub run_state: RunState,
}

impl DialogCore {
    pub fn new(id: DialogId, agent_id: String, task_doc_path: String, created_at: OffsetDateTime) -> Self {
        Self {
            id,
            agent_id,
            task_doc_path,
            created_at,
            current_course: 1,
            messages: Vec::new(),
            reminders: Vec::new(),
            context_health: None,
            persistence_status: PersistenceStatus::Running,
            last_user_language_code: None,
            up_next_prompt: None,
            run_state: RunState::IdleWaitingUser,
        }
    }

    /// Takes the queued `upNext` prompt at most once.
    pub fn take_up_next(&mut self) -> Option<String> {
        self.up_next_prompt.take()
    }

    pub fn reminder(&self, owner: ReminderOwner) -> Option<&Reminder> {
        self.reminders.iter().find(|r| r.owner == owner)
    }

    pub fn reminder_mut(&mut self, owner: ReminderOwner) -> Option<&mut Reminder> {
        self.reminders.iter_mut().find(|r| r.owner == owner)
    }
}

impl PartialEq for ReminderOwner {
    fn eq(&self, other: &Self) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}
impl Eq for ReminderOwner {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubdialogAgentPrimingMode {
    Do,
    Reuse,
    Skip,
}

impl Default for SubdialogAgentPrimingMode {
    fn default() -> Self {
        SubdialogAgentPrimingMode::Reuse
    }
}

/// Root-only extensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RootExtra {
    pub disable_diligence_push: bool,
    pub diligence_push_remaining_budget: u32,
    pub subdialog_agent_priming_mode: SubdialogAgentPrimingMode,
    /// `(agentId, sessionSlug) -> subdialog selfId`, the Type-B session index.
    pub subdialog_registry: HashMap<(String, String), String>,
}

impl Default for RootExtra {
    fn default() -> Self {
        Self {
            disable_diligence_push: false,
            diligence_push_remaining_budget: 0,
            subdialog_agent_priming_mode: SubdialogAgentPrimingMode::default(),
            subdialog_registry: HashMap::new(),
        }
    }
}

impl RootExtra {
    /// The Type-B session index lookup: a subdialog already exists for this
    /// `(agentId, sessionSlug)` pair under this root.
    pub fn lookup_subdialog_session(&self, agent_id: &str, session_slug: &str) -> Option<String> {
        self.subdialog_registry
            .get(&(agent_id.to_string(), session_slug.to_string()))
            .cloned()
    }

    /// Records (or overwrites) the `(agentId, sessionSlug) -> selfId` entry.
    /// Used both on first creation and on reassignment after a prune.
    pub fn register_subdialog_session(&mut self, agent_id: String, session_slug: String, subdialog_id: String) {
        self.subdialog_registry.insert((agent_id, session_slug), subdialog_id);
    }

    /// Drops every session-index entry pointing at `subdialog_id`, so a
    /// stale (dead) subdialog can no longer be reused by a future Type-B
    /// call; the next call with the same key creates a fresh one.
    pub fn prune_subdialog_session(&mut self, subdialog_id: &str) {
        self.subdialog_registry.retain(|_, v| v != subdialog_id);
    }
}

/// Sub-only extensions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubExtra {
    /// The immediate caller dialog id (the supdialog). Resolved lazily
    /// through the dialog table, never stored as a raw pointer.
    pub supdialog_self_id: String,
    pub root_dialog_id: String,
    pub assignment_from_sup: AssignmentFromSup,
    pub session_slug: Option<String>,
    pub call_type: CallType,
}

/// The tagged variant replacing the `Dialog`/`RootDialog`/`SubDialog` class
/// hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Dialog {
    Root { core: DialogCore, root: RootExtra },
    Sub { core: DialogCore, sub: SubExtra },
}

impl Dialog {
    pub fn core(&self) -> &DialogCore {
        match self {
            Dialog::Root { core, .. } => core,
            Dialog::Sub { core, .. } => core,
        }
    }

    pub fn core_mut(&mut self) -> &mut DialogCore {
        match self {
            Dialog::Root { core, .. } => core,
            Dialog::Sub { core, .. } => core,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Dialog::Root { .. })
    }

    pub fn as_root(&self) -> Option<(&DialogCore, &RootExtra)> {
        match self {
            Dialog::Root { core, root } => Some((core, root)),
            Dialog::Sub { .. } => None,
        }
    }

    pub fn as_root_mut(&mut self) -> Option<(&mut DialogCore, &mut RootExtra)> {
        match self {
            Dialog::Root { core, root } => Some((core, root)),
            Dialog::Sub { .. } => None,
        }
    }

    pub fn as_sub(&self) -> Option<(&DialogCore, &SubExtra)> {
        match self {
            Dialog::Sub { core, sub } => Some((core, sub)),
            Dialog::Root { .. } => None,
        }
    }

    pub fn as_sub_mut(&mut self) -> Option<(&mut DialogCore, &mut SubExtra)> {
        match self {
            Dialog::Sub { core, sub } => Some((core, sub)),
            Dialog::Root { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core(self_id: &str, root_id: &str) -> DialogCore {
        DialogCore::new(
            DialogId::new(self_id, root_id),
            "alice".into(),
            "/tmp/task.tsk".into(),
            OffsetDateTime::UNIX_EPOCH,
        )
    }

    #[test]
    fn root_dialog_reports_is_root() {
        let d = Dialog::Root {
            core: core("r1", "r1"),
            root: RootExtra::default(),
        };
        assert!(d.is_root());
        assert!(d.as_sub().is_none());
    }

    #[test]
    fn sub_dialog_reports_not_root() {
        let d = Dialog::Sub {
            core: core("s1", "r1"),
            sub: SubExtra {
                supdialog_self_id: "r1".into(),
                root_dialog_id: "r1".into(),
                assignment_from_sup: AssignmentFromSup {
                    call_name: "tellask".into(),
                    mention_list: None,
                    tellask_content: "ping".into(),
                    origin_member_id: None,
                    caller_dialog_id: "r1".into(),
                    call_id: "c1".into(),
                    session_slug: Some("loop".into()),
                    collective_targets: None,
                },
                session_slug: Some("loop".into()),
                call_type: CallType::B,
            },
        };
        assert!(!d.is_root());
        assert!(d.as_root().is_none());
    }

    #[test]
    fn take_up_next_consumes_once() {
        let mut core = core("r1", "r1");
        core.up_next_prompt = Some("go".into());
        assert_eq!(core.take_up_next(), Some("go".into()));
        assert_eq!(core.take_up_next(), None);
    }

    #[test]
    fn at_most_one_reminder_per_owner_lookup() {
        let mut core = core("r1", "r1");
        core.reminders.push(Reminder {
            owner: ReminderOwner::PendingTellask,
            content: "x".into(),
            meta: None,
        });
        assert!(core.reminder(ReminderOwner::PendingTellask).is_some());
    }
}
