//! Run-State Machine.
//!
//! ```text
//! idle_waiting_user ──(user msg | auto-revive)──> proceeding
//! proceeding ──(interrupt req)──> proceeding_stop_requested ──(core observes)──> interrupted{reason}
//! proceeding ──(normal completion)──> idle_waiting_user | terminal{completed}
//! interrupted ──(resume with allowResumeFromInterrupted or user msg)──> proceeding
//! <any running> ──(declare_dead by user)──> dead  [irreversible]
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceStatus {
    Running,
    Completed,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptReason {
    UserStop,
    EmergencyStop,
    CrashRecovery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeadReason {
    DeclaredByUser,
    SupdialogGone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunState {
    IdleWaitingUser,
    Proceeding,
    ProceedingStopRequested { reason: String },
    Interrupted { reason: InterruptReason },
    /// Irreversible. No operation re-opens a dead dialog.
    Dead { reason: DeadReason },
    Terminal { status: PersistenceStatus },
}

impl RunState {
    pub fn is_dead(&self) -> bool {
        matches!(self, RunState::Dead { .. })
    }

    pub fn is_terminal_or_dead(&self) -> bool {
        matches!(self, RunState::Dead { .. } | RunState::Terminal { .. })
    }

    pub fn is_proceeding(&self) -> bool {
        matches!(
            self,
            RunState::Proceeding | RunState::ProceedingStopRequested { .. }
        )
    }

    /// `requestInterruptDialog`: idempotent, returns whether it actually
    /// applied a transition. A non-proceeding dialog (including `dead`)
    /// returns `applied=false` without error.
    pub fn request_interrupt(&mut self, reason: impl Into<String>) -> bool {
        match self {
            RunState::Proceeding => {
                *self = RunState::ProceedingStopRequested {
                    reason: reason.into(),
                };
                true
            }
            _ => false,
        }
    }

    /// The core observed the stop request and is unwinding the round.
    pub fn observe_interrupted(&mut self, reason: InterruptReason) -> bool {
        match self {
            RunState::ProceedingStopRequested { .. } | RunState::Proceeding => {
                *self = RunState::Interrupted { reason };
                true
            }
            _ => false,
        }
    }

    /// Resume from `interrupted`. Requires either `allow_resume_from_interrupted`
    /// or the presence of an explicit user prompt.
    pub fn resume(&mut self, allow_resume_from_interrupted: bool, has_user_prompt: bool) -> bool {
        match self {
            RunState::Interrupted { .. } => {
                if allow_resume_from_interrupted || has_user_prompt {
                    *self = RunState::Proceeding;
                    true
                } else {
                    false
                }
            }
            RunState::IdleWaitingUser => {
                *self = RunState::Proceeding;
                true
            }
            _ => false,
        }
    }

    pub fn complete_normally(&mut self, status: Option<PersistenceStatus>) {
        *self = match status {
            Some(status) => RunState::Terminal { status },
            None => RunState::IdleWaitingUser,
        };
    }

    /// Irreversible transition to `dead`. Returns `false` (no-op, not an
    /// error) if already dead — `dead` is write-once.
    pub fn declare_dead(&mut self, reason: DeadReason) -> bool {
        if self.is_dead() {
            return false;
        }
        *self = RunState::Dead { reason };
        true
    }

    /// Crash reconciliation on process start: every dialog found in
    /// `proceeding` or `proceeding_stop_requested` is rewritten to
    /// `interrupted{crash_recovery}`. The only path that rewrites
    /// `proceeding_stop_requested`.
    pub fn reconcile_after_crash(&mut self) -> bool {
        match self {
            RunState::Proceeding | RunState::ProceedingStopRequested { .. } => {
                *self = RunState::Interrupted {
                    reason: InterruptReason::CrashRecovery,
                };
                true
            }
            _ => false,
        }
    }
}
