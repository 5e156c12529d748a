//! The dialog object model and its per-dialog exclusivity lock.

pub mod lock;
pub mod model;

pub use lock::{DialogBusy, DialogLock, DialogLockGuard};
pub use model::{
    AssignmentFromSup, ChatMessage, ChatRole, ContextHealthSnapshot, Dialog, DialogCore,
    Reminder, ReminderMeta, ReminderOwner, RootExtra, SubExtra, SubdialogAgentPrimingMode,
};
