//! Structured error type for the dialog orchestration core.
//!
//! Invariant violations are fatal-for-the-round, parse issues are per-call,
//! not-found/stale are returned to callers gracefully, I/O is propagated.

use thiserror::Error;

use crate::dialog::DialogBusy;
use crate::special_call::ParseIssue;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A sole-owner or well-formedness invariant was violated. Fatal for the
    /// current drive round; the process continues.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// A model-emitted special call could not be parsed.
    #[error("call parse issue: {0}")]
    ParseIssue(#[from] ParseIssue),

    /// A dialog, question, or record was looked up and does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// In-memory state diverged from what is now persisted; the caller
    /// should discard its handle and, if applicable, unregister.
    #[error("stale state: {0}")]
    Stale(String),

    /// The drive round was cancelled via an interrupt request. Not a failure.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// A drive round could not acquire the dialog's lock with
    /// `wait_in_queue=false`.
    #[error(transparent)]
    Busy(#[from] DialogBusy),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("serialization error: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),

    #[error("{0}")]
    Internal(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
