//! The payload type flowing through the event pub/sub fabric.
//!
//! Durable envelopes mirror something already appended to a course log;
//! ephemeral envelopes (run-state changes, diligence-budget updates) are
//! never written to disk and exist purely for live subscribers.

use serde::{Deserialize, Serialize};

use crate::events::kind::CourseEvent;
use crate::ids::DialogId;
use crate::run_state::RunState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventEnvelope {
    Durable(DurableEnvelope),
    Ephemeral(EphemeralEnvelope),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DurableEnvelope {
    pub dialog: DialogId,
    pub course: u64,
    pub event: CourseEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EphemeralEnvelope {
    pub dialog: DialogId,
    pub timestamp_ms: i64,
    pub kind: EphemeralKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EphemeralKind {
    RunStateChanged { state: RunState },
    DiligencePushUpdated { remaining_budget: u32, disabled: bool },
    Problem { message: String },
}

impl EventEnvelope {
    pub fn dialog(&self) -> &DialogId {
        match self {
            EventEnvelope::Durable(d) => &d.dialog,
            EventEnvelope::Ephemeral(e) => &e.dialog,
        }
    }

    pub fn is_durable(&self) -> bool {
        matches!(self, EventEnvelope::Durable(_))
    }

    pub fn is_ephemeral(&self) -> bool {
        matches!(self, EventEnvelope::Ephemeral(_))
    }
}
