pub mod envelope;
pub mod kind;

pub use envelope::{DurableEnvelope, EphemeralEnvelope, EphemeralKind, EventEnvelope};
pub use kind::{AnchorRole, CourseEvent, CourseEventKind, PromptOrigin, ToolResultStatus};
