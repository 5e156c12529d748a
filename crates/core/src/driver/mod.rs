//! The Backend Driver Loop and the Drive Executor it dispatches to: the
//! orchestration layer tying together the registry, the event store, the
//! special-call executor, and reply routing into the stateful dialog
//! run loop. The LLM stream core itself stays an external collaborator,
//! reached through [`round::GenerationSource`].

pub mod context_health;
pub mod loop_;
pub mod round;
pub mod special_call_exec;

pub use context_health::{consult as consult_context_health, GateDecision};
pub use loop_::{is_eligible_for_drive, run_driver_loop};
pub use round::{
    resolve_effective_prompt, resolve_reply_target, should_reschedule_follow_up, DriveExecutor, EmittedCall,
    GenerationOutcome, GenerationSource, RoundOutcome, SubdialogReplyTarget,
};
