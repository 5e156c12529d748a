//! Parses model-emitted inter-agent calls (`tellask`, `tellaskBack`,
//! `tellaskSessionless`, `askHuman`, `freshBootsReasoning`), classifies them
//! into Type A/B/C reply semantics, and provides the pure building blocks
//! (effort resolution, Q4H merge, side-output formatting) the driver
//! composes into the stateful execution paths.

pub mod classify;
pub mod execute;
pub mod fbr;
pub mod merge;
pub mod messages;
pub mod parse;

pub use classify::{classify, CallType, ClassifyIssue};
pub use execute::{plan_call, resolve_type_b_subdialog, ReplyPlan, SessionResolution};
pub use merge::{merge_ask_human, AskHumanCall, MergedQuestion};
pub use messages::{environment_failure_message, tellask_result_message};
pub use parse::{parse_call, ParseIssue, ParsedCall, RawCall};
