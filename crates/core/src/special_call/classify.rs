//! Classifying a validated call into its reply-semantics type and catching
//! the two call-site invariants that parsing alone cannot check: a
//! `tellaskBack` issued from a root, and a non-FBR call that targets the
//! caller's own agent id.

use thiserror::Error;

use super::parse::ParsedCall;

/// Reply semantics for a special call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    /// `tellaskBack`: synchronous reply to the caller's own supdialog.
    A,
    /// `tellask`: session-keyed via `(agentId, sessionSlug)`.
    B,
    /// `tellaskSessionless` / `freshBootsReasoning`: one-shot.
    C,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifyIssue {
    #[error("tellaskBack is invalid from a root dialog")]
    TellaskBackFromRoot,
    #[error("direct self-call: target agent id equals the caller's own agent id")]
    DirectSelfCall,
}

/// Resolves the `CallType` for a parsed call, given the caller's root-ness
/// and agent id. Does not itself raise the FBR-disabled case (that depends
/// on resolved effort, decided by the caller using `special_call::fbr`).
pub fn classify(
    call: &ParsedCall,
    caller_is_root: bool,
    caller_agent_id: &str,
) -> Result<CallType, ClassifyIssue> {
    match call {
        ParsedCall::TellaskBack { .. } => {
            if caller_is_root {
                Err(ClassifyIssue::TellaskBackFromRoot)
            } else {
                Ok(CallType::A)
            }
        }
        ParsedCall::Tellask { target_agent_id, .. } => {
            if target_agent_id == caller_agent_id {
                Err(ClassifyIssue::DirectSelfCall)
            } else {
                Ok(CallType::B)
            }
        }
        ParsedCall::TellaskSessionless { target_agent_id, .. } => {
            if target_agent_id == caller_agent_id {
                Err(ClassifyIssue::DirectSelfCall)
            } else {
                Ok(CallType::C)
            }
        }
        // FBR is intentionally self-directed; the self-call invariant does
        // not apply to it.
        ParsedCall::FreshBootsReasoning { .. } => Ok(CallType::C),
        // askHuman is not a teammate call; it has no CallType of its own and
        // is routed through the Q4H queue instead.
        ParsedCall::AskHuman { .. } => Ok(CallType::C),
    }
}
