//! Parsing model-emitted call records into typed, validated calls.
//!
//! Takes a raw tool-call payload and validates required fields before doing
//! anything stateful, the same shape as a delegation entry point handling a
//! single call kind. Here the surface is wider (five call names instead of
//! one), so validation is split into its own step with a closed error enum.

use serde_json::Value;
use thiserror::Error;

use crate::ids::validate_session_slug;

const CALL_NAMES: &[&str] = &[
    "tellaskBack",
    "tellask",
    "tellaskSessionless",
    "askHuman",
    "freshBootsReasoning",
];

/// Every way a raw model call can fail validation. Kept closed so tests can
/// assert on the exact rejection reason.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseIssue {
    #[error("unknown call name: {0:?}")]
    UnknownCallName(String),
    #[error("call arguments must be a JSON object")]
    NotAnObject,
    #[error("missing required field: {field}")]
    MissingField { field: String },
    #[error("tellaskContent must be a nonempty string")]
    EmptyTellaskContent,
    #[error("sessionSlug does not match the slug grammar: {0:?}")]
    InvalidSessionSlug(String),
    #[error("effort must be an integer in [0, 100]")]
    InvalidEffort,
}

/// A raw function-call record as emitted by the model within one generation.
#[derive(Debug, Clone)]
pub struct RawCall {
    pub call_id: String,
    pub name: String,
    pub arguments: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedCall {
    TellaskBack {
        tellask_content: String,
    },
    Tellask {
        tellask_content: String,
        target_agent_id: String,
        session_slug: String,
    },
    TellaskSessionless {
        tellask_content: String,
        target_agent_id: String,
    },
    AskHuman {
        tellask_content: String,
    },
    FreshBootsReasoning {
        tellask_content: String,
        effort_override: Option<i64>,
    },
}

impl ParsedCall {
    pub fn tellask_content(&self) -> &str {
        match self {
            ParsedCall::TellaskBack { tellask_content }
            | ParsedCall::Tellask { tellask_content, .. }
            | ParsedCall::TellaskSessionless { tellask_content, .. }
            | ParsedCall::AskHuman { tellask_content }
            | ParsedCall::FreshBootsReasoning { tellask_content, .. } => tellask_content,
        }
    }
}

fn require_object(value: &Value) -> Result<&serde_json::Map<String, Value>, ParseIssue> {
    value.as_object().ok_or(ParseIssue::NotAnObject)
}

fn require_tellask_content(obj: &serde_json::Map<String, Value>) -> Result<String, ParseIssue> {
    let content = obj
        .get("tellaskContent")
        .and_then(Value::as_str)
        .ok_or_else(|| ParseIssue::MissingField {
            field: "tellaskContent".into(),
        })?;
    if content.trim().is_empty() {
        return Err(ParseIssue::EmptyTellaskContent);
    }
    Ok(content.to_string())
}

/// Resolves `targetAgentId`, tolerating the `agentId`/`target` aliases, and
/// strips a leading `@`.
fn require_target_agent_id(obj: &serde_json::Map<String, Value>) -> Result<String, ParseIssue> {
    let raw = obj
        .get("targetAgentId")
        .or_else(|| obj.get("agentId"))
        .or_else(|| obj.get("target"))
        .and_then(Value::as_str)
        .ok_or_else(|| ParseIssue::MissingField {
            field: "targetAgentId".into(),
        })?;
    Ok(raw.strip_prefix('@').unwrap_or(raw).to_string())
}

fn require_session_slug(obj: &serde_json::Map<String, Value>) -> Result<String, ParseIssue> {
    let slug = obj
        .get("sessionSlug")
        .and_then(Value::as_str)
        .ok_or_else(|| ParseIssue::MissingField {
            field: "sessionSlug".into(),
        })?;
    validate_session_slug(slug).map_err(|_| ParseIssue::InvalidSessionSlug(slug.to_string()))?;
    Ok(slug.to_string())
}

fn optional_effort(obj: &serde_json::Map<String, Value>) -> Result<Option<i64>, ParseIssue> {
    match obj.get("effort") {
        None | Some(Value::Null) => Ok(None),
        Some(v) => {
            let n = v.as_i64().ok_or(ParseIssue::InvalidEffort)?;
            if !(0..=100).contains(&n) {
                return Err(ParseIssue::InvalidEffort);
            }
            Ok(Some(n))
        }
    }
}

/// Validates and classifies one raw call. Unknown call names and malformed
/// arguments are reported per-call; other calls in the same batch still run.
pub fn parse_call(raw: &RawCall) -> Result<ParsedCall, ParseIssue> {
    if !CALL_NAMES.contains(&raw.name.as_str()) {
        return Err(ParseIssue::UnknownCallName(raw.name.clone()));
    }
    let obj = require_object(&raw.arguments)?;
    let tellask_content = require_tellask_content(obj)?;

    match raw.name.as_str() {
        "tellaskBack" => Ok(ParsedCall::TellaskBack { tellask_content }),
        "askHuman" => Ok(ParsedCall::AskHuman { tellask_content }),
        "tellask" => Ok(ParsedCall::Tellask {
            tellask_content,
            target_agent_id: require_target_agent_id(obj)?,
            session_slug: require_session_slug(obj)?,
        }),
        "tellaskSessionless" => Ok(ParsedCall::TellaskSessionless {
            tellask_content,
            target_agent_id: require_target_agent_id(obj)?,
        }),
        "freshBootsReasoning" => Ok(ParsedCall::FreshBootsReasoning {
            tellask_content,
            effort_override: optional_effort(obj)?,
        }),
        other => unreachable!("call name {other:?} already validated against CALL_NAMES"),
    }
}
