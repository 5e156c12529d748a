//! Identifiers: `DialogId`, `callId`, and the `sessionSlug` grammar.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// `(selfId, rootId)`. A dialog is a root iff `self_id == root_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DialogId {
    pub self_id: String,
    pub root_id: String,
}

impl DialogId {
    pub fn new(self_id: impl Into<String>, root_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            root_id: root_id.into(),
        }
    }

    /// A root dialog id: `self_id == root_id`.
    pub fn root(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            self_id: id.clone(),
            root_id: id,
        }
    }

    pub fn is_root(&self) -> bool {
        self.self_id == self.root_id
    }

    /// Validates the structural invariant: neither id empty.
    pub fn validate(&self) -> Result<(), String> {
        if self.self_id.is_empty() {
            return Err("selfId must not be empty".into());
        }
        if self.root_id.is_empty() {
            return Err("rootId must not be empty".into());
        }
        Ok(())
    }
}

impl fmt::Display for DialogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.self_id, self.root_id)
    }
}

/// Opaque per-model-call identifier, unique within a dialog course.
pub type CallId = String;

static SESSION_SLUG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*(\.[A-Za-z][A-Za-z0-9_-]*)*$").expect("valid regex")
});

/// Validates the `sessionSlug` grammar: `alpha (alnum|_|-)* ('.' segment)*`.
pub fn validate_session_slug(slug: &str) -> Result<(), String> {
    if SESSION_SLUG_RE.is_match(slug) {
        Ok(())
    } else {
        Err(format!("invalid sessionSlug: {slug:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_dialog_id_has_equal_self_and_root() {
        let id = DialogId::root("r1");
        assert!(id.is_root());
        assert_eq!(id.self_id, "r1");
        assert_eq!(id.root_id, "r1");
    }

    #[test]
    fn sub_dialog_id_is_not_root() {
        let id = DialogId::new("s1", "r1");
        assert!(!id.is_root());
    }

    #[test]
    fn empty_self_id_fails_validation() {
        let id = DialogId::new("", "r1");
        assert!(id.validate().is_err());
    }

    #[test]
    fn slug_grammar_accepts_simple_alnum() {
        assert!(validate_session_slug("build-loop").is_ok());
        assert!(validate_session_slug("build_loop2").is_ok());
    }

    #[test]
    fn slug_grammar_accepts_dotted_segments() {
        assert!(validate_session_slug("build.sub-task.v2").is_ok());
    }

    #[test]
    fn slug_grammar_rejects_leading_digit() {
        assert!(validate_session_slug("1abc").is_err());
    }

    #[test]
    fn slug_grammar_rejects_leading_dot() {
        assert!(validate_session_slug(".abc").is_err());
    }

    #[test]
    fn slug_grammar_rejects_empty() {
        assert!(validate_session_slug("").is_err());
    }

    #[test]
    fn slug_grammar_rejects_trailing_dot() {
        assert!(validate_session_slug("abc.").is_err());
    }
}
