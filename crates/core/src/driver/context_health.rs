//! Context Health Gate: consulted once per drive round before invoking the
//! external generation source, to decide whether the round should proceed,
//! continue with a warning, or suspend outright.

use crate::dialog::ContextHealthSnapshot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Continue { reason: String },
    Suspend { reason: String },
}

/// Fraction of `limit_tokens` above which the gate starts warning instead
/// of silently proceeding.
const WARN_THRESHOLD: f64 = 0.85;

/// Consults the latest context-health snapshot plus whether this round
/// carries an explicit user prompt and how much of the critical countdown
/// remains. A present user prompt always overrides a countdown-based
/// suspension — the user is actively waiting on a reply.
pub fn consult(
    snapshot: Option<&ContextHealthSnapshot>,
    has_user_prompt: bool,
    critical_countdown: Option<u32>,
) -> GateDecision {
    if let Some(countdown) = critical_countdown {
        if countdown == 0 && !has_user_prompt {
            return GateDecision::Suspend {
                reason: "critical_countdown_exhausted".into(),
            };
        }
    }

    let Some(snapshot) = snapshot else {
        return GateDecision::Proceed;
    };

    if snapshot.limit_tokens == 0 {
        return GateDecision::Proceed;
    }

    let usage = snapshot.used_tokens as f64 / snapshot.limit_tokens as f64;
    if usage >= 1.0 {
        if has_user_prompt {
            GateDecision::Continue {
                reason: "context_over_limit_user_driven".into(),
            }
        } else {
            GateDecision::Suspend {
                reason: "context_over_limit".into(),
            }
        }
    } else if usage >= WARN_THRESHOLD {
        GateDecision::Continue {
            reason: "context_nearing_limit".into(),
        }
    } else {
        GateDecision::Proceed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(used: u64, limit: u64) -> ContextHealthSnapshot {
        ContextHealthSnapshot {
            used_tokens: used,
            limit_tokens: limit,
            critical_countdown: None,
        }
    }

    #[test]
    fn no_snapshot_always_proceeds() {
        assert_eq!(consult(None, false, None), GateDecision::Proceed);
    }

    #[test]
    fn low_usage_proceeds() {
        assert_eq!(consult(Some(&snapshot(100, 1000)), false, None), GateDecision::Proceed);
    }

    #[test]
    fn high_usage_continues_with_warning() {
        assert_eq!(
            consult(Some(&snapshot(900, 1000)), false, None),
            GateDecision::Continue {
                reason: "context_nearing_limit".into()
            }
        );
    }

    #[test]
    fn over_limit_without_user_prompt_suspends() {
        assert_eq!(
            consult(Some(&snapshot(1100, 1000)), false, None),
            GateDecision::Suspend {
                reason: "context_over_limit".into()
            }
        );
    }

    #[test]
    fn over_limit_with_user_prompt_continues_instead_of_suspending() {
        assert_eq!(
            consult(Some(&snapshot(1100, 1000)), true, None),
            GateDecision::Continue {
                reason: "context_over_limit_user_driven".into()
            }
        );
    }

    #[test]
    fn exhausted_countdown_without_user_prompt_suspends() {
        assert_eq!(
            consult(None, false, Some(0)),
            GateDecision::Suspend {
                reason: "critical_countdown_exhausted".into()
            }
        );
    }

    #[test]
    fn exhausted_countdown_with_user_prompt_is_overridden() {
        assert_eq!(consult(None, true, Some(0)), GateDecision::Proceed);
    }
}
