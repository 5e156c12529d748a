//! `freshBootsReasoning` effort resolution and per-round prompt shaping.
//! The multi-round drive loop itself lives in the driver, which calls these
//! pure helpers once per iteration.

/// Resolves effective effort: an explicit per-call override wins, otherwise
/// the agent's configured `fbr_effort`.
pub fn resolve_effort(override_effort: Option<i64>, member_fbr_effort: i64) -> i64 {
    override_effort.unwrap_or(member_fbr_effort)
}

/// Effort below 1 disables FBR entirely for this call.
pub fn is_disabled(effort: i64) -> bool {
    effort < 1
}

/// Builds the per-round instruction header told to the self-directed
/// subdialog: adopt a distinct perspective for round `round/total`, and
/// (on the final round) additionally require novel angles and evidence.
pub fn round_prompt_header(round: i64, total: i64) -> String {
    if round == total {
        format!(
            "Round {round}/{total}: adopt a perspective distinct from every prior round. \
             Do not repeat prior-round conclusions. This is the final round: surface novel \
             angles and concrete evidence your prior rounds have not already covered."
        )
    } else {
        format!(
            "Round {round}/{total}: adopt a perspective distinct from every prior round. \
             Do not repeat prior-round conclusions."
        )
    }
}

/// Whether the pending-subdialog record should be written before scheduling
/// round `round` of `total`. Only the final round writes one.
pub fn writes_pending_record(round: i64, total: i64) -> bool {
    round == total
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_wins_over_member_default() {
        assert_eq!(resolve_effort(Some(5), 2), 5);
    }

    #[test]
    fn falls_back_to_member_default() {
        assert_eq!(resolve_effort(None, 2), 2);
    }

    #[test]
    fn zero_or_negative_effort_is_disabled() {
        assert!(is_disabled(0));
        assert!(is_disabled(-1));
        assert!(!is_disabled(1));
    }

    #[test]
    fn only_final_round_writes_pending_record() {
        assert!(!writes_pending_record(1, 3));
        assert!(!writes_pending_record(2, 3));
        assert!(writes_pending_record(3, 3));
    }

    #[test]
    fn final_round_header_demands_novelty() {
        let header = round_prompt_header(3, 3);
        assert!(header.contains("final round"));
    }
}
