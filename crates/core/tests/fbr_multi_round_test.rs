//! `freshBootsReasoning` with an effort override above one drives its
//! self-directed subdialog through multiple serial rounds and distills the
//! accumulated sayings into a single relayed reply.

mod common;

use common::{emitted, harness, outcome, saying_outcome};
use dominds_core::events::CourseEventKind;
use dominds_core::run_state::PersistenceStatus;
use dominds_core::special_call::ParsedCall;

#[tokio::test]
async fn two_round_fbr_relays_a_distilled_reply_with_both_rounds_labeled() {
    let (store, registry, generation, executor, _dir, root_id) = harness().await;

    generation.push(
        &root_id,
        outcome(vec![emitted(
            "f1",
            ParsedCall::FreshBootsReasoning {
                tellask_content: "weigh the tradeoffs".into(),
                effort_override: Some(2),
            },
        )]),
    );
    // The subdialog id is deterministic (`fbr-<callId>`), so its two rounds
    // can be scripted ahead of time.
    let fbr_dialog_id = "fbr-f1";
    generation.push(fbr_dialog_id, saying_outcome("perspective one"));
    generation.push(fbr_dialog_id, saying_outcome("perspective two"));

    executor
        .execute_drive_round(&root_id, &root_id, Some("start".into()), false)
        .await
        .unwrap();

    let events = store
        .read_course_events(&root_id, &root_id, PersistenceStatus::Running, 1)
        .await
        .unwrap();
    let response = events
        .iter()
        .find_map(|e| match &e.kind {
            CourseEventKind::TeammateResponseRecord { response_text, .. } => Some(response_text.clone()),
            _ => None,
        })
        .expect("expected a TeammateResponseRecord on the root's log");

    assert!(response.contains("Round 1"));
    assert!(response.contains("perspective one"));
    assert!(response.contains("Round 2"));
    assert!(response.contains("perspective two"));
    assert!(response.contains("Synthesize the distinct perspectives"));

    assert!(!registry.dialogs_needing_drive().await.is_empty(), "the relay should revive the root");
}

#[tokio::test]
async fn single_round_fbr_skips_the_distill_note() {
    let (store, _registry, generation, executor, _dir, root_id) = harness().await;

    generation.push(
        &root_id,
        outcome(vec![emitted(
            "f1",
            ParsedCall::FreshBootsReasoning {
                tellask_content: "sanity check this plan".into(),
                effort_override: Some(1),
            },
        )]),
    );
    generation.push("fbr-f1", saying_outcome("looks fine"));

    executor
        .execute_drive_round(&root_id, &root_id, Some("start".into()), false)
        .await
        .unwrap();

    let events = store
        .read_course_events(&root_id, &root_id, PersistenceStatus::Running, 1)
        .await
        .unwrap();
    let response = events
        .iter()
        .find_map(|e| match &e.kind {
            CourseEventKind::TeammateResponseRecord { response_text, .. } => Some(response_text.clone()),
            _ => None,
        })
        .expect("expected a TeammateResponseRecord on the root's log");

    assert!(response.contains("looks fine"));
    assert!(!response.contains("Synthesize the distinct perspectives"));
}
