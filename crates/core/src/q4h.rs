//! Q4H (ask-human) queue: persistence of merged questions and the
//! answer-side fan-out. The merge policy itself lives in
//! [`crate::special_call::merge`]; this module owns storage and the
//! decision of whether an answer drives immediately or queues.

use crate::error::CoreResult;
use crate::ids::CallId;
use crate::run_state::PersistenceStatus;
use crate::special_call::merge::{merge_ask_human, AskHumanCall};
use crate::store::records::{CallSiteRef, HumanQuestion};
use crate::store::{now, EventStore};

pub struct AnswerOutcome {
    pub removed: HumanQuestion,
    /// Every call id a `receiveTeammateCallResult` must be delivered to:
    /// the primary plus every merged-in call.
    pub call_ids: Vec<CallId>,
}

/// Persists a (possibly merged) question from one generation's `askHuman`
/// calls and returns it.
#[allow(clippy::too_many_arguments)]
pub async fn ask(
    store: &dyn EventStore,
    root_id: &str,
    self_id: &str,
    status: PersistenceStatus,
    agent_id: &str,
    task_doc_path: &str,
    course: u64,
    message_index: u64,
    calls: &[AskHumanCall],
    preamble: &str,
) -> CoreResult<HumanQuestion> {
    let merged = merge_ask_human(calls, preamble);
    let question = HumanQuestion {
        id: HumanQuestion::make_id(root_id, self_id, course, &merged.primary_call_id),
        root_id: root_id.to_string(),
        self_id: self_id.to_string(),
        agent_id: agent_id.to_string(),
        task_doc_path: task_doc_path.to_string(),
        tellask_content: merged.content,
        asked_at: now(),
        call_id: merged.primary_call_id,
        remaining_call_ids: merged.remaining_call_ids,
        call_site_ref: CallSiteRef { course, message_index },
    };
    store
        .append_question4human(root_id, self_id, status, question.clone())
        .await?;
    Ok(question)
}

/// Removes the question and reports the call ids an answer must fan out
/// to (the primary call id and every merged-in id, in original order).
pub async fn answer(
    store: &dyn EventStore,
    root_id: &str,
    self_id: &str,
    status: PersistenceStatus,
    question_id: &str,
) -> CoreResult<Option<AnswerOutcome>> {
    let removed = store
        .remove_question4human(root_id, self_id, status, question_id)
        .await?;
    Ok(removed.removed.map(|q| {
        let call_ids = q.all_call_ids();
        AnswerOutcome {
            removed: q,
            call_ids,
        }
    }))
}

/// An answered dialog with subdialogs still pending should queue the
/// answer as `upNext` rather than drive immediately, to avoid interleaving
/// with in-flight subdialog replies.
pub fn should_queue_as_up_next(has_pending_subdialogs: bool) -> bool {
    has_pending_subdialogs
}
