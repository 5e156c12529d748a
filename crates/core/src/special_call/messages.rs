//! Side-output formatting shared by every execution path: the "environment"
//! message shown to the model on failure, and the `tellask_result_msg`
//! mirror appended to the caller's in-memory messages either way.

use crate::dialog::model::{ChatMessage, ChatRole};
use crate::events::ToolResultStatus;

/// The message appended to the caller's context explaining a failure in
/// terms the model can act on. Always paired with a `failed` result mirror.
pub fn environment_failure_message(call_name: &str, reason: &str) -> ChatMessage {
    ChatMessage {
        role: ChatRole::Tool,
        content: format!("[{call_name} failed] {reason}"),
    }
}

/// The `tellask_result_msg` mirror. `status` is `completed` only for the
/// synchronous Type-A path; every other success is mirrored once the reply
/// actually arrives via reply routing.
pub fn tellask_result_message(call_name: &str, status: ToolResultStatus, body: &str) -> ChatMessage {
    let label = match status {
        ToolResultStatus::Completed => "completed",
        ToolResultStatus::Failed => "failed",
    };
    ChatMessage {
        role: ChatRole::Tool,
        content: format!("[{call_name} {label}] {body}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_message_names_the_call() {
        let msg = environment_failure_message("tellask", "direct self-call");
        assert!(msg.content.contains("tellask"));
        assert!(msg.content.contains("direct self-call"));
    }

    #[test]
    fn result_message_labels_status() {
        let msg = tellask_result_message("tellaskBack", ToolResultStatus::Completed, "done");
        assert!(msg.content.contains("completed"));
    }
}
