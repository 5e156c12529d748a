//! Tellask Reminder Sync: recomputes the `pendingTellask`-owned reminder
//! from the caller's current pending-subdialog view.

use crate::dialog::{Reminder, ReminderMeta, ReminderOwner};
use crate::store::records::PendingSubdialogRecord;

const HEAD_CHARS: usize = 140;

fn call_type_label(call_type: crate::special_call::CallType) -> &'static str {
    match call_type {
        crate::special_call::CallType::A => "reply-pending",
        crate::special_call::CallType::B => "session",
        crate::special_call::CallType::C => "one-shot",
    }
}

fn head(content: &str, max_chars: usize) -> String {
    let truncated: String = content.chars().take(max_chars).collect();
    if truncated.chars().count() < content.chars().count() {
        format!("{truncated}…")
    } else {
        truncated
    }
}

/// `(subdialogId, target, callType, sessionSlug?, summarizedHead)`, sorted
/// and joined, forming the signature used to detect "nothing changed".
fn pending_signature(pending: &[PendingSubdialogRecord]) -> String {
    let mut parts: Vec<String> = pending
        .iter()
        .map(|r| {
            format!(
                "{}|{}|{:?}|{}|{}",
                r.subdialog_id,
                r.target_agent_id,
                r.call_type,
                r.session_slug.clone().unwrap_or_default(),
                head(&r.tellask_content, HEAD_CHARS)
            )
        })
        .collect();
    parts.sort();
    parts.join(";")
}

fn render_content(pending: &[PendingSubdialogRecord]) -> String {
    let mut lines = vec![format!(
        "Pending teammate replies ({} outstanding):",
        pending.len()
    )];
    for (i, record) in pending.iter().enumerate() {
        lines.push(format!(
            "{}. @{} | {} | {}",
            i + 1,
            record.target_agent_id,
            call_type_label(record.call_type),
            head(&record.tellask_content, HEAD_CHARS)
        ));
    }
    lines.join("\n")
}

/// Applies the sync: returns the reminder list's new state (mutates the
/// slot owned by `pendingTellask`, leaving every other reminder untouched).
pub fn sync(reminders: &mut Vec<Reminder>, pending: &[PendingSubdialogRecord], now_ms: i64) {
    let existing_idx = reminders
        .iter()
        .position(|r| r.owner == ReminderOwner::PendingTellask);

    if pending.is_empty() {
        if let Some(idx) = existing_idx {
            reminders.remove(idx);
        }
        return;
    }

    let signature = pending_signature(pending);
    let content = render_content(pending);
    let meta = ReminderMeta {
        pending_signature: signature.clone(),
        pending_count: pending.len(),
        updated_at: now_ms,
    };

    match existing_idx {
        None => reminders.insert(
            0,
            Reminder {
                owner: ReminderOwner::PendingTellask,
                content,
                meta: Some(meta),
            },
        ),
        Some(idx) => {
            let changed = reminders[idx]
                .meta
                .as_ref()
                .map(|m| m.pending_signature != signature)
                .unwrap_or(true)
                || reminders[idx].content != content;
            if changed {
                reminders[idx].content = content;
                reminders[idx].meta = Some(meta);
            }
        }
    }
}
