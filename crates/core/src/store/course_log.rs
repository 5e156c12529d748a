//! Append and replay of a course's `events.log` (newline-delimited JSON).

use std::path::Path;

use crate::error::CoreResult;
use crate::events::CourseEvent;

use super::atomic::{append_line, read_optional};

pub async fn append_event(path: &Path, event: &CourseEvent) -> CoreResult<()> {
    let line = serde_json::to_string(event)?;
    append_line(path, &line).await
}

/// Reads every well-formed event from the log in append order. A trailing
/// line that fails to parse (a write interrupted mid-line) is dropped
/// rather than failing the whole read — it was never acknowledged to any
/// caller since `append_line` flushes only after the full line is written.
pub async fn read_all(path: &Path) -> CoreResult<Vec<CourseEvent>> {
    let Some(bytes) = read_optional(path).await? else {
        return Ok(Vec::new());
    };
    let text = String::from_utf8_lossy(&bytes);
    let mut events = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<CourseEvent>(line) {
            Ok(event) => events.push(event),
            Err(_) => break,
        }
    }
    Ok(events)
}

/// Scans the log from the end backward for the most recent event matching
/// `predicate` (used to resolve assignment anchors during reply routing).
pub async fn find_last(
    path: &Path,
    predicate: impl Fn(&CourseEvent) -> bool,
) -> CoreResult<Option<CourseEvent>> {
    let events = read_all(path).await?;
    Ok(events.into_iter().rev().find(predicate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{CourseEventKind, PromptOrigin};
    use tempfile::tempdir;

    fn event(genseq: u64) -> CourseEvent {
        CourseEvent {
            genseq,
            timestamp_ms: 0,
            kind: CourseEventKind::Prompting {
                content: format!("msg-{genseq}"),
                origin: PromptOrigin::User,
            },
        }
    }

    #[tokio::test]
    async fn append_then_read_all_preserves_order() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        append_event(&path, &event(1)).await.unwrap();
        append_event(&path, &event(2)).await.unwrap();
        let events = read_all(&path).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].genseq, 1);
        assert_eq!(events[1].genseq, 2);
    }

    #[tokio::test]
    async fn read_all_on_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.log");
        assert!(read_all(&path).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn truncated_trailing_line_is_dropped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        append_event(&path, &event(1)).await.unwrap();
        tokio::fs::write(
            &path,
            format!(
                "{}\n{{\"genseq\":2,\"timestamp_ms\":0,\"type\":\"promp",
                serde_json::to_string(&event(1)).unwrap()
            ),
        )
        .await
        .unwrap();
        let events = read_all(&path).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn find_last_scans_backward() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.log");
        append_event(&path, &event(1)).await.unwrap();
        append_event(&path, &event(2)).await.unwrap();
        append_event(&path, &event(3)).await.unwrap();
        let found = find_last(&path, |e| e.genseq <= 2).await.unwrap().unwrap();
        assert_eq!(found.genseq, 2);
    }
}
