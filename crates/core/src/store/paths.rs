//! Centralizes the on-disk directory scheme so every store operation derives
//! paths the same way instead of formatting strings ad hoc.
//!
//! ```text
//! <root>/dialogs/<status>/<rootId>/
//!   metadata.yaml
//!   latest.yaml
//!   q4h.yaml
//!   pending-subdialogs.json
//!   courses/c<N>/events.log
//!   artifacts/<path>
//!   subdialogs/<selfId>/ ...
//! ```

use std::path::{Path, PathBuf};

use crate::run_state::PersistenceStatus;

fn status_dir(status: PersistenceStatus) -> &'static str {
    match status {
        PersistenceStatus::Running => "running",
        PersistenceStatus::Completed => "completed",
        PersistenceStatus::Archived => "archived",
    }
}

#[derive(Debug, Clone)]
pub struct PathLayout {
    root: PathBuf,
}

impl PathLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// `<root>/dialogs/<status>/<rootId>`, with `<selfId>` appended as a
    /// `subdialogs/<selfId>` chain for every non-root segment.
    pub fn dialog_dir(&self, root_id: &str, self_id: &str, status: PersistenceStatus) -> PathBuf {
        let mut path = self
            .root
            .join("dialogs")
            .join(status_dir(status))
            .join(root_id);
        if self_id != root_id {
            path = path.join("subdialogs").join(self_id);
        }
        path
    }

    pub fn metadata_file(&self, root_id: &str, self_id: &str, status: PersistenceStatus) -> PathBuf {
        self.dialog_dir(root_id, self_id, status).join("metadata.yaml")
    }

    pub fn latest_file(&self, root_id: &str, self_id: &str, status: PersistenceStatus) -> PathBuf {
        self.dialog_dir(root_id, self_id, status).join("latest.yaml")
    }

    pub fn q4h_file(&self, root_id: &str, self_id: &str, status: PersistenceStatus) -> PathBuf {
        self.dialog_dir(root_id, self_id, status).join("q4h.yaml")
    }

    pub fn pending_subdialogs_file(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
    ) -> PathBuf {
        self.dialog_dir(root_id, self_id, status)
            .join("pending-subdialogs.json")
    }

    pub fn course_dir(&self, root_id: &str, self_id: &str, status: PersistenceStatus, course: u64) -> PathBuf {
        self.dialog_dir(root_id, self_id, status)
            .join("courses")
            .join(format!("c{course}"))
    }

    pub fn course_events_file(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        course: u64,
    ) -> PathBuf {
        self.course_dir(root_id, self_id, status, course)
            .join("events.log")
    }

    pub fn artifacts_dir(&self, root_id: &str, self_id: &str, status: PersistenceStatus) -> PathBuf {
        self.dialog_dir(root_id, self_id, status).join("artifacts")
    }

    pub fn status_root(&self, status: PersistenceStatus) -> PathBuf {
        self.root.join("dialogs").join(status_dir(status))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_dialog_has_no_subdialogs_segment() {
        let layout = PathLayout::new("/data");
        let dir = layout.dialog_dir("r1", "r1", PersistenceStatus::Running);
        assert_eq!(dir, PathBuf::from("/data/dialogs/running/r1"));
    }

    #[test]
    fn sub_dialog_nests_under_subdialogs() {
        let layout = PathLayout::new("/data");
        let dir = layout.dialog_dir("r1", "s1", PersistenceStatus::Running);
        assert_eq!(dir, PathBuf::from("/data/dialogs/running/r1/subdialogs/s1"));
    }

    #[test]
    fn course_events_file_is_indexed_by_course_number() {
        let layout = PathLayout::new("/data");
        let file = layout.course_events_file("r1", "r1", PersistenceStatus::Running, 3);
        assert_eq!(
            file,
            PathBuf::from("/data/dialogs/running/r1/courses/c3/events.log")
        );
    }

    #[test]
    fn status_changes_the_top_level_directory() {
        let layout = PathLayout::new("/data");
        let completed = layout.metadata_file("r1", "r1", PersistenceStatus::Completed);
        assert!(completed.starts_with("/data/dialogs/completed"));
    }
}
