//! Event-sourced persistence: the Event Store.
//!
//! `FsEventStore` is the sole implementation, built directly on `tokio::fs`.
//! Whole-object files (`metadata.yaml`, `latest.yaml`, `q4h.yaml`) are
//! written atomically via [`atomic::atomic_write`]; `pending-subdialogs.json`
//! is mutated exclusively under the subdialog-txn lock; course logs are
//! append-only JSONL.

pub mod atomic;
pub mod course_log;
pub mod paths;
pub mod records;
pub mod txn_lock;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::error::{CoreError, CoreResult};
use crate::events::CourseEvent;
use crate::ids::CallId;
use crate::run_state::PersistenceStatus;

use paths::PathLayout;
use records::{DialogLatest, DialogMetadata, HumanQuestion, PendingSubdialogRecord};
use txn_lock::TxnLockRegistry;

/// Full restored state of a dialog: the pieces needed to repopulate an
/// in-memory `Dialog` on first access after a restart.
#[derive(Debug, Clone)]
pub struct RestoredDialog {
    pub metadata: DialogMetadata,
    pub latest: DialogLatest,
    pub current_course: u64,
}

/// The result of a `removeQuestion4HumanState` call: whether a question was
/// found, and the removed question for rehydration if so.
#[derive(Debug, Clone)]
pub struct RemovedQuestion {
    pub found: bool,
    pub removed: Option<HumanQuestion>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn restore_dialog(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
    ) -> CoreResult<Option<RestoredDialog>>;

    async fn load_dialog_latest(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
    ) -> CoreResult<Option<DialogLatest>>;

    async fn save_dialog_latest(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        latest: &DialogLatest,
    ) -> CoreResult<()>;

    async fn load_dialog_metadata(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
    ) -> CoreResult<Option<DialogMetadata>>;

    async fn save_dialog_metadata(
        &self,
        status: PersistenceStatus,
        metadata: &DialogMetadata,
    ) -> CoreResult<()>;

    async fn load_pending_subdialogs(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
    ) -> CoreResult<Vec<PendingSubdialogRecord>>;

    async fn append_pending_subdialog(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        record: PendingSubdialogRecord,
    ) -> CoreResult<()>;

    /// Runs `f` against the current list under the subdialog-txn lock and
    /// persists whatever it returns.
    async fn mutate_pending_subdialogs(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        f: Box<dyn FnOnce(Vec<PendingSubdialogRecord>) -> Vec<PendingSubdialogRecord> + Send>,
    ) -> CoreResult<Vec<PendingSubdialogRecord>>;

    async fn append_event(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        course: u64,
        event: &CourseEvent,
    ) -> CoreResult<()>;

    async fn read_course_events(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        course: u64,
    ) -> CoreResult<Vec<CourseEvent>>;

    async fn get_current_course_number(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
    ) -> CoreResult<u64>;

    async fn append_question4human(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        question: HumanQuestion,
    ) -> CoreResult<()>;

    async fn remove_question4human(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        question_id: &str,
    ) -> CoreResult<RemovedQuestion>;

    async fn load_all_q4h_state(&self, status: PersistenceStatus) -> CoreResult<Vec<HumanQuestion>>;

    async fn set_needs_drive(
        &self,
        root_id: &str,
        status: PersistenceStatus,
        needs_drive: bool,
    ) -> CoreResult<()>;

    async fn get_needs_drive(&self, root_id: &str, status: PersistenceStatus) -> CoreResult<bool>;

    async fn move_dialog_status(
        &self,
        root_id: &str,
        from: PersistenceStatus,
        to: PersistenceStatus,
    ) -> CoreResult<()>;

    async fn delete_root_dialog(&self, root_id: &str, status: PersistenceStatus) -> CoreResult<()>;

    async fn list_dialogs(&self, status: PersistenceStatus) -> CoreResult<Vec<String>>;
}

pub struct FsEventStore {
    layout: PathLayout,
    txn_locks: TxnLockRegistry,
}

impl FsEventStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            layout: PathLayout::new(root),
            txn_locks: TxnLockRegistry::new(),
        }
    }

    async fn read_yaml<T: serde::de::DeserializeOwned>(
        &self,
        path: &std::path::Path,
    ) -> CoreResult<Option<T>> {
        match atomic::read_optional(path).await? {
            Some(bytes) => Ok(Some(serde_yaml::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_yaml<T: serde::Serialize>(&self, path: &std::path::Path, value: &T) -> CoreResult<()> {
        let bytes = serde_yaml::to_string(value)?;
        atomic::atomic_write(path, bytes.as_bytes()).await
    }

    async fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &std::path::Path,
    ) -> CoreResult<Option<T>> {
        match atomic::read_optional(path).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn write_json<T: serde::Serialize>(&self, path: &std::path::Path, value: &T) -> CoreResult<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        atomic::atomic_write(path, &bytes).await
    }
}

#[async_trait]
impl EventStore for FsEventStore {
    async fn restore_dialog(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
    ) -> CoreResult<Option<RestoredDialog>> {
        let metadata = self.load_dialog_metadata(root_id, self_id, status).await?;
        let latest = self.load_dialog_latest(root_id, self_id, status).await?;
        match (metadata, latest) {
            (Some(metadata), Some(latest)) => Ok(Some(RestoredDialog {
                current_course: latest.current_course,
                metadata,
                latest,
            })),
            _ => Ok(None),
        }
    }

    async fn load_dialog_latest(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
    ) -> CoreResult<Option<DialogLatest>> {
        let path = self.layout.latest_file(root_id, self_id, status);
        self.read_yaml(&path).await
    }

    async fn save_dialog_latest(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        latest: &DialogLatest,
    ) -> CoreResult<()> {
        let path = self.layout.latest_file(root_id, self_id, status);
        self.write_yaml(&path, latest).await
    }

    async fn load_dialog_metadata(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
    ) -> CoreResult<Option<DialogMetadata>> {
        let path = self.layout.metadata_file(root_id, self_id, status);
        self.read_yaml(&path).await
    }

    async fn save_dialog_metadata(
        &self,
        status: PersistenceStatus,
        metadata: &DialogMetadata,
    ) -> CoreResult<()> {
        let path = self
            .layout
            .metadata_file(&metadata.root_id, &metadata.self_id, status);
        self.write_yaml(&path, metadata).await
    }

    async fn load_pending_subdialogs(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
    ) -> CoreResult<Vec<PendingSubdialogRecord>> {
        let path = self.layout.pending_subdialogs_file(root_id, self_id, status);
        Ok(self.read_json(&path).await?.unwrap_or_default())
    }

    async fn append_pending_subdialog(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        record: PendingSubdialogRecord,
    ) -> CoreResult<()> {
        let _txn = self.txn_locks.acquire(root_id).await;
        let mut records = self.load_pending_subdialogs(root_id, self_id, status).await?;
        records.retain(|r| r.subdialog_id != record.subdialog_id);
        records.push(record);
        let path = self.layout.pending_subdialogs_file(root_id, self_id, status);
        self.write_json(&path, &records).await
    }

    async fn mutate_pending_subdialogs(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        f: Box<dyn FnOnce(Vec<PendingSubdialogRecord>) -> Vec<PendingSubdialogRecord> + Send>,
    ) -> CoreResult<Vec<PendingSubdialogRecord>> {
        let _txn = self.txn_locks.acquire(root_id).await;
        let current = self.load_pending_subdialogs(root_id, self_id, status).await?;
        let next = f(current);
        let path = self.layout.pending_subdialogs_file(root_id, self_id, status);
        self.write_json(&path, &next).await?;
        Ok(next)
    }

    async fn append_event(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        course: u64,
        event: &CourseEvent,
    ) -> CoreResult<()> {
        let path = self.layout.course_events_file(root_id, self_id, status, course);
        course_log::append_event(&path, event).await
    }

    async fn read_course_events(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        course: u64,
    ) -> CoreResult<Vec<CourseEvent>> {
        let path = self.layout.course_events_file(root_id, self_id, status, course);
        course_log::read_all(&path).await
    }

    async fn get_current_course_number(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
    ) -> CoreResult<u64> {
        let courses_dir = self
            .layout
            .dialog_dir(root_id, self_id, status)
            .join("courses");
        let mut highest = 0u64;
        let mut entries = match tokio::fs::read_dir(&courses_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(CoreError::Io(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(num) = name.strip_prefix('c').and_then(|n| n.parse::<u64>().ok()) {
                let events_file = entry.path().join("events.log");
                if !course_log::read_all(&events_file).await?.is_empty() {
                    highest = highest.max(num);
                }
            }
        }
        Ok(highest)
    }

    async fn append_question4human(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        question: HumanQuestion,
    ) -> CoreResult<()> {
        let path = self.layout.q4h_file(root_id, self_id, status);
        let mut questions: Vec<HumanQuestion> = self.read_yaml(&path).await?.unwrap_or_default();
        questions.retain(|q| q.id != question.id);
        questions.push(question);
        self.write_yaml(&path, &questions).await
    }

    async fn remove_question4human(
        &self,
        root_id: &str,
        self_id: &str,
        status: PersistenceStatus,
        question_id: &str,
    ) -> CoreResult<RemovedQuestion> {
        let path = self.layout.q4h_file(root_id, self_id, status);
        let mut questions: Vec<HumanQuestion> = self.read_yaml(&path).await?.unwrap_or_default();
        let idx = questions.iter().position(|q| q.id == question_id);
        let removed = idx.map(|i| questions.remove(i));
        self.write_yaml(&path, &questions).await?;
        Ok(RemovedQuestion {
            found: removed.is_some(),
            removed,
        })
    }

    async fn load_all_q4h_state(&self, status: PersistenceStatus) -> CoreResult<Vec<HumanQuestion>> {
        let status_root = self.layout.status_root(status);
        let mut all = Vec::new();
        let mut entries = match tokio::fs::read_dir(&status_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(all),
            Err(e) => return Err(CoreError::Io(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let root_id = entry.file_name().to_string_lossy().to_string();
            let path = self.layout.q4h_file(&root_id, &root_id, status);
            if let Some(questions) = self.read_yaml::<Vec<HumanQuestion>>(&path).await? {
                all.extend(questions);
            }
        }
        Ok(all)
    }

    async fn set_needs_drive(
        &self,
        root_id: &str,
        status: PersistenceStatus,
        needs_drive: bool,
    ) -> CoreResult<()> {
        let path = self
            .layout
            .dialog_dir(root_id, root_id, status)
            .join("needs-drive.flag");
        atomic::atomic_write(&path, if needs_drive { b"true" } else { b"false" }).await
    }

    async fn get_needs_drive(&self, root_id: &str, status: PersistenceStatus) -> CoreResult<bool> {
        let path = self
            .layout
            .dialog_dir(root_id, root_id, status)
            .join("needs-drive.flag");
        match atomic::read_optional(&path).await? {
            Some(bytes) => Ok(bytes == b"true"),
            None => Ok(false),
        }
    }

    async fn move_dialog_status(
        &self,
        root_id: &str,
        from: PersistenceStatus,
        to: PersistenceStatus,
    ) -> CoreResult<()> {
        let from_dir = self.layout.dialog_dir(root_id, root_id, from);
        let to_dir = self.layout.dialog_dir(root_id, root_id, to);
        if let Some(parent) = to_dir.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(&from_dir, &to_dir).await?;
        Ok(())
    }

    async fn delete_root_dialog(&self, root_id: &str, status: PersistenceStatus) -> CoreResult<()> {
        let dir = self.layout.dialog_dir(root_id, root_id, status);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_dialogs(&self, status: PersistenceStatus) -> CoreResult<Vec<String>> {
        let status_root = self.layout.status_root(status);
        let mut ids = Vec::new();
        let mut entries = match tokio::fs::read_dir(&status_root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(CoreError::Io(e)),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                ids.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(ids)
    }
}

pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

pub fn make_q4h_id(root_id: &str, self_id: &str, course: u64, call_id: &CallId) -> String {
    HumanQuestion::make_id(root_id, self_id, course, call_id)
}
