//! The Dialog Registry: a singleton `rootId -> {rootDialog, needsDrive}`
//! table plus a broadcast channel of `DriveTriggerEvent`s driving the
//! Backend Driver Loop. Reuses the broadcast-channel idiom of
//! [`crate::fanout`] for a different payload shape.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex};

use crate::dialog::{Dialog, DialogLock};

const TRIGGER_BUFFER: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerAction {
    MarkNeedsDrive,
    MarkNotNeedingDrive,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriveTriggerEvent {
    pub action: TriggerAction,
    pub root_id: String,
    pub entry_found: bool,
    pub previous_needs_drive: bool,
    pub next_needs_drive: bool,
    pub source: String,
    pub reason: String,
    pub emitted_at_ms: i64,
}

struct RegistryEntry {
    root_dialog: Arc<Mutex<Dialog>>,
    needs_drive: bool,
}

/// `register`/`markNeedsDrive`/`markNotNeedingDrive`/`waitForDriveTrigger`/
/// `getDialogsNeedingDrive`. Only the canonical root (`selfId == rootId`)
/// ever appears here.
pub struct DialogRegistry {
    entries: Mutex<HashMap<String, RegistryEntry>>,
    triggers: broadcast::Sender<DriveTriggerEvent>,
    /// Per-dialog exclusivity locks, keyed by `selfId` (root or sub alike —
    /// subdialogs run drive rounds of their own and are never registered as
    /// entries above). Created lazily on first use.
    locks: Mutex<HashMap<String, DialogLock>>,
}

impl DialogRegistry {
    pub fn new() -> Self {
        let (triggers, _) = broadcast::channel(TRIGGER_BUFFER);
        Self {
            entries: Mutex::new(HashMap::new()),
            triggers,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the `DialogLock` for `self_id`, creating it on first access.
    pub async fn dialog_lock(&self, self_id: &str) -> DialogLock {
        let mut locks = self.locks.lock().await;
        locks.entry(self_id.to_string()).or_insert_with(DialogLock::new).clone()
    }

    fn emit(&self, event: DriveTriggerEvent) {
        let _ = self.triggers.send(event);
    }

    /// Registers `root_dialog` if its `selfId == rootId`; a no-op on a
    /// duplicate id. Callers are expected to follow up by reading the
    /// persisted `needsDrive` hint and calling `mark_needs_drive` if set —
    /// the Event Store lookup itself is the caller's responsibility since
    /// the registry has no store handle of its own.
    pub async fn register(&self, root_dialog: Dialog) -> bool {
        if !root_dialog.is_root() {
            return false;
        }
        let root_id = root_dialog.core().id.root_id.clone();
        let mut entries = self.entries.lock().await;
        if entries.contains_key(&root_id) {
            return false;
        }
        entries.insert(
            root_id,
            RegistryEntry {
                root_dialog: Arc::new(Mutex::new(root_dialog)),
                needs_drive: false,
            },
        );
        true
    }

    pub async fn unregister(&self, root_id: &str) {
        self.entries.lock().await.remove(root_id);
    }

    pub async fn get(&self, root_id: &str) -> Option<Arc<Mutex<Dialog>>> {
        self.entries
            .lock()
            .await
            .get(root_id)
            .map(|e| e.root_dialog.clone())
    }

    async fn set_needs_drive(
        &self,
        root_id: &str,
        next: bool,
        action: TriggerAction,
        source: &str,
        reason: &str,
        now_ms: i64,
    ) {
        let mut entries = self.entries.lock().await;
        let (entry_found, previous) = match entries.get_mut(root_id) {
            Some(entry) => {
                let previous = entry.needs_drive;
                entry.needs_drive = next;
                (true, previous)
            }
            None => (false, false),
        };
        drop(entries);
        self.emit(DriveTriggerEvent {
            action,
            root_id: root_id.to_string(),
            entry_found,
            previous_needs_drive: previous,
            next_needs_drive: next,
            source: source.to_string(),
            reason: reason.to_string(),
            emitted_at_ms: now_ms,
        });
    }

    pub async fn mark_needs_drive(&self, root_id: &str, source: &str, reason: &str, now_ms: i64) {
        self.set_needs_drive(root_id, true, TriggerAction::MarkNeedsDrive, source, reason, now_ms)
            .await;
    }

    pub async fn mark_not_needing_drive(&self, root_id: &str, source: &str, reason: &str, now_ms: i64) {
        self.set_needs_drive(
            root_id,
            false,
            TriggerAction::MarkNotNeedingDrive,
            source,
            reason,
            now_ms,
        )
        .await;
    }

    pub fn subscribe_triggers(&self) -> DriveTriggerSub {
        DriveTriggerSub {
            receiver: self.triggers.subscribe(),
        }
    }

    pub async fn dialogs_needing_drive(&self) -> Vec<Arc<Mutex<Dialog>>> {
        self.entries
            .lock()
            .await
            .values()
            .filter(|e| e.needs_drive)
            .map(|e| e.root_dialog.clone())
            .collect()
    }
}

impl Default for DialogRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Recreates its subscription on end-of-stream, so a lagged-out consumer of
/// `waitForDriveTrigger` never permanently stalls.
pub struct DriveTriggerSub {
    receiver: broadcast::Receiver<DriveTriggerEvent>,
}

impl DriveTriggerSub {
    pub async fn wait_for_trigger(&mut self) -> DriveTriggerEvent {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return event,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }
}
