//! The subdialog-txn lock: a single mutex per root guarding every mutation
//! of that root's subdialog registry entries and its callers' pending-list
//! files, so Type-B reassignment and reply-routing revival never race.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

#[derive(Clone, Default)]
pub struct TxnLockRegistry {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl TxnLockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    async fn lock_for(&self, root_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(root_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Acquires the per-root subdialog-txn lock, blocking until available.
    pub async fn acquire(&self, root_id: &str) -> TxnLockGuard {
        let lock = self.lock_for(root_id).await;
        let guard = lock.lock_owned().await;
        TxnLockGuard { _guard: guard }
    }
}

pub struct TxnLockGuard {
    _guard: tokio::sync::OwnedMutexGuard<()>,
}
