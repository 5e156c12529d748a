//! The per-dialog async mutex.
//!
//! Exclusively owns mutation of a dialog's in-memory fields and its on-disk
//! course log for the duration of a drive round. `waitInQue=false` turns
//! contention into a fast fail (`DialogBusy`) rather than blocking.

use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

#[derive(Debug, thiserror::Error)]
#[error("dialog is busy")]
pub struct DialogBusy;

/// Wraps an `Arc<Mutex<()>>` as the exclusivity token for one dialog. Callers
/// hold the returned guard for the duration of their drive round and must
/// release on every exit path (guaranteed by `Drop`).
#[derive(Clone)]
pub struct DialogLock {
    inner: Arc<Mutex<()>>,
}

pub struct DialogLockGuard {
    _guard: OwnedMutexGuard<()>,
}

impl DialogLock {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(())),
        }
    }

    /// Acquires the lock. If `wait_in_queue` is false and the lock is
    /// currently held, fails fast with `DialogBusy` instead of blocking.
    pub async fn acquire(&self, wait_in_queue: bool) -> Result<DialogLockGuard, DialogBusy> {
        if wait_in_queue {
            let guard = self.inner.clone().lock_owned().await;
            Ok(DialogLockGuard { _guard: guard })
        } else {
            match self.inner.clone().try_lock_owned() {
                Ok(guard) => Ok(DialogLockGuard { _guard: guard }),
                Err(_) => Err(DialogBusy),
            }
        }
    }

    pub fn is_locked(&self) -> bool {
        self.inner.try_lock().is_err()
    }
}

impl Default for DialogLock {
    fn default() -> Self {
        Self::new()
    }
}
