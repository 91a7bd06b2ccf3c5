//! In-process single-flight locks keyed by `(stage, video, unit)`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use reel_models::{Stage, VideoKey};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct LockId {
    stage: Stage,
    key: String,
    unit: Option<u32>,
}

impl LockId {
    pub(crate) fn new(stage: Stage, key: &VideoKey, unit: Option<u32>) -> Self {
        Self {
            stage,
            key: key.to_string(),
            unit,
        }
    }
}

type LockTable = HashMap<LockId, Arc<AsyncMutex<()>>>;

/// Lock table; entries are dropped again once nobody holds or waits on them.
#[derive(Debug, Clone, Default)]
pub(crate) struct KeyedLocks {
    table: Arc<Mutex<LockTable>>,
}

impl KeyedLocks {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `id`.
    pub(crate) async fn acquire(&self, id: LockId) -> StageLockGuard {
        let lock = {
            let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
            table.entry(id.clone()).or_default().clone()
        };

        let guard = lock.lock_owned().await;
        debug!(stage = %id.stage, key = %id.key, unit = ?id.unit, "Stage lock acquired");

        StageLockGuard {
            guard: Some(guard),
            id,
            table: Arc::clone(&self.table),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Held while a stage is being produced and stored.
pub(crate) struct StageLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    id: LockId,
    table: Arc<Mutex<LockTable>>,
}

impl Drop for StageLockGuard {
    fn drop(&mut self) {
        // Release first so the strong count below only sees the table and waiters
        self.guard.take();

        let mut table = self.table.lock().unwrap_or_else(|e| e.into_inner());
        if table
            .get(&self.id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            table.remove(&self.id);
        }
    }
}
