//! Per-key async locks serializing resolutions of the same history

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type HistoryKey = (String, Option<String>);

/// One async mutex per `(url, scope)`
///
/// Resolutions of the same key run one at a time; different keys never
/// contend.
#[derive(Default)]
pub struct KeyedLocks {
    locks: DashMap<HistoryKey, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a history
    pub async fn lock(&self, url: &str, scope: Option<&str>) -> OwnedMutexGuard<()> {
        let mutex = self
            .locks
            .entry((url.to_string(), scope.map(str::to_string)))
            .or_default()
            .clone();
        // The shard guard is released before awaiting
        mutex.lock_owned().await
    }

    /// Forget locks nobody holds or waits for
    pub fn prune(&self) {
        self.locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
