use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key async mutexes, created on first use and dropped once the last
/// holder or waiter lets go.
pub(crate) struct LockTable<K: Eq + Hash + Clone> {
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash + Clone> LockTable<K> {
    pub(crate) fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub(crate) async fn lock(&self, key: &K) -> KeyGuard<'_, K> {
        // Clone the Arc out so the DashMap shard lock is released before we await.
        let mutex = self.locks.entry(key.clone()).or_default().clone();
        let guard = mutex.lock_owned().await;
        KeyGuard {
            table: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// Lock several keys in ascending order.
    pub(crate) async fn lock_all(&self, keys: &mut Vec<K>) -> Vec<KeyGuard<'_, K>>
    where
        K: Ord,
    {
        keys.sort();
        keys.dedup();
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys.iter() {
            guards.push(self.lock(key).await);
        }
        guards
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }
}

pub(crate) struct KeyGuard<'a, K: Eq + Hash + Clone> {
    table: &'a LockTable<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> Drop for KeyGuard<'_, K> {
    fn drop(&mut self) {
        // Release first so our own Arc no longer counts.
        self.guard.take();
        // Anyone waiting holds a clone, so a count of 1 means only the table is left.
        self.table
            .locks
            .remove_if(&self.key, |_, m| Arc::strong_count(m) == 1);
    }
}
