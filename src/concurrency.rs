//! Per-key mutual exclusion.
//!
//! Locks live in a sharded map so unrelated keys never contend on a single
//! global lock. Entries are dropped again once no holder or waiter remains.

use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of async mutexes keyed by `K`
#[derive(Debug)]
pub struct KeyLockManager<K>
where
    K: Eq + Hash + Clone,
{
    locks: DashMap<K, Arc<Mutex<()>>>,
}

impl<K> Default for KeyLockManager<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }
}

impl<K> KeyLockManager<K>
where
    K: Eq + Hash + Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &K) -> KeyGuard<'_, K> {
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = mutex.lock_owned().await;
        KeyGuard {
            manager: self,
            key: key.clone(),
            guard: Some(guard),
        }
    }

    /// True while some task holds or waits for `key`.
    pub fn is_contended(&self, key: &K) -> bool {
        self.locks.contains_key(key)
    }

    /// Number of keys with a live lock entry
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    fn release(&self, key: &K) {
        // Only the map itself still references the mutex: nobody is waiting.
        self.locks
            .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}

/// Held lock on one key. Dropping it releases the key.
pub struct KeyGuard<'a, K>
where
    K: Eq + Hash + Clone,
{
    manager: &'a KeyLockManager<K>,
    key: K,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K> Drop for KeyGuard<'_, K>
where
    K: Eq + Hash + Clone,
{
    fn drop(&mut self) {
        drop(self.guard.take());
        self.manager.release(&self.key);
    }
}
