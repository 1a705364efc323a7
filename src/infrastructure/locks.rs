//! Keyed async locks, created on first use

use std::collections::{BTreeSet, HashMap};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// One async mutex per key. Holders of a key's guard exclude every other
/// holder of the same key; different keys never contend.
#[derive(Debug)]
pub struct KeyedLocks<K> {
    locks: Mutex<HashMap<K, Arc<Mutex<()>>>>,
}

impl<K> Default for KeyedLocks<K> {
    fn default() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Clone + Eq + Hash + Ord + Debug> KeyedLocks<K> {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, key: &K) -> OwnedMutexGuard<()> {
        let handle = self.locks.lock().await.entry(key.clone()).or_default().clone();
        handle.lock_owned().await
    }

    /// Locks `keys` in ascending order, so overlapping sets never deadlock
    pub async fn acquire_all(&self, keys: &BTreeSet<K>) -> Vec<OwnedMutexGuard<()>> {
        let handles: Vec<Arc<Mutex<()>>> = {
            let mut locks = self.locks.lock().await;
            keys.iter()
                .map(|key| locks.entry(key.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }
        guards
    }
}
