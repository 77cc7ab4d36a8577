//! Per-key async locks.
//!
//! Serializes work for one key while leaving other keys independent. Idle
//! entries are dropped once the map grows past a threshold.

use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Map size above which idle locks are pruned on acquire.
const DEFAULT_PRUNE_ABOVE: usize = 4_096;

/// A lock per key.
#[derive(Debug)]
pub struct KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    locks: DashMap<K, Arc<Mutex<()>>>,
    prune_above: usize,
}

impl<K> Default for KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedLocks<K>
where
    K: Eq + Hash + Clone,
{
    /// Empty lock map.
    pub fn new() -> Self {
        Self::with_prune_threshold(DEFAULT_PRUNE_ABOVE)
    }

    /// Empty lock map pruning idle entries above `prune_above` keys.
    pub fn with_prune_threshold(prune_above: usize) -> Self {
        Self {
            locks: DashMap::new(),
            prune_above,
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &K) -> OwnedMutexGuard<()> {
        if self.locks.len() > self.prune_above {
            self.prune_idle();
        }
        let mutex = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        mutex.lock_owned().await
    }

    /// Drop locks nobody holds or waits on.
    pub fn prune_idle(&self) {
        self.locks.retain(|_, m| Arc::strong_count(m) > 1);
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
