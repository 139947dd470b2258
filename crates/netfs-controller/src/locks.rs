//! Per-name mutual exclusion shared by both reconcilers
//!
//! kube-runtime serializes reconciliations per object within one
//! controller. The lifecycle and endpoint-sync controllers watch different
//! kinds that share a name, so they take this lock to never touch the same
//! NetworkFilesystem concurrently.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async lock keyed by resource name
#[derive(Default)]
pub struct NameLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl NameLocks {
    /// Create an empty lock table
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `name`.
    ///
    /// Access is released when the returned guard is dropped. Different
    /// names never contend.
    pub async fn lock(&self, name: &str) -> NameGuard<'_> {
        let lock = self.locks.entry(name.to_string()).or_default().clone();
        let guard = lock.lock_owned().await;
        NameGuard {
            locks: self,
            name: name.to_string(),
            guard: Some(guard),
        }
    }

    /// Number of names currently tracked
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no names are tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exclusive access to one name; its table entry is dropped with the last
/// holder or waiter.
pub struct NameGuard<'a> {
    locks: &'a NameLocks,
    name: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for NameGuard<'_> {
    fn drop(&mut self) {
        // release first so the table holds the only reference when idle
        self.guard.take();
        self.locks
            .locks
            .remove_if(&self.name, |_, lock| Arc::strong_count(lock) == 1);
    }
}
