//! Owner-keyed async lock table.
//!
//! Admission and settlement for a single owner must be linearizable; locking
//! per owner keeps unrelated owners fully concurrent. Lock entries are never
//! removed: the set of owners is small relative to the data they guard, and
//! eviction would race with `lock_owned` handles.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-owner mutual exclusion for balance-affecting operations.
#[derive(Default)]
pub struct OwnerLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl OwnerLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the owner's lock, creating it on first use.
    pub async fn acquire(&self, owner_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(owner_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_owner_serializes() {
        let locks = Arc::new(OwnerLocks::new());
        let guard = locks.acquire("owner-1").await;

        let locks2 = locks.clone();
        let contender = tokio::spawn(async move { locks2.acquire("owner-1").await });
        // Different owner proceeds while owner-1 is held.
        let _other = locks.acquire("owner-2").await;
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.unwrap();
    }
}
