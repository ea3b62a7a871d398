// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-assignment async mutual exclusion.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async locks keyed by formation assignment ID.
///
/// Entries are created on first use and dropped once nobody holds or waits
/// for them.
#[derive(Debug, Default, Clone)]
pub struct KeyedLocks {
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Guards held for the lifetime of one pair operation.
#[derive(Debug)]
pub struct KeyedGuard {
    locks: KeyedLocks,
    keys: Vec<String>,
    guards: Vec<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks every key, in sorted order so two callers locking overlapping
    /// sets cannot deadlock. Duplicates are locked once.
    pub async fn lock_all<I, S>(&self, keys: I) -> KeyedGuard
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let mut guards = Vec::with_capacity(keys.len());
        for key in &keys {
            let mutex = self
                .locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone();
            guards.push(mutex.lock_owned().await);
        }

        KeyedGuard {
            locks: self.clone(),
            keys,
            guards,
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        self.guards.clear();
        for key in &self.keys {
            // Only the map itself still references an idle mutex.
            self.locks
                .locks
                .remove_if(key, |_, mutex| Arc::strong_count(mutex) == 1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_all_excludes_overlapping_sets() {
        let locks = KeyedLocks::new();
        let guard = locks.lock_all(["b", "a"]).await;

        let other = locks.clone();
        let waiter = tokio::spawn(async move {
            let _guard = other.lock_all(["a", "c"]).await;
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_disjoint_sets_do_not_block() {
        let locks = KeyedLocks::new();
        let _first = locks.lock_all(["a"]).await;

        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock_all(["b"])).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn test_entries_are_released() {
        let locks = KeyedLocks::new();
        {
            let _guard = locks.lock_all(["a", "a", "b"]).await;
            assert_eq!(locks.len(), 2);
        }
        assert!(locks.is_empty());
    }
}
