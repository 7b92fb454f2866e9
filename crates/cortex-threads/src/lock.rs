//! Lock table: a map from thread id to a reader/writer lock, so unrelated
//! threads never block each other while the map itself stays cheap to read
//! and grow under concurrent access (`DashMap` shards this internally,
//! standing in for the meta-mutex spec.md describes around the map).

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

#[derive(Default)]
pub struct ThreadLockTable {
    locks: DashMap<String, Arc<RwLock<()>>>,
}

impl ThreadLockTable {
    pub fn new() -> Self {
        Self { locks: DashMap::new() }
    }

    fn grab(&self, thread_id: &str) -> Arc<RwLock<()>> {
        self.locks.entry(thread_id.to_string()).or_insert_with(|| Arc::new(RwLock::new(()))).clone()
    }

    pub async fn read(&self, thread_id: &str) -> OwnedRwLockReadGuard<()> {
        self.grab(thread_id).read_owned().await
    }

    pub async fn write(&self, thread_id: &str) -> OwnedRwLockWriteGuard<()> {
        self.grab(thread_id).write_owned().await
    }

    /// Drops the map entry for `thread_id`. Only safe to call while holding
    /// that thread's write guard, which `delete` does.
    pub fn forget(&self, thread_id: &str) {
        self.locks.remove(thread_id);
    }
}
