//! Per-key async mutex registry.
//!
//! Serializes operations that share a key (a natural key for merges, an item
//! id for transitions) while leaving unrelated keys fully concurrent. Guards
//! are plain `OwnedMutexGuard`s, so holding one across await points is fine.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of named locks. Cheap to clone and share.
#[derive(Clone, Default)]
pub struct KeyLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for `key`, creating it on first use.
    ///
    /// Two callers with the same key run strictly one after the other; the
    /// second sees every write the first made.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            // Entries nobody holds or waits on (the map owns the only Arc)
            // are dead; evict them here so the registry tracks in-flight
            // keys, not every key ever seen.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry(key.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        entry.lock_owned().await
    }
}
