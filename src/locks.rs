use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Per-key async mutex registry.
///
/// Stats records and temp-allow grants are read-modify-write over a keyed
/// record; two tabs flushing the same domain at nearly the same time would
/// otherwise each read a stale snapshot and last-write-wins. Holding the
/// domain's lock across the read and the dependent write gives
/// at-most-one-in-flight-update per key without serializing unrelated
/// domains.
#[derive(Clone, Default)]
pub(crate) struct KeyLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks `key`, creating its mutex on first use. Entries are never
    /// evicted; the map is bounded by the number of distinct domains seen.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        let entry = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry(key.to_string()).or_default())
        };
        entry.lock_owned().await
    }
}
