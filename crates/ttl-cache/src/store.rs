use crate::entry::CacheEntry;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::Instant;

type EntryMap = HashMap<String, Arc<CacheEntry>, ahash::RandomState>;

/// Thread-safe key → response store with time-based expiry.
///
/// One map behind one `RwLock`:
///
/// - **get**: read lock. Any number of readers proceed together.
/// - **set** / **purge_expired**: write lock. Excludes readers and other
///   writers for the duration of the mutation, so mutations are linearizable.
///
/// `get` does not look at `expires_at`. An expired entry stays visible until
/// the next purge removes it; callers that want read-time freshness check
/// [`CacheEntry::is_live`] themselves.
///
/// There is no size bound. Growth is limited only by the sweep.
pub struct CacheStore {
    map: RwLock<EntryMap>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::with_hasher(ahash::RandomState::new())),
        }
    }

    /// Look up a key. Returns a shared read-only view of the entry.
    pub fn get(&self, key: &str) -> Option<Arc<CacheEntry>> {
        self.map.read().get(key).cloned()
    }

    /// Insert or replace the entry for `key`. No merge with the old value.
    pub fn set(&self, key: String, entry: CacheEntry) {
        self.map.write().insert(key, Arc::new(entry));
    }

    /// Remove every entry whose expiry is at or before `now`.
    /// Returns the number of entries removed.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut map = self.map.write();
        let before = map.len();
        map.retain(|key, entry| {
            let keep = entry.is_live(now);
            if !keep {
                tracing::debug!(
                    key = %key,
                    ttl_ms = entry.ttl().as_millis() as u64,
                    "purging expired entry"
                );
            }
            keep
        });
        before - map.len()
    }

    /// Number of entries, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new()
    }
}
