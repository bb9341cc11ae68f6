//! Response storage with per-entry expiry.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use bytes::Bytes;
use lru::LruCache;
use tracing::warn;

use super::config::CacheConfig;
use super::keys::L1Key;

/// A rendered response captured for replay.
#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub stored_at: Instant,
}

impl CachedResponse {
    pub fn is_fresh(&self, ttl: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.stored_at) < ttl
    }
}

/// HTTP response cache with LRU eviction and a fixed time-to-live.
pub struct L1Store {
    responses: Mutex<LruCache<L1Key, CachedResponse>>,
    ttl: Duration,
}

impl L1Store {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            responses: Mutex::new(LruCache::new(config.response_limit_non_zero())),
            ttl: config.index_ttl,
        }
    }

    /// Lookups reorder the LRU list, so every access takes the lock exclusively.
    /// Entries stay valid after a panic while the lock was held.
    fn responses(&self, op: &'static str) -> MutexGuard<'_, LruCache<L1Key, CachedResponse>> {
        self.responses.lock().unwrap_or_else(|poisoned| {
            warn!(op, result = "poisoned_recovered", "recovered poisoned response cache");
            poisoned.into_inner()
        })
    }

    /// Return the entry for `key` if it is younger than the TTL; stale entries are dropped.
    pub fn get(&self, key: &L1Key, now: Instant) -> Option<CachedResponse> {
        let mut responses = self.responses("get");
        let fresh = responses.get(key)?.is_fresh(self.ttl, now);
        if fresh {
            responses.get(key).cloned()
        } else {
            responses.pop(key);
            None
        }
    }

    /// Store a response, returning the key evicted to make room, if any.
    pub fn set(&self, key: L1Key, response: CachedResponse) -> Option<L1Key> {
        self.responses("set")
            .push(key.clone(), response)
            .and_then(|(evicted_key, _)| (evicted_key != key).then_some(evicted_key))
    }

    pub fn len(&self) -> usize {
        self.responses("len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
