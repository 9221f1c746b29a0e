//! Duplicate suppression across poll cycles.
//!
//! The feed's `since` boundary is coarser than individual events, so events
//! at the edge of one cycle can come back in the next. The cache remembers
//! which (subscriber, event) pairs were already delivered for a bounded
//! retention window and a bounded number of entries.
//!
//! Entries are spread over independently locked LRU shards so concurrent
//! subscriber cycles rarely contend on the same lock.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::types::SubscriberId;

/// Configuration for the dedup cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// How long a delivered event is remembered, in seconds. Must exceed the
    /// longest expected gap between two polls of a subscriber plus feed
    /// clock skew.
    pub retention_secs: u64,
    /// Maximum number of remembered entries across all subscribers.
    pub capacity: usize,
    /// Number of independently locked shards.
    pub shards: usize,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            retention_secs: 15 * 60,
            capacity: 100_000,
            shards: 16,
        }
    }
}

impl DedupConfig {
    /// Retention as a duration.
    pub fn retention(&self) -> Duration {
        Duration::seconds(self.retention_secs.min(i64::MAX as u64) as i64)
    }
}

type Key = (SubscriberId, String);
type Shard = LruCache<Key, DateTime<Utc>>;

/// Bounded, time-limited memory of delivered events.
pub struct DedupCache {
    shards: Vec<Mutex<Shard>>,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl DedupCache {
    /// Create a cache using the system clock.
    pub fn new(config: &DedupConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a cache with a custom time source.
    pub fn with_clock(config: &DedupConfig, clock: Arc<dyn Clock>) -> Self {
        let shard_count = config.shards.max(1);
        let per_shard = config.capacity.max(1).div_ceil(shard_count);
        let per_shard = NonZeroUsize::new(per_shard).unwrap_or(NonZeroUsize::MIN);

        Self {
            shards: (0..shard_count)
                .map(|_| Mutex::new(LruCache::new(per_shard)))
                .collect(),
            retention: config.retention(),
            clock,
        }
    }

    fn shard(&self, key: &Key) -> MutexGuard<'_, Shard> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        let idx = (hasher.finish() % self.shards.len() as u64) as usize;
        // a panic while holding the lock cannot leave an entry half-written
        self.shards[idx].lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Mark the pair as seen and report whether it already was.
    ///
    /// Returns `false` the first time a pair is seen (or once its entry has
    /// expired or been evicted) and `true` on every later call within the
    /// retention window. Each call refreshes the entry.
    pub fn seen(&self, subscriber_id: SubscriberId, event_id: &str) -> bool {
        let now = self.clock.now();
        let key = (subscriber_id, event_id.to_string());
        let mut shard = self.shard(&key);

        let fresh = shard
            .peek(&key)
            .is_some_and(|last_seen| now - *last_seen < self.retention);
        shard.put(key, now);
        fresh
    }

    /// Whether the pair is remembered, without marking it.
    pub fn contains(&self, subscriber_id: SubscriberId, event_id: &str) -> bool {
        let now = self.clock.now();
        let key = (subscriber_id, event_id.to_string());
        self.shard(&key)
            .peek(&key)
            .is_some_and(|last_seen| now - *last_seen < self.retention)
    }

    /// Forget a pair, so the next `seen` returns `false`.
    pub fn forget(&self, subscriber_id: SubscriberId, event_id: &str) {
        let key = (subscriber_id, event_id.to_string());
        self.shard(&key).pop(&key);
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        for shard in &self.shards {
            let mut shard = shard.lock().unwrap_or_else(|e| e.into_inner());
            let expired: Vec<Key> = shard
                .iter()
                .filter(|(_, last_seen)| now - **last_seen >= self.retention)
                .map(|(k, _)| k.clone())
                .collect();
            for key in expired {
                shard.pop(&key);
                removed += 1;
            }
        }
        removed
    }

    /// Number of entries, including expired ones not yet purged.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).len())
            .sum()
    }

    /// True when the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total entry capacity.
    pub fn capacity(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(|e| e.into_inner()).cap().get())
            .sum()
    }
}
