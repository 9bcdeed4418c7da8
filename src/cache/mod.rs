//! Discovery view cache.
//!
//! Entries are keyed by request and tagged with the snapshot version they
//! were computed from. An entry is served only while both hold: the
//! snapshot it came from is still current, and it is younger than the TTL.
//! A recompute therefore invalidates every entry at once, and a stale read
//! can never be older than the last recompute.
//!
//! Every insert sweeps out expired and superseded entries, and the map never
//! holds more than `max_entries`; past that the oldest entry goes first.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

struct Entry<V> {
    version: u64,
    inserted_at: Instant,
    value: V,
}

/// Hit/miss counters and current size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

/// Snapshot-version and TTL bounded memoization.
pub struct DiscoveryCache<V> {
    ttl: Duration,
    max_entries: usize,
    entries: RwLock<HashMap<String, Entry<V>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone> DiscoveryCache<V> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries: max_entries.max(1),
            entries: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value for `key` if it was computed from `version` within the TTL.
    pub fn get(&self, key: &str, version: u64) -> Option<V> {
        let found = {
            let entries = match self.entries.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            entries
                .get(key)
                .filter(|e| e.version == version && e.inserted_at.elapsed() < self.ttl)
                .map(|e| e.value.clone())
        };

        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(key, version, "Discovery cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(key, version, "Discovery cache miss");
        }
        found
    }

    /// Upsert; an older entry for the same key is replaced.
    pub fn insert(&self, key: impl Into<String>, version: u64, value: V) {
        let key = key.into();
        let mut entries = match self.entries.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let before = entries.len();
        let now = Instant::now();
        let ttl = self.ttl;
        entries.retain(|_, e| {
            e.version >= version && now.saturating_duration_since(e.inserted_at) < ttl
        });
        while entries.len() >= self.max_entries && !entries.contains_key(&key) {
            let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, e)| e.inserted_at)
                .map(|(k, _)| k.clone())
            else {
                break;
            };
            entries.remove(&oldest);
        }
        let evicted = before.saturating_sub(entries.len());
        if evicted > 0 {
            debug!(evicted, "Discovery cache swept");
        }

        entries.insert(
            key,
            Entry {
                version,
                inserted_at: now,
                value,
            },
        );
    }

    pub fn stats(&self) -> CacheStats {
        let entries = match self.entries.read() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        };
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = DiscoveryCache::new(Duration::from_secs(60), 16);
        cache.insert("impact", 1, 42u32);
        assert_eq!(cache.get("impact", 1), Some(42));

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(cache.get("impact", 1), None);
    }

    #[tokio::test]
    async fn test_new_snapshot_version_misses() {
        let cache = DiscoveryCache::new(Duration::from_secs(60), 16);
        cache.insert("rising", 1, "old".to_string());
        assert_eq!(cache.get("rising", 2), None);

        cache.insert("rising", 2, "new".to_string());
        assert_eq!(cache.get("rising", 2).as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_stats_count_hits_and_misses() {
        let cache = DiscoveryCache::new(Duration::from_secs(60), 16);
        cache.insert("a", 1, 1u8);
        cache.insert("b", 1, 2u8);
        cache.get("a", 1);
        cache.get("missing", 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 2);

    }

    #[tokio::test(start_paused = true)]
    async fn test_insert_sweeps_expired_entries() {
        let cache = DiscoveryCache::new(Duration::from_secs(300), 10_000);
        for i in 0..1_000 {
            cache.insert(format!("impact:{}", i), 1, i);
        }
        assert_eq!(cache.stats().entries, 1_000);

        tokio::time::advance(Duration::from_secs(3_600)).await;
        cache.insert("impact:fresh", 1, 0);
        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.get("impact:fresh", 1), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entry_count_is_capped() {
        let cache = DiscoveryCache::new(Duration::from_secs(300), 3);
        for key in ["a", "b", "c"] {
            cache.insert(key, 1, key.to_string());
            tokio::time::advance(Duration::from_secs(1)).await;
        }
        cache.insert("d", 1, "d".to_string());

        assert_eq!(cache.stats().entries, 3);
        assert_eq!(cache.get("a", 1), None);
        assert_eq!(cache.get("d", 1).as_deref(), Some("d"));

        // replacing an existing key evicts nothing
        cache.insert("b", 1, "b2".to_string());
        assert_eq!(cache.stats().entries, 3);
        assert_eq!(cache.get("c", 1).as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn test_insert_drops_superseded_versions() {
        let cache = DiscoveryCache::new(Duration::from_secs(60), 16);
        cache.insert("impact", 1, 1u8);
        cache.insert("rising", 2, 2u8);
        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.get("rising", 2), Some(2));
    }
}
