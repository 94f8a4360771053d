//! Synchronous cache core: entries, expiry, LRU eviction and counters.
//!
//! Every method takes the current time explicitly so the owning
//! [`QueryCache`](super::QueryCache) and the background sweep share one clock
//! and tests can drive time directly.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use super::pattern::InvalidationPattern;

/// A single cached value with its usage metadata.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<V> {
    pub(crate) data: V,
    pub(crate) inserted_at: Instant,
    pub(crate) last_accessed_at: Instant,
    pub(crate) hit_count: u64,
    /// `None` when `inserted_at + ttl` overflows the clock; such entries never expire.
    pub(crate) expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    fn new(data: V, now: Instant, ttl: Duration) -> Self {
        Self {
            data,
            inserted_at: now,
            last_accessed_at: now,
            hit_count: 0,
            expires_at: now.checked_add(ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now > deadline)
    }
}

/// Read-only view of an entry's bookkeeping fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryMetadata {
    /// When the entry was written or last overwritten.
    pub inserted_at: Instant,
    /// Most recent successful read, or `inserted_at` if never read.
    pub last_accessed_at: Instant,
    /// Successful reads since insertion.
    pub hit_count: u64,
    /// Instant after which the entry is treated as absent.
    pub expires_at: Option<Instant>,
}

/// Hit/miss counters and occupancy for one cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    /// Cumulative hits since creation or the last `clear`.
    pub total_hits: u64,
    /// Cumulative misses since creation or the last `clear`.
    pub total_misses: u64,
    /// `total_hits / (total_hits + total_misses)`, or `0.0` before any lookup.
    pub hit_rate: f64,
    /// Physically stored entries, including expired ones not yet swept.
    pub total_entries: usize,
    /// Alias of `total_entries`.
    pub size: usize,
}

#[derive(Debug)]
pub(crate) struct CacheState<V> {
    entries: HashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
    max_size: usize,
    track_stats: bool,
    total_hits: u64,
    total_misses: u64,
    destroyed: bool,
}

impl<V: Clone> CacheState<V> {
    /// `max_size` is clamped to a minimum of 1 so eviction always makes room.
    pub(crate) fn new(default_ttl: Duration, max_size: usize, track_stats: bool) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
            max_size: max_size.max(1),
            track_stats,
            total_hits: 0,
            total_misses: 0,
            destroyed: false,
        }
    }

    pub(crate) fn get(&mut self, key: &str, now: Instant) -> Option<V> {
        self.lookup(key, now, true)
    }

    /// Live value for `key`, refreshing recency and counting a hit. A miss is
    /// only counted when `count_miss` is set; re-checks after waiting on
    /// another caller's computation pass `false` so one request is one miss.
    pub(crate) fn lookup(&mut self, key: &str, now: Instant, count_miss: bool) -> Option<V> {
        if self.destroyed {
            return None;
        }
        let expired = self.entries.get(key).map(|e| e.is_expired(now));
        match expired {
            Some(true) => {
                debug!(key = key, "Cache entry expired, removing");
                self.entries.remove(key);
            }
            Some(false) => {
                if let Some(entry) = self.entries.get_mut(key) {
                    entry.hit_count = entry.hit_count.saturating_add(1);
                    entry.last_accessed_at = now;
                    let data = entry.data.clone();
                    self.record_hit();
                    return Some(data);
                }
            }
            None => {}
        }
        if count_miss {
            self.record_miss();
        }
        None
    }

    pub(crate) fn set(&mut self, key: String, data: V, ttl: Option<Duration>, now: Instant) {
        if self.destroyed {
            debug!(key = %key, "Ignoring write to destroyed cache");
            return;
        }
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_size {
            self.evict_lru();
        }
        let ttl = ttl.unwrap_or(self.default_ttl);
        self.entries.insert(key, CacheEntry::new(data, now, ttl));
    }

    /// Liveness check with lazy expiry; leaves metadata and counters alone.
    pub(crate) fn has(&mut self, key: &str, now: Instant) -> bool {
        if self.destroyed {
            return false;
        }
        match self.entries.get(key).map(|e| e.is_expired(now)) {
            Some(true) => {
                debug!(key = key, "Cache entry expired, removing");
                self.entries.remove(key);
                false
            }
            Some(false) => true,
            None => false,
        }
    }

    pub(crate) fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.total_hits = 0;
        self.total_misses = 0;
    }

    /// Clear everything and refuse further writes.
    pub(crate) fn destroy(&mut self) {
        self.clear();
        self.destroyed = true;
    }

    pub(crate) fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn metadata(&self, key: &str) -> Option<EntryMetadata> {
        self.entries.get(key).map(|e| EntryMetadata {
            inserted_at: e.inserted_at,
            last_accessed_at: e.last_accessed_at,
            hit_count: e.hit_count,
            expires_at: e.expires_at,
        })
    }

    pub(crate) fn stats(&self) -> CacheStats {
        let requests = self.total_hits + self.total_misses;
        let hit_rate = if requests == 0 {
            0.0
        } else {
            self.total_hits as f64 / requests as f64
        };
        CacheStats {
            total_hits: self.total_hits,
            total_misses: self.total_misses,
            hit_rate,
            total_entries: self.entries.len(),
            size: self.entries.len(),
        }
    }

    /// Delete every key matching `pattern`; returns the number removed.
    pub(crate) fn invalidate(&mut self, pattern: &InvalidationPattern) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !pattern.matches(key));
        before - self.entries.len()
    }

    /// Drop every entry whose deadline has passed; returns the number removed.
    pub(crate) fn remove_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| !e.is_expired(now));
        before - self.entries.len()
    }

    fn evict_lru(&mut self) {
        if let Some(lru_key) = self
            .entries
            .iter()
            .min_by_key(|(_, e)| e.last_accessed_at)
            .map(|(k, _)| k.clone())
        {
            debug!(key = %lru_key, "Evicting LRU cache entry");
            self.entries.remove(&lru_key);
        }
    }

    fn record_hit(&mut self) {
        if self.track_stats {
            self.total_hits += 1;
        }
    }

    fn record_miss(&mut self) {
        if self.track_stats {
            self.total_misses += 1;
        }
    }
}
