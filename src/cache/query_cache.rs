//! Shared query cache handle.
//!
//! [`QueryCache`] memoizes expensive derived values (risk scores, forecasts,
//! report aggregates) under string keys. Entries expire after a TTL, the store
//! never holds more than `max_size` entries (least-recently-used entries are
//! evicted first), and hit/miss counters are kept per instance.
//!
//! All synchronous operations run under one internal lock and never await
//! while holding it. `get_or_set` awaits the caller's factory with the lock
//! released, so other operations interleave freely during a computation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;
use tracing::debug;

use super::pattern::InvalidationPattern;
use super::store::{CacheState, CacheStats, EntryMetadata};
use super::sweep::SweepTask;
use crate::config::CacheConfig;
use crate::error::Result;

/// Bounded, expiring key-value store for memoized computations.
///
/// # Example
/// ```
/// use querycache::{CacheConfig, QueryCache};
///
/// let cache: QueryCache<u32> = QueryCache::new(CacheConfig::default().with_max_size(2));
/// cache.set("attendance:42", 87);
/// assert_eq!(cache.get("attendance:42"), Some(87));
/// assert_eq!(cache.get("attendance:7"), None);
/// assert_eq!(cache.stats().total_hits, 1);
/// ```
#[derive(Debug)]
pub struct QueryCache<V> {
    state: Arc<Mutex<CacheState<V>>>,
    config: CacheConfig,
    sweep: Mutex<Option<SweepTask>>,
    in_flight: Mutex<HashMap<String, InFlight>>,
}

#[derive(Debug, Default)]
struct InFlight {
    gate: Arc<AsyncMutex<()>>,
    callers: usize,
}

impl<V> QueryCache<V>
where
    V: Clone + Send + 'static,
{
    /// Create a cache. When `cleanup_interval_ms > 0` and a tokio runtime is
    /// running, a background sweep is started on it.
    pub fn new(config: CacheConfig) -> Self {
        let state = Arc::new(Mutex::new(CacheState::new(
            config.default_ttl(),
            config.max_size,
            config.enable_stats,
        )));
        let sweep = config
            .cleanup_interval()
            .and_then(|period| SweepTask::spawn(Arc::downgrade(&state), period));
        Self {
            state,
            config,
            sweep: Mutex::new(sweep),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Configuration this cache was built with.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Look up a live value. Expired entries are removed and reported as a miss.
    pub fn get(&self, key: &str) -> Option<V> {
        self.lock().get(key, Instant::now())
    }

    /// Store a value with the default TTL, evicting the LRU entry if full.
    pub fn set(&self, key: impl Into<String>, value: V) {
        self.lock().set(key.into(), value, None, Instant::now());
    }

    /// Store a value that expires `ttl` from now instead of after the default TTL.
    pub fn set_with_ttl(&self, key: impl Into<String>, value: V, ttl: Duration) {
        self.lock().set(key.into(), value, Some(ttl), Instant::now());
    }

    /// `true` if `key` is live. Does not count as a hit or refresh recency.
    pub fn has(&self, key: &str) -> bool {
        self.lock().has(key, Instant::now())
    }

    /// Remove `key`; returns whether it was stored.
    pub fn delete(&self, key: &str) -> bool {
        self.lock().delete(key)
    }

    /// Remove every entry and reset hit/miss counters.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// All stored keys, including expired entries that have not been touched
    /// or swept yet. Use [`has`](Self::has) to test liveness.
    pub fn keys(&self) -> Vec<String> {
        self.lock().keys()
    }

    /// Physical entry count (may include expired, not-yet-swept entries).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of hit/miss counters and occupancy.
    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    /// Bookkeeping for a stored entry without counting a hit.
    pub fn entry_metadata(&self, key: &str) -> Option<EntryMetadata> {
        self.lock().metadata(key)
    }

    /// Delete every key matching `pattern` (substring or compiled regex).
    pub fn invalidate(&self, pattern: impl Into<InvalidationPattern>) -> usize {
        let pattern = pattern.into();
        let removed = self.lock().invalidate(&pattern);
        debug!(pattern = ?pattern, removed = removed, "Invalidated cache entries");
        removed
    }

    /// Delete every key containing `prefix`.
    ///
    /// Matches anywhere in the key, same as a substring [`invalidate`](Self::invalidate).
    pub fn invalidate_prefix(&self, prefix: &str) -> usize {
        self.invalidate(prefix)
    }

    /// Compile `expr` and delete every key it matches.
    pub fn invalidate_regex(&self, expr: &str) -> Result<usize> {
        let re = regex::Regex::new(expr)?;
        Ok(self.invalidate(re))
    }

    /// Pre-populate keys that are not already live. Live entries keep their
    /// value, TTL and metadata.
    ///
    /// The iterator is drained before the store is locked, so it may read
    /// from this cache.
    pub fn warm<K, I>(&self, entries: I)
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let entries: Vec<(String, V)> = entries
            .into_iter()
            .map(|(key, value)| (key.into(), value))
            .collect();
        let now = Instant::now();
        let mut state = self.lock();
        let mut written = 0usize;
        for (key, value) in entries {
            if !state.has(&key, now) {
                state.set(key, value, None, now);
                written += 1;
            }
        }
        debug!(written = written, "Warmed cache");
    }

    /// Return the cached value, or compute it with `factory` and store it.
    ///
    /// Concurrent callers that miss on the same key each run their own
    /// factory; the last one to finish wins the slot. A factory error is
    /// returned unchanged and nothing is stored.
    pub async fn get_or_set<F, Fut, E>(
        &self,
        key: &str,
        factory: F,
        ttl: Option<Duration>,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }
        let value = factory().await?;
        self.lock().set(key.to_string(), value.clone(), ttl, Instant::now());
        Ok(value)
    }

    /// Like [`get_or_set`](Self::get_or_set), but concurrent misses on the same
    /// key run one factory at a time. Callers that waited re-check the cache
    /// and return the stored value; if the running factory failed, the next
    /// waiter runs its own.
    pub async fn get_or_set_coalesced<F, Fut, E>(
        &self,
        key: &str,
        factory: F,
        ttl: Option<Duration>,
    ) -> std::result::Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<V, E>>,
    {
        if let Some(value) = self.get(key) {
            return Ok(value);
        }

        let flight = self.join_flight(key);
        let _turn = flight.gate.lock().await;
        if let Some(value) = self.lock().lookup(key, Instant::now(), false) {
            return Ok(value);
        }
        let value = factory().await?;
        self.lock().set(key.to_string(), value.clone(), ttl, Instant::now());
        Ok(value)
    }

    /// Synchronous variant of `get_or_set` for cheap, infallible producers.
    pub fn get_or_set_with<F>(&self, key: &str, factory: F, ttl: Option<Duration>) -> V
    where
        F: FnOnce() -> V,
    {
        if let Some(value) = self.get(key) {
            return value;
        }
        let value = factory();
        self.lock().set(key.to_string(), value.clone(), ttl, Instant::now());
        value
    }

    /// Stop the background sweep. Lazy expiry keeps working.
    pub fn stop_cleanup(&self) {
        if let Some(task) = self
            .sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.stop();
            debug!("Stopped cache sweep");
        }
    }

    /// Whether a background sweep task is currently scheduled.
    pub fn is_sweeping(&self) -> bool {
        self.sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(SweepTask::is_running)
    }

    /// Stop the sweep and clear the store. Afterwards the cache behaves as an
    /// always-empty store: writes are ignored and reads miss.
    pub fn destroy(&self) {
        self.stop_cleanup();
        self.lock().destroy();
        debug!("Destroyed cache");
    }

    /// Whether [`destroy`](Self::destroy) has been called.
    pub fn is_destroyed(&self) -> bool {
        self.lock().is_destroyed()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState<V>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn join_flight<'a>(&'a self, key: &'a str) -> FlightSlot<'a> {
        let mut flights = self
            .in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let flight = flights.entry(key.to_string()).or_default();
        flight.callers += 1;
        FlightSlot {
            flights: &self.in_flight,
            key,
            gate: Arc::clone(&flight.gate),
        }
    }
}

/// Registration of one caller in the per-key in-flight table. Dropping it
/// (on success, error or cancellation) removes the key once no caller is left.
struct FlightSlot<'a> {
    flights: &'a Mutex<HashMap<String, InFlight>>,
    key: &'a str,
    gate: Arc<AsyncMutex<()>>,
}

impl Drop for FlightSlot<'_> {
    fn drop(&mut self) {
        let mut flights = self.flights.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(flight) = flights.get_mut(self.key) {
            flight.callers = flight.callers.saturating_sub(1);
            if flight.callers == 0 {
                flights.remove(self.key);
            }
        }
    }
}
