//! Named cache registry.
//!
//! Services that want to share a cache look it up by name instead of passing
//! handles around. The registry is an ordinary value: construct one per
//! application (or per test) and hand clones of it to the services that need
//! shared caches. Clones share the same set of instances.
//!
//! The config passed to [`CacheRegistry::get_instance`] only takes effect on
//! the call that creates the named cache. Later calls with a different config
//! get the existing instance unchanged.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tracing::info;

use crate::cache::{CacheStats, QueryCache};
use crate::config::{CacheConfig, RegistryConfig};

/// Ready-made cache policies for typical call sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CachePreset {
    /// 5-minute TTL, 500 entries.
    Default,
    /// 1-minute TTL, 200 entries.
    ShortTerm,
    /// 15-minute TTL, 1000 entries.
    LongTerm,
}

impl CachePreset {
    pub const ALL: [CachePreset; 3] = [
        CachePreset::Default,
        CachePreset::ShortTerm,
        CachePreset::LongTerm,
    ];

    /// Registry name used for this preset.
    pub fn name(&self) -> &'static str {
        match self {
            CachePreset::Default => "default",
            CachePreset::ShortTerm => "short-term",
            CachePreset::LongTerm => "long-term",
        }
    }

    /// TTL/size policy for this preset, with the default sweep interval.
    pub fn config(&self) -> CacheConfig {
        let (ttl_secs, max_size) = match self {
            CachePreset::Default => (5 * 60, 500),
            CachePreset::ShortTerm => (60, 200),
            CachePreset::LongTerm => (15 * 60, 1000),
        };
        CacheConfig::default()
            .with_default_ttl(Duration::from_secs(ttl_secs))
            .with_max_size(max_size)
    }
}

/// Directory of named [`QueryCache`] instances, created lazily on first lookup.
pub struct CacheRegistry<V> {
    instances: Arc<Mutex<HashMap<String, Arc<QueryCache<V>>>>>,
    config: Arc<RegistryConfig>,
}

impl<V> Clone for CacheRegistry<V> {
    fn clone(&self) -> Self {
        Self {
            instances: Arc::clone(&self.instances),
            config: Arc::clone(&self.config),
        }
    }
}

impl<V> CacheRegistry<V>
where
    V: Clone + Send + 'static,
{
    /// Registry whose new caches use [`CacheConfig::default`] unless a config
    /// is passed to `get_instance`.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Registry whose new caches take their config from `config` by name.
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            instances: Arc::new(Mutex::new(HashMap::new())),
            config: Arc::new(config),
        }
    }

    /// Return the cache registered as `name`, creating it on first use.
    ///
    /// `config` is only used when the cache is created; when `None`, the
    /// registry config for `name` applies.
    pub fn get_instance(&self, name: &str, config: Option<CacheConfig>) -> Arc<QueryCache<V>> {
        let mut instances = self.lock();
        if let Some(existing) = instances.get(name) {
            return Arc::clone(existing);
        }
        let config = config.unwrap_or_else(|| self.config.config_for(name));
        info!(
            cache = name,
            default_ttl_ms = config.default_ttl_ms,
            max_size = config.max_size,
            "Creating cache instance"
        );
        let cache = Arc::new(QueryCache::new(config));
        instances.insert(name.to_string(), Arc::clone(&cache));
        cache
    }

    /// Return the cache for a preset, created with the preset's config.
    pub fn preset(&self, preset: CachePreset) -> Arc<QueryCache<V>> {
        self.get_instance(preset.name(), Some(preset.config()))
    }

    pub fn default_cache(&self) -> Arc<QueryCache<V>> {
        self.preset(CachePreset::Default)
    }

    pub fn short_term(&self) -> Arc<QueryCache<V>> {
        self.preset(CachePreset::ShortTerm)
    }

    pub fn long_term(&self) -> Arc<QueryCache<V>> {
        self.preset(CachePreset::LongTerm)
    }

    /// Destroy every registered cache and forget them. Handles still held by
    /// callers become inert; later lookups create fresh instances.
    pub fn clear_all(&self) {
        let drained: Vec<(String, Arc<QueryCache<V>>)> = self.lock().drain().collect();
        for (_, cache) in &drained {
            cache.destroy();
        }
        info!(destroyed = drained.len(), "Cleared cache registry");
    }

    /// Stats for one named cache, or `None` if it was never created.
    pub fn get_stats(&self, name: &str) -> Option<CacheStats> {
        let cache = self.lock().get(name).cloned()?;
        Some(cache.stats())
    }

    /// Stats snapshot for every registered cache.
    pub fn get_all_stats(&self) -> HashMap<String, CacheStats> {
        let caches: Vec<(String, Arc<QueryCache<V>>)> = self
            .lock()
            .iter()
            .map(|(name, cache)| (name.clone(), Arc::clone(cache)))
            .collect();
        caches
            .into_iter()
            .map(|(name, cache)| (name, cache.stats()))
            .collect()
    }

    /// Names of all registered caches.
    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Arc<QueryCache<V>>>> {
        self.instances
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> Default for CacheRegistry<V>
where
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> CacheRegistry<i32> {
        CacheRegistry::new()
    }

    #[test]
    fn test_get_instance_returns_same_cache() {
        let reg = registry();
        let a = reg.get_instance("x", None);
        let b = reg.get_instance("x", None);
        assert!(Arc::ptr_eq(&a, &b));
        a.set("k", 1);
        assert_eq!(b.get("k"), Some(1));
    }

    #[test]
    fn test_distinct_names_get_distinct_caches() {
        let reg = registry();
        let a = reg.get_instance("a", None);
        let b = reg.get_instance("b", None);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_config_only_applies_on_creation() {
        let reg = registry();
        let first = reg.get_instance("x", Some(CacheConfig::default().with_max_size(3)));
        let second = reg.get_instance("x", Some(CacheConfig::default().with_max_size(99)));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.config().max_size, 3);
    }

    #[test]
    fn test_clear_all_destroys_and_recreates() {
        let reg = registry();
        let old = reg.get_instance("x", None);
        old.set("k", 1);
        reg.clear_all();
        assert!(old.is_destroyed());
        assert!(reg.names().is_empty());

        let fresh = reg.get_instance("x", None);
        assert!(!Arc::ptr_eq(&old, &fresh));
        assert!(!fresh.is_destroyed());
        assert_eq!(fresh.get("k"), None);
    }

    #[test]
    fn test_clones_share_instances() {
        let reg = registry();
        let clone = reg.clone();
        let a = reg.get_instance("shared", None);
        let b = clone.get_instance("shared", None);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_get_stats_unknown_name() {
        let reg = registry();
        assert!(reg.get_stats("missing").is_none());
    }

    #[test]
    fn test_get_stats_and_all_stats() {
        let reg = registry();
        let a = reg.get_instance("a", None);
        let _b = reg.get_instance("b", None);
        a.set("k", 1);
        let _ = a.get("k");
        let _ = a.get("nope");

        let stats = reg.get_stats("a").unwrap();
        assert_eq!(stats.total_hits, 1);
        assert_eq!(stats.total_misses, 1);
        assert_eq!(stats.hit_rate, 0.5);

        let all = reg.get_all_stats();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"].size, 1);
        assert_eq!(all["b"].size, 0);
    }

    #[test]
    fn test_presets() {
        let reg = registry();
        let default = reg.default_cache();
        let short = reg.short_term();
        let long = reg.long_term();

        assert_eq!(default.config().default_ttl(), Duration::from_secs(300));
        assert_eq!(default.config().max_size, 500);
        assert_eq!(short.config().default_ttl(), Duration::from_secs(60));
        assert_eq!(short.config().max_size, 200);
        assert_eq!(long.config().default_ttl(), Duration::from_secs(900));
        assert_eq!(long.config().max_size, 1000);

        assert!(Arc::ptr_eq(&short, &reg.get_instance("short-term", None)));
        let mut names = reg.names();
        names.sort();
        assert_eq!(names, vec!["default", "long-term", "short-term"]);
    }

    #[test]
    fn test_preset_names_unique() {
        let mut names: Vec<_> = CachePreset::ALL.iter().map(|p| p.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), CachePreset::ALL.len());
    }

    #[test]
    fn test_registry_config_used_for_new_names() {
        let json = r#"{"caches": {"attendance-risk": {"max_size": 7, "cleanup_interval_ms": 0}}}"#;
        let reg: CacheRegistry<i32> =
            CacheRegistry::with_config(RegistryConfig::from_json_str(json).unwrap());
        let cache = reg.get_instance("attendance-risk", None);
        assert_eq!(cache.config().max_size, 7);
        assert!(!cache.is_sweeping());
        let other = reg.get_instance("inventory", None);
        assert_eq!(other.config().max_size, 1000);
    }

    #[tokio::test]
    async fn test_clear_all_stops_sweeps() {
        let reg = registry();
        let cache = reg.get_instance("swept", None);
        assert!(cache.is_sweeping());
        reg.clear_all();
        assert!(!cache.is_sweeping());
    }
}
