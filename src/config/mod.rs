//! Cache configuration types.
//!
//! [`CacheConfig`] is fixed for the lifetime of a cache instance.
//! [`RegistryConfig`] maps cache names to their configs so a
//! [`CacheRegistry`](crate::registry::CacheRegistry) can create named caches
//! with per-name policies. Both deserialize from JSON with defaults filled in
//! for missing fields.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CacheError, Result};

const DEFAULT_TTL_MS: u64 = 300_000;
const DEFAULT_MAX_SIZE: usize = 1000;
const DEFAULT_CLEANUP_INTERVAL_MS: u64 = 60_000;

/// Environment variables consulted by [`RegistryConfig::apply_env_overrides`].
pub const ENV_DEFAULT_TTL_MS: &str = "QUERYCACHE_DEFAULT_TTL_MS";
pub const ENV_MAX_SIZE: &str = "QUERYCACHE_MAX_SIZE";
pub const ENV_ENABLE_STATS: &str = "QUERYCACHE_ENABLE_STATS";
pub const ENV_CLEANUP_INTERVAL_MS: &str = "QUERYCACHE_CLEANUP_INTERVAL_MS";

/// Per-instance cache configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// TTL applied when `set` is called without an explicit TTL.
    pub default_ttl_ms: u64,
    /// Hard cap on simultaneously stored entries.
    pub max_size: usize,
    /// Whether hit/miss counters are maintained.
    pub enable_stats: bool,
    /// Period of the background expiry sweep. `0` disables the sweep.
    pub cleanup_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_ms: DEFAULT_TTL_MS,
            max_size: DEFAULT_MAX_SIZE,
            enable_stats: true,
            cleanup_interval_ms: DEFAULT_CLEANUP_INTERVAL_MS,
        }
    }
}

impl CacheConfig {
    /// Set the TTL applied when `set` is called without one.
    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl_ms = duration_to_ms(ttl);
        self
    }

    /// Set the entry limit; the least-recently-used entry goes first.
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Enable or disable hit/miss counting.
    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.enable_stats = enabled;
        self
    }

    /// Set the sweep period. `Duration::ZERO` disables the sweep.
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval_ms = duration_to_ms(interval);
        self
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    /// Sweep period, or `None` when the sweep is disabled.
    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_ms > 0).then(|| Duration::from_millis(self.cleanup_interval_ms))
    }

    /// Reject configurations that cannot produce a working cache.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(CacheError::InvalidConfig(
                "max_size must be at least 1".into(),
            ));
        }
        if self.default_ttl_ms == 0 {
            return Err(CacheError::InvalidConfig(
                "default_ttl_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn duration_to_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Named cache configurations for a registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Config used for names that have no entry in `caches`.
    pub fallback: CacheConfig,
    /// Per-name overrides.
    pub caches: HashMap<String, CacheConfig>,
}

impl RegistryConfig {
    /// Parse a registry config from a JSON document and validate every entry.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a registry config from a JSON file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    /// Config to use when creating a cache called `name`.
    pub fn config_for(&self, name: &str) -> CacheConfig {
        self.caches
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Validate the fallback and every named config; errors for named
    /// configs carry the cache name.
    pub fn validate(&self) -> Result<()> {
        self.fallback.validate()?;
        for (name, cfg) in &self.caches {
            cfg.validate().map_err(|e| match e {
                CacheError::InvalidConfig(msg) => {
                    CacheError::InvalidConfig(format!("cache '{}': {}", name, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Apply `QUERYCACHE_*` environment overrides to the fallback config.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = parse_override::<u64>(&lookup, ENV_DEFAULT_TTL_MS) {
            self.fallback.default_ttl_ms = v;
        }
        if let Some(v) = parse_override::<usize>(&lookup, ENV_MAX_SIZE) {
            self.fallback.max_size = v;
        }
        if let Some(v) = parse_override::<bool>(&lookup, ENV_ENABLE_STATS) {
            self.fallback.enable_stats = v;
        }
        if let Some(v) = parse_override::<u64>(&lookup, ENV_CLEANUP_INTERVAL_MS) {
            self.fallback.cleanup_interval_ms = v;
        }
    }
}

fn parse_override<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(key = key, value = %raw, "Ignoring unparseable cache config override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_config_defaults() {
        let cfg = CacheConfig::default();
        assert_eq!(cfg.default_ttl(), Duration::from_secs(300));
        assert_eq!(cfg.max_size, 1000);
        assert!(cfg.enable_stats);
        assert_eq!(cfg.cleanup_interval(), Some(Duration::from_secs(60)));
    }

    #[test]
    fn test_zero_cleanup_interval_disables_sweep() {
        let cfg = CacheConfig::default().with_cleanup_interval(Duration::ZERO);
        assert_eq!(cfg.cleanup_interval(), None);
    }

    #[test]
    fn test_builder_overrides() {
        let cfg = CacheConfig::default()
            .with_default_ttl(Duration::from_millis(100))
            .with_max_size(2)
            .with_stats(false);
        assert_eq!(cfg.default_ttl_ms, 100);
        assert_eq!(cfg.max_size, 2);
        assert!(!cfg.enable_stats);
    }

    #[test]
    fn test_validate_rejects_zero_max_size() {
        let cfg = CacheConfig::default().with_max_size(0);
        assert!(matches!(cfg.validate(), Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let cfg = CacheConfig::default().with_default_ttl(Duration::ZERO);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_cache_config_deserialize_partial() {
        let cfg: CacheConfig = serde_json::from_str(r#"{"max_size": 50}"#).unwrap();
        assert_eq!(cfg.max_size, 50);
        assert_eq!(cfg.default_ttl_ms, 300_000); // default
        assert!(cfg.enable_stats);
    }

    #[test]
    fn test_registry_config_from_json() {
        let json = r#"{
            "fallback": {"default_ttl_ms": 1000},
            "caches": {"attendance": {"max_size": 25, "cleanup_interval_ms": 0}}
        }"#;
        let cfg = RegistryConfig::from_json_str(json).unwrap();
        assert_eq!(cfg.config_for("attendance").max_size, 25);
        assert_eq!(cfg.config_for("attendance").cleanup_interval(), None);
        assert_eq!(cfg.config_for("unknown").default_ttl_ms, 1000);
        assert_eq!(cfg.config_for("unknown").max_size, 1000);
    }

    #[test]
    fn test_registry_config_rejects_invalid_entry() {
        let json = r#"{"caches": {"broken": {"max_size": 0}}}"#;
        let err = RegistryConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_registry_config_rejects_malformed_json() {
        let err = RegistryConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, CacheError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_path() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("caches.json");
        std::fs::write(&path, r#"{"caches": {"reports": {"max_size": 10}}}"#).unwrap();
        let cfg = RegistryConfig::load_from_path(&path).unwrap();
        assert_eq!(cfg.config_for("reports").max_size, 10);
    }

    #[test]
    fn test_load_from_missing_path_is_io_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let err = RegistryConfig::load_from_path(&tmp.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, CacheError::Io(_)));
    }

    #[test]
    fn test_env_overrides_apply_to_fallback() {
        let mut cfg = RegistryConfig::default();
        let vars: HashMap<&str, &str> = [
            (ENV_DEFAULT_TTL_MS, "5000"),
            (ENV_MAX_SIZE, "42"),
            (ENV_ENABLE_STATS, "false"),
            (ENV_CLEANUP_INTERVAL_MS, "not-a-number"),
        ]
        .into_iter()
        .collect();
        cfg.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.fallback.default_ttl_ms, 5000);
        assert_eq!(cfg.fallback.max_size, 42);
        assert!(!cfg.fallback.enable_stats);
        // unparseable value leaves the default in place
        assert_eq!(cfg.fallback.cleanup_interval_ms, 60_000);
    }
}
