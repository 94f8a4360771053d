//! Error types for QueryCache.
//!
//! Cache misses are never errors: lookups return `Option`. Errors only come
//! from configuration handling and from invalidation patterns that fail to
//! compile. Factory errors passed through `get_or_set` belong to the caller
//! and are returned untouched.

use thiserror::Error;

/// Errors produced by configuration and pattern handling.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A configuration value is out of range (e.g. `max_size = 0`).
    #[error("Invalid cache config: {0}")]
    InvalidConfig(String),

    /// A regular expression passed to `invalidate_regex` did not compile.
    #[error("Invalid invalidation pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    /// A registry configuration document could not be parsed.
    #[error("Failed to parse cache config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// A registry configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_display() {
        let err = CacheError::InvalidConfig("max_size must be at least 1".into());
        assert_eq!(
            err.to_string(),
            "Invalid cache config: max_size must be at least 1"
        );
    }

    #[test]
    fn test_regex_error_converts() {
        let err: CacheError = regex::Regex::new("(unclosed").unwrap_err().into();
        assert!(matches!(err, CacheError::InvalidPattern(_)));
        assert!(err.to_string().starts_with("Invalid invalidation pattern"));
    }

    #[test]
    fn test_json_error_converts() {
        let err: CacheError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, CacheError::ConfigParse(_)));
    }
}
