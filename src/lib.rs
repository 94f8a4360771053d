//! QueryCache: in-memory memoization for expensive derived computations.
//!
//! - [`QueryCache`] is a bounded store with per-entry TTL, LRU eviction,
//!   hit/miss statistics, pattern invalidation, and async `get_or_set`.
//! - [`CacheRegistry`] hands out shared caches by name, with
//!   [`CachePreset`]s for common TTL/size policies.
//!
//! ```
//! use querycache::CacheRegistry;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let registry: CacheRegistry<f64> = CacheRegistry::new();
//! let risk = registry.short_term();
//! let score = risk
//!     .get_or_set("risk:student:42", || async { Ok::<_, std::io::Error>(0.82) }, None)
//!     .await
//!     .unwrap();
//! assert_eq!(score, 0.82);
//! assert!(risk.has("risk:student:42"));
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod registry;

pub use cache::{CacheStats, EntryMetadata, InvalidationPattern, QueryCache};
pub use config::{CacheConfig, RegistryConfig};
pub use error::{CacheError, Result};
pub use registry::{CachePreset, CacheRegistry};
