//! In-memory query caching with TTL expiry, LRU eviction, and a background sweep.

pub mod pattern;
pub mod query_cache;
mod store;
mod sweep;

pub use pattern::InvalidationPattern;
pub use query_cache::QueryCache;
pub use store::{CacheStats, EntryMetadata};
