//! Identity cache.
//!
//! A bounded, bidirectional handle ↔ DID map kept in an in-memory SQLite
//! database. Configured from the `[identity]` settings:
//!
//! ```toml
//! [identity]
//! cache_max_entries = 10000
//! cache_ttl_seconds = 18000
//! ```

mod config;
mod handles;

pub use config::HandleCacheConfig;
pub use handles::{CacheEntry, CacheError, HandleCache, LookupKind};
