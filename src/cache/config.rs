//! Identity cache configuration.
//!
//! Bounds the handle cache by entry count and entry age, set from the
//! `[identity]` section of the service configuration.

use std::num::NonZeroUsize;
use std::time::Duration;

// Default values for cache configuration
const DEFAULT_MAX_ENTRIES: usize = 10_000;
const DEFAULT_TTL_SECONDS: u64 = 5 * 60 * 60;

#[derive(Debug, Clone)]
pub struct HandleCacheConfig {
    /// Most recently inserted entries kept after each write.
    pub max_entries: usize,
    /// Entries cached longer than this are purged on the next write.
    pub ttl: Duration,
}

impl Default for HandleCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
        }
    }
}

impl From<&crate::config::IdentitySettings> for HandleCacheConfig {
    fn from(settings: &crate::config::IdentitySettings) -> Self {
        Self {
            max_entries: settings.cache_max_entries.get(),
            ttl: settings.cache_ttl,
        }
    }
}

impl HandleCacheConfig {
    /// Returns the entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn max_entries_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }

    pub(crate) fn ttl_millis(&self) -> i64 {
        i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX)
    }
}
