//! Bidirectional handle ↔ DID cache on an embedded SQLite database.
//!
//! Both lookup directions share one table with a unique index per column, so
//! the store itself guarantees that no two entries share a handle or a DID.
//! Every successful insert is followed by a single eviction pass that removes
//! entries beyond the newest `max_entries` ids and entries older than `ttl`.
//!
//! `fetch` does not serialize concurrent misses for the same key. Both callers
//! resolve; one insert wins and the other is dropped by `ON CONFLICT DO NOTHING`,
//! while each caller still receives its own resolved value.

use std::future::Future;
use std::str::FromStr;

use metrics::counter;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use thiserror::Error;
use time::OffsetDateTime;
use tracing::debug;

use crate::application::identity::{IdentityError, ResolveError};

use super::config::HandleCacheConfig;

const METRIC_HIT: &str = "listfeed_identity_cache_hit_total";
const METRIC_MISS: &str = "listfeed_identity_cache_miss_total";
const METRIC_EVICT: &str = "listfeed_identity_cache_evict_total";

const SCHEMA: [&str; 3] = [
    "CREATE TABLE handle_lookup (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        handle TEXT NOT NULL,
        did TEXT NOT NULL,
        cached_at INTEGER NOT NULL
    )",
    "CREATE UNIQUE INDEX handle_lookup_handle_idx ON handle_lookup (handle)",
    "CREATE UNIQUE INDEX handle_lookup_did_idx ON handle_lookup (did)",
];

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("identity cache storage failed: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Which side of the mapping a lookup starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKind {
    Handle,
    Did,
}

impl LookupKind {
    fn column(self) -> &'static str {
        match self {
            LookupKind::Handle => "handle",
            LookupKind::Did => "did",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct CacheEntry {
    pub id: i64,
    pub handle: String,
    pub did: String,
    /// Unix epoch milliseconds.
    pub cached_at: i64,
}

impl CacheEntry {
    /// The value on the other side of a lookup of `kind`.
    pub fn counterpart(&self, kind: LookupKind) -> &str {
        match kind {
            LookupKind::Handle => &self.did,
            LookupKind::Did => &self.handle,
        }
    }
}

#[derive(Clone)]
pub struct HandleCache {
    pool: SqlitePool,
    config: HandleCacheConfig,
}

impl HandleCache {
    /// Create the in-memory database and its schema.
    ///
    /// The pool pins a single connection for the lifetime of the cache; the
    /// database lives exactly as long as that connection.
    pub async fn open(config: HandleCacheConfig) -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }

        Ok(Self { pool, config })
    }

    /// DID for `handle`, resolving and caching it on a miss.
    pub async fn fetch_did<F, Fut>(
        &self,
        handle: &str,
        resolve: F,
    ) -> Result<String, IdentityError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ResolveError>>,
    {
        self.fetch(LookupKind::Handle, handle, resolve).await
    }

    /// Handle for `did`, resolving and caching it on a miss.
    pub async fn fetch_handle<F, Fut>(
        &self,
        did: &str,
        resolve: F,
    ) -> Result<String, IdentityError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ResolveError>>,
    {
        self.fetch(LookupKind::Did, did, resolve).await
    }

    pub async fn fetch<F, Fut>(
        &self,
        kind: LookupKind,
        value: &str,
        resolve: F,
    ) -> Result<String, IdentityError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ResolveError>>,
    {
        self.fetch_at(kind, value, resolve, OffsetDateTime::now_utc())
            .await
    }

    pub(crate) async fn fetch_at<F, Fut>(
        &self,
        kind: LookupKind,
        value: &str,
        resolve: F,
        now: OffsetDateTime,
    ) -> Result<String, IdentityError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, ResolveError>>,
    {
        if let Some(entry) = self.peek(kind, value).await? {
            counter!(METRIC_HIT).increment(1);
            return Ok(entry.counterpart(kind).to_string());
        }
        counter!(METRIC_MISS).increment(1);

        let resolved = resolve().await?;
        let (handle, did) = match kind {
            LookupKind::Handle => (value, resolved.as_str()),
            LookupKind::Did => (resolved.as_str(), value),
        };
        self.insert(handle, did, epoch_millis(now)).await?;
        Ok(resolved)
    }

    /// Read-only lookup. Never resolves, inserts or evicts.
    pub async fn peek(
        &self,
        kind: LookupKind,
        value: &str,
    ) -> Result<Option<CacheEntry>, CacheError> {
        let query = format!(
            "SELECT id, handle, did, cached_at FROM handle_lookup WHERE {} = ?",
            kind.column()
        );
        let entry = sqlx::query_as::<_, CacheEntry>(&query)
            .bind(value)
            .fetch_optional(&self.pool)
            .await?;
        Ok(entry)
    }

    pub async fn len(&self) -> Result<usize, CacheError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM handle_lookup")
            .fetch_one(&self.pool)
            .await?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    pub async fn is_empty(&self) -> Result<bool, CacheError> {
        Ok(self.len().await? == 0)
    }

    async fn insert(&self, handle: &str, did: &str, cached_at: i64) -> Result<(), CacheError> {
        let inserted: Option<i64> = sqlx::query_scalar(
            "INSERT INTO handle_lookup (handle, did, cached_at) VALUES (?, ?, ?) \
             ON CONFLICT DO NOTHING RETURNING id",
        )
        .bind(handle)
        .bind(did)
        .bind(cached_at)
        .fetch_optional(&self.pool)
        .await?;

        let Some(newest_id) = inserted else {
            debug!(
                target = "cache::handles",
                handle, did, "entry already cached by a concurrent lookup"
            );
            return Ok(());
        };

        let max_entries =
            i64::try_from(self.config.max_entries_non_zero().get()).unwrap_or(i64::MAX);
        let evicted = sqlx::query("DELETE FROM handle_lookup WHERE id <= ? OR cached_at < ?")
            .bind(newest_id.saturating_sub(max_entries))
            .bind(cached_at.saturating_sub(self.config.ttl_millis()))
            .execute(&self.pool)
            .await?
            .rows_affected();
        if evicted > 0 {
            counter!(METRIC_EVICT).increment(evicted);
            debug!(target = "cache::handles", evicted, "evicted identity entries");
        }
        Ok(())
    }
}

fn epoch_millis(now: OffsetDateTime) -> i64 {
    i64::try_from(now.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use time::Duration as TimeDuration;
    use time::macros::datetime;

    use super::*;

    const T0: OffsetDateTime = datetime!(2024-05-01 12:00 UTC);

    async fn cache(max_entries: usize, ttl: Duration) -> HandleCache {
        HandleCache::open(HandleCacheConfig { max_entries, ttl })
            .await
            .expect("open cache")
    }

    fn did_of(handle: &str) -> String {
        format!("did:plc:{}", handle.replace('.', "-"))
    }

    async fn fetch_did_at(cache: &HandleCache, handle: &str, now: OffsetDateTime) -> String {
        let did = did_of(handle);
        let resolve = || async move { Ok::<_, ResolveError>(did) };
        cache
            .fetch_at(LookupKind::Handle, handle, resolve, now)
            .await
            .expect("fetch")
    }

    #[tokio::test]
    async fn miss_resolves_once_then_hits() {
        let cache = cache(10, Duration::from_secs(3600)).await;
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let resolve = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ResolveError>("did:plc:alice".to_string())
        };

        let first = cache.fetch_did("alice.test", resolve).await.expect("miss");
        let second = cache.fetch_did("alice.test", resolve).await.expect("hit");

        assert_eq!(first, "did:plc:alice");
        assert_eq!(second, "did:plc:alice");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn entries_serve_both_directions() {
        let cache = cache(10, Duration::from_secs(3600)).await;
        cache
            .fetch_handle("did:plc:bob", || async {
                Ok::<_, ResolveError>("bob.test".to_string())
            })
            .await
            .expect("fetch");

        let did = cache
            .fetch_did("bob.test", || async {
                Err::<String, _>(ResolveError::NotFound("unexpected".into()))
            })
            .await
            .expect("hit");
        assert_eq!(did, "did:plc:bob");

        let entry = cache
            .peek(LookupKind::Did, "did:plc:bob")
            .await
            .expect("peek")
            .expect("entry");
        assert_eq!(entry.handle, "bob.test");
        assert_eq!(entry.counterpart(LookupKind::Did), "bob.test");
    }

    #[tokio::test]
    async fn resolver_errors_propagate_and_are_not_cached() {
        let cache = cache(10, Duration::from_secs(3600)).await;
        let err = cache
            .fetch_did("ghost.test", || async {
                Err::<String, _>(ResolveError::NotFound("ghost.test".into()))
            })
            .await
            .expect_err("resolver failure");

        assert!(matches!(err, IdentityError::Resolve(ResolveError::NotFound(_))));
        assert!(cache.is_empty().await.expect("len"));
    }

    #[tokio::test]
    async fn peek_never_mutates() {
        let cache = cache(1, Duration::from_secs(1)).await;
        fetch_did_at(&cache, "a.test", T0).await;

        assert!(
            cache
                .peek(LookupKind::Handle, "missing.test")
                .await
                .expect("peek")
                .is_none()
        );
        // Stale but still present: only writes evict.
        assert!(
            cache
                .peek(LookupKind::Handle, "a.test")
                .await
                .expect("peek")
                .is_some()
        );
        assert_eq!(cache.len().await.expect("len"), 1);
    }

    #[tokio::test]
    async fn inserting_past_capacity_evicts_the_oldest_entry() {
        let cache = cache(3, Duration::from_secs(3600)).await;
        for (offset, handle) in ["a.test", "b.test", "c.test", "d.test"].iter().enumerate() {
            fetch_did_at(&cache, handle, T0 + TimeDuration::seconds(offset as i64)).await;
        }

        assert_eq!(cache.len().await.expect("len"), 3);
        assert!(
            cache
                .peek(LookupKind::Handle, "a.test")
                .await
                .expect("peek")
                .is_none()
        );
        for handle in ["b.test", "c.test", "d.test"] {
            assert!(
                cache
                    .peek(LookupKind::Handle, handle)
                    .await
                    .expect("peek")
                    .is_some()
            );
        }
    }

    #[tokio::test]
    async fn capacity_of_one_keeps_only_the_newest() {
        let cache = cache(1, Duration::from_secs(3600)).await;
        fetch_did_at(&cache, "a.test", T0).await;
        fetch_did_at(&cache, "b.test", T0).await;

        let remaining = cache
            .peek(LookupKind::Handle, "b.test")
            .await
            .expect("peek")
            .expect("newest entry");
        assert_eq!(remaining.did, "did:plc:b-test");
        assert_eq!(cache.len().await.expect("len"), 1);
    }

    #[tokio::test]
    async fn expired_entries_are_purged_on_next_write_below_capacity() {
        let cache = cache(100, Duration::from_secs(60)).await;
        fetch_did_at(&cache, "old.test", T0).await;
        fetch_did_at(&cache, "edge.test", T0 + TimeDuration::seconds(30)).await;

        fetch_did_at(&cache, "new.test", T0 + TimeDuration::seconds(90)).await;

        assert!(
            cache
                .peek(LookupKind::Handle, "old.test")
                .await
                .expect("peek")
                .is_none()
        );
        // Cached exactly `ttl` before the write: kept.
        assert!(
            cache
                .peek(LookupKind::Handle, "edge.test")
                .await
                .expect("peek")
                .is_some()
        );
        assert_eq!(cache.len().await.expect("len"), 2);
    }

    #[tokio::test]
    async fn id_cutoff_holds_after_age_eviction_leaves_gaps() {
        let cache = cache(3, Duration::from_secs(60)).await;
        // ids 1..=3 at T0, then id 4 two minutes later expires all three.
        for handle in ["a.test", "b.test", "c.test"] {
            fetch_did_at(&cache, handle, T0).await;
        }
        let later = T0 + TimeDuration::minutes(2);
        fetch_did_at(&cache, "d.test", later).await;
        assert_eq!(cache.len().await.expect("len"), 1);

        // ids 5..=7: the count cutoff (id <= newest - 3) must only drop id 4.
        for handle in ["e.test", "f.test", "g.test"] {
            fetch_did_at(&cache, handle, later).await;
        }
        assert_eq!(cache.len().await.expect("len"), 3);
        assert!(
            cache
                .peek(LookupKind::Handle, "d.test")
                .await
                .expect("peek")
                .is_none()
        );
    }

    #[tokio::test]
    async fn evicted_ids_are_never_reused() {
        let cache = cache(1, Duration::from_secs(3600)).await;
        fetch_did_at(&cache, "a.test", T0).await;
        fetch_did_at(&cache, "b.test", T0).await;
        fetch_did_at(&cache, "c.test", T0).await;

        let entry = cache
            .peek(LookupKind::Handle, "c.test")
            .await
            .expect("peek")
            .expect("entry");
        assert_eq!(entry.id, 3);
    }

    #[tokio::test]
    async fn concurrent_misses_keep_a_single_entry() {
        let cache = cache(10, Duration::from_secs(3600)).await;
        let calls = AtomicUsize::new(0);
        let calls = &calls;
        let resolve = || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            Ok::<_, ResolveError>("did:plc:carol".to_string())
        };

        let (left, right) = tokio::join!(
            cache.fetch_did("carol.test", resolve),
            cache.fetch_did("carol.test", resolve)
        );

        assert_eq!(left.expect("left"), "did:plc:carol");
        assert_eq!(right.expect("right"), "did:plc:carol");
        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert_eq!(cache.len().await.expect("len"), 1);
    }

    #[tokio::test]
    async fn conflicting_insert_still_returns_resolved_value() {
        let cache = cache(10, Duration::from_secs(3600)).await;
        fetch_did_at(&cache, "old-name.test", T0).await;

        // The DID is already cached under another handle; the insert is dropped.
        let did = cache
            .fetch_did("new-name.test", || async {
                Ok::<_, ResolveError>(did_of("old-name.test"))
            })
            .await
            .expect("fetch");

        assert_eq!(did, "did:plc:old-name-test");
        assert_eq!(cache.len().await.expect("len"), 1);
    }
}
