use std::sync::Arc;

use metrics::counter;
use time::{Duration, OffsetDateTime};
use tracing::info;

use crate::application::repos::{RepoError, RetentionRepo};

const METRIC_RETENTION_DELETED: &str = "listfeed_retention_deleted_total";

/// Prunes posts that have fallen out of the served window.
#[derive(Clone)]
pub struct RetentionCompactor {
    repo: Arc<dyn RetentionRepo>,
    retain: Duration,
}

impl RetentionCompactor {
    pub fn new(repo: Arc<dyn RetentionRepo>, retain: Duration) -> Self {
        Self { repo, retain }
    }

    pub fn from_hours(repo: Arc<dyn RetentionRepo>, retain_hours: u32) -> Self {
        Self::new(repo, Duration::hours(i64::from(retain_hours)))
    }

    pub fn cutoff(&self, now: OffsetDateTime) -> OffsetDateTime {
        now - self.retain
    }

    /// Delete rows indexed strictly before `now - retain`.
    pub async fn compact_at(&self, now: OffsetDateTime) -> Result<u64, RepoError> {
        let cutoff = self.cutoff(now);
        let deleted = self.repo.delete_posts_indexed_before(cutoff).await?;
        counter!(METRIC_RETENTION_DELETED).increment(deleted);
        if deleted > 0 {
            info!(
                target = "application::retention",
                deleted,
                cutoff = %cutoff,
                "pruned expired posts"
            );
        }
        Ok(deleted)
    }

    pub async fn compact(&self) -> Result<u64, RepoError> {
        self.compact_at(OffsetDateTime::now_utc()).await
    }
}
