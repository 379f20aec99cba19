use std::sync::Arc;

use metrics::counter;
use tracing::debug;

use crate::application::repos::{CheckpointRepo, RepoError};

const METRIC_CHECKPOINT_WRITES: &str = "listfeed_checkpoint_writes_total";

/// Resume position of the stream, persisted under a service name.
#[derive(Clone)]
pub struct CheckpointStore {
    repo: Arc<dyn CheckpointRepo>,
    service: String,
}

impl CheckpointStore {
    pub fn new(repo: Arc<dyn CheckpointRepo>, service: impl Into<String>) -> Self {
        Self {
            repo,
            service: service.into(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub async fn get(&self) -> Result<Option<i64>, RepoError> {
        self.repo.load_cursor(&self.service).await
    }

    /// Upsert the cursor. The store never moves it backwards.
    pub async fn set(&self, cursor: i64) -> Result<(), RepoError> {
        self.repo.save_cursor(&self.service, cursor).await?;
        counter!(METRIC_CHECKPOINT_WRITES).increment(1);
        debug!(
            target = "application::checkpoint",
            service = %self.service,
            cursor,
            "checkpoint saved"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::application::test_support::MemoryCheckpoints;

    #[tokio::test]
    async fn cursor_is_absent_until_first_write() {
        let store = CheckpointStore::new(Arc::new(MemoryCheckpoints::default()), "wss://relay");
        assert_eq!(store.get().await.expect("get"), None);

        store.set(40).await.expect("set");
        assert_eq!(store.get().await.expect("get"), Some(40));
    }

    #[tokio::test]
    async fn writes_are_monotonic_and_scoped_by_service() {
        let repo = Arc::new(MemoryCheckpoints::default());
        let primary = CheckpointStore::new(repo.clone(), "primary");
        let secondary = CheckpointStore::new(repo, "secondary");

        primary.set(100).await.expect("set");
        primary.set(100).await.expect("idempotent");
        primary.set(60).await.expect("stale write");
        secondary.set(7).await.expect("set");

        assert_eq!(primary.get().await.expect("get"), Some(100));
        assert_eq!(secondary.get().await.expect("get"), Some(7));
    }
}
