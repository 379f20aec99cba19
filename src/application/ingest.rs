//! The single-consumer ingestion loop and its reconnection supervisor.
//!
//! Events are pulled one at a time: each commit is classified and handed to the
//! [`CommitHandler`] before the next one is read, so handlers observe commits in
//! stream order. Every [`CHECKPOINT_INTERVAL`] successfully handled commits the
//! cursor is persisted and the retention compactor runs. Any stream or checkpoint
//! failure ends the session; the supervisor waits `reconnect_delay` and resumes
//! from the last persisted cursor, retrying forever.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use metrics::counter;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::checkpoint::CheckpointStore;
use crate::application::classify::classify_commit;
use crate::application::repos::RepoError;
use crate::application::retention::RetentionCompactor;
use crate::application::subscription::{StreamConnector, StreamError};
use crate::domain::operations::{CommitEvent, OperationsByType, RepoEvent};

/// Handled commits between checkpoint writes.
pub const CHECKPOINT_INTERVAL: u64 = 20;

const METRIC_EVENTS: &str = "listfeed_firehose_events_total";
const METRIC_OPS_DROPPED: &str = "listfeed_firehose_ops_dropped_total";
const METRIC_HANDLER_ERRORS: &str = "listfeed_firehose_handler_errors_total";
const METRIC_RECONNECTS: &str = "listfeed_firehose_reconnects_total";

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Repo(#[from] RepoError),
    #[error("{0}")]
    Other(String),
}

/// Persists one classified commit. Must tolerate redelivery after a restart.
#[async_trait]
pub trait CommitHandler: Send + Sync {
    async fn handle(&self, ops: &OperationsByType) -> Result<(), HandlerError>;
}

#[derive(Debug, Error)]
pub enum IngestError {
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error("checkpoint failed: {0}")]
    Checkpoint(#[source] RepoError),
}

pub struct Ingestor {
    connector: Arc<dyn StreamConnector>,
    handler: Arc<dyn CommitHandler>,
    checkpoints: CheckpointStore,
    retention: RetentionCompactor,
    reconnect_delay: Duration,
}

impl Ingestor {
    pub fn new(
        connector: Arc<dyn StreamConnector>,
        handler: Arc<dyn CommitHandler>,
        checkpoints: CheckpointStore,
        retention: RetentionCompactor,
        reconnect_delay: Duration,
    ) -> Self {
        Self {
            connector,
            handler,
            checkpoints,
            retention,
            reconnect_delay,
        }
    }

    /// Consume the stream forever. Only returns if the task is dropped.
    pub async fn run(&self) {
        let mut handled = 0_u64;
        loop {
            match self.run_session(&mut handled).await {
                Ok(()) => warn!(
                    target = "application::ingest",
                    service = self.checkpoints.service(),
                    "subscription closed by remote"
                ),
                Err(err) => error!(
                    target = "application::ingest",
                    service = self.checkpoints.service(),
                    error = %err,
                    "subscription failed"
                ),
            }

            counter!(METRIC_RECONNECTS).increment(1);
            warn!(
                target = "application::ingest",
                delay_ms = self.reconnect_delay.as_millis() as u64,
                "reconnecting"
            );
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    /// One subscription lifetime: resume from the stored cursor and drain the stream.
    async fn run_session(&self, handled: &mut u64) -> Result<(), IngestError> {
        let cursor = self
            .checkpoints
            .get()
            .await
            .map_err(IngestError::Checkpoint)?;
        info!(
            target = "application::ingest",
            service = self.checkpoints.service(),
            cursor,
            "opening subscription"
        );

        let mut events = self.connector.connect(cursor).await?;
        while let Some(event) = events.next().await {
            match event? {
                RepoEvent::Commit(commit) => self.process_commit(&commit, handled).await?,
                other => debug!(
                    target = "application::ingest",
                    seq = other.seq(),
                    "skipping non-commit event"
                ),
            }
        }
        Ok(())
    }

    async fn process_commit(
        &self,
        commit: &CommitEvent,
        handled: &mut u64,
    ) -> Result<(), IngestError> {
        counter!(METRIC_EVENTS).increment(1);

        let classified = classify_commit(commit);
        if let Some(err) = &classified.archive_error {
            warn!(
                target = "application::ingest",
                seq = commit.seq,
                repo = %commit.repo,
                error = %err,
                "commit blocks could not be read"
            );
        }
        for dropped in &classified.dropped {
            counter!(METRIC_OPS_DROPPED, "reason" => dropped.reason.as_str()).increment(1);
            debug!(
                target = "application::ingest",
                seq = commit.seq,
                path = %dropped.path,
                reason = ?dropped.reason,
                "dropped operation"
            );
        }

        if let Err(err) = self.handler.handle(&classified.ops).await {
            counter!(METRIC_HANDLER_ERRORS).increment(1);
            error!(
                target = "application::ingest",
                seq = commit.seq,
                repo = %commit.repo,
                error = %err,
                "commit handler failed"
            );
            return Ok(());
        }

        *handled += 1;
        if *handled % CHECKPOINT_INTERVAL == 0 {
            self.checkpoints
                .set(commit.seq)
                .await
                .map_err(IngestError::Checkpoint)?;
            if let Err(err) = self.retention.compact().await {
                warn!(
                    target = "application::ingest",
                    error = %err,
                    "retention compaction failed"
                );
            }
        }
        Ok(())
    }
}
