//! Seam between the ingestion loop and the transport delivering repository events.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::domain::operations::RepoEvent;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to connect to `{endpoint}`: {message}")]
    Connect { endpoint: String, message: String },
    #[error("stream transport failed: {0}")]
    Transport(String),
    #[error("remote ended the stream with `{error}`: {}", message.as_deref().unwrap_or("no message"))]
    Remote {
        error: String,
        message: Option<String>,
    },
}

impl StreamError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }
}

/// Events in stream order. The stream ends when the remote closes the connection.
pub type EventStream = BoxStream<'static, Result<RepoEvent, StreamError>>;

/// Opens a fresh subscription, resuming after `cursor` when one is given.
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, cursor: Option<i64>) -> Result<EventStream, StreamError>;
}
