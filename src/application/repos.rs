//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// A post row as written by the indexer. `indexed_at` is assigned by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPost {
    pub uri: String,
    pub cid: String,
    pub author: String,
    pub reply_parent: Option<String>,
    pub reply_root: Option<String>,
}

/// Durable resume cursor, one row per upstream service.
#[async_trait]
pub trait CheckpointRepo: Send + Sync {
    async fn load_cursor(&self, service: &str) -> Result<Option<i64>, RepoError>;

    async fn save_cursor(&self, service: &str, cursor: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait RetentionRepo: Send + Sync {
    /// Delete posts indexed strictly before `cutoff`, returning the number removed.
    async fn delete_posts_indexed_before(&self, cutoff: OffsetDateTime) -> Result<u64, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    /// Insert the posts whose author is a member of any list. Returns rows inserted.
    async fn insert_member_posts(&self, posts: &[NewPost]) -> Result<u64, RepoError>;

    async fn delete_posts(&self, uris: &[String]) -> Result<u64, RepoError>;
}
