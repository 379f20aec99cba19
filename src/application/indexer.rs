use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::application::ingest::{CommitHandler, HandlerError};
use crate::application::repos::{NewPost, PostsWriteRepo};
use crate::domain::operations::OperationsByType;

/// Materializes posts written by list members and removes deleted ones.
///
/// Reposts, likes and follows are classified upstream but not stored.
#[derive(Clone)]
pub struct PostIndexer {
    posts: Arc<dyn PostsWriteRepo>,
}

impl PostIndexer {
    pub fn new(posts: Arc<dyn PostsWriteRepo>) -> Self {
        Self { posts }
    }
}

#[async_trait]
impl CommitHandler for PostIndexer {
    async fn handle(&self, ops: &OperationsByType) -> Result<(), HandlerError> {
        if !ops.posts.deletes.is_empty() {
            let uris: Vec<String> = ops.posts.deletes.iter().map(|op| op.uri.clone()).collect();
            let deleted = self.posts.delete_posts(&uris).await?;
            debug!(
                target = "application::indexer",
                requested = uris.len(),
                deleted,
                "deleted posts"
            );
        }

        if !ops.posts.creates.is_empty() {
            let new_posts: Vec<NewPost> = ops
                .posts
                .creates
                .iter()
                .map(|create| {
                    let reply = create.record.reply.as_ref();
                    NewPost {
                        uri: create.uri.clone(),
                        cid: create.cid.clone(),
                        author: create.author.clone(),
                        reply_parent: reply.map(|reply| reply.parent.uri.clone()),
                        reply_root: reply.map(|reply| reply.root.uri.clone()),
                    }
                })
                .collect();
            let inserted = self.posts.insert_member_posts(&new_posts).await?;
            debug!(
                target = "application::indexer",
                candidates = new_posts.len(),
                inserted,
                "indexed member posts"
            );
        }

        Ok(())
    }
}
