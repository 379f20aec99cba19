//! In-memory repositories shared by the application tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::application::repos::{
    CheckpointRepo, NewPost, PostsWriteRepo, RepoError, RetentionRepo,
};

/// Checkpoint rows keyed by service, with the same monotonic upsert as the database.
#[derive(Default)]
pub(crate) struct MemoryCheckpoints {
    cursors: Mutex<HashMap<String, i64>>,
    writes: Mutex<Vec<i64>>,
}

impl MemoryCheckpoints {
    /// Every cursor passed to `save_cursor`, in call order.
    pub(crate) fn writes(&self) -> Vec<i64> {
        self.writes.lock().expect("writes lock").clone()
    }
}

#[async_trait]
impl CheckpointRepo for MemoryCheckpoints {
    async fn load_cursor(&self, service: &str) -> Result<Option<i64>, RepoError> {
        Ok(self.cursors.lock().expect("cursor lock").get(service).copied())
    }

    async fn save_cursor(&self, service: &str, cursor: i64) -> Result<(), RepoError> {
        self.writes.lock().expect("writes lock").push(cursor);
        let mut cursors = self.cursors.lock().expect("cursor lock");
        let entry = cursors.entry(service.to_string()).or_insert(cursor);
        *entry = (*entry).max(cursor);
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct MemoryPosts {
    rows: Mutex<Vec<(String, OffsetDateTime)>>,
    members: Mutex<Vec<String>>,
    fail_inserts: bool,
}

impl MemoryPosts {
    /// A store whose inserts always time out.
    pub(crate) fn failing() -> Self {
        Self {
            fail_inserts: true,
            ..Self::default()
        }
    }

    pub(crate) fn seed(&self, uri: &str, indexed_at: OffsetDateTime) {
        self.rows
            .lock()
            .expect("rows lock")
            .push((uri.to_string(), indexed_at));
    }

    pub(crate) fn add_member(&self, did: &str) {
        self.members.lock().expect("members lock").push(did.to_string());
    }

    pub(crate) fn uris(&self) -> Vec<String> {
        self.rows
            .lock()
            .expect("rows lock")
            .iter()
            .map(|(uri, _)| uri.clone())
            .collect()
    }
}

#[async_trait]
impl RetentionRepo for MemoryPosts {
    async fn delete_posts_indexed_before(&self, cutoff: OffsetDateTime) -> Result<u64, RepoError> {
        let mut rows = self.rows.lock().expect("rows lock");
        let before = rows.len();
        rows.retain(|(_, indexed_at)| *indexed_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }
}

#[async_trait]
impl PostsWriteRepo for MemoryPosts {
    async fn insert_member_posts(&self, posts: &[NewPost]) -> Result<u64, RepoError> {
        if self.fail_inserts {
            return Err(RepoError::Timeout);
        }
        let members = self.members.lock().expect("members lock").clone();
        let mut rows = self.rows.lock().expect("rows lock");
        let mut inserted = 0;
        for post in posts {
            let known = rows.iter().any(|(uri, _)| uri == &post.uri);
            if members.contains(&post.author) && !known {
                rows.push((post.uri.clone(), OffsetDateTime::now_utc()));
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn delete_posts(&self, uris: &[String]) -> Result<u64, RepoError> {
        let mut rows = self.rows.lock().expect("rows lock");
        let before = rows.len();
        rows.retain(|(uri, _)| !uris.contains(uri));
        Ok((before - rows.len()) as u64)
    }
}
