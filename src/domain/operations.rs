//! Repository events as consumed from the stream and the per-collection result of classifying them.

use bytes::Bytes;

use super::cid::Cid;
use super::records::{FollowRecord, LikeRecord, PostRecord, RepostRecord};
use super::types::RecordType;

/// One write inside a commit. Only the fields each action needs are carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepoOp {
    Create { path: String, cid: Option<Cid> },
    Update { path: String, cid: Option<Cid> },
    Delete { path: String },
}

impl RepoOp {
    pub fn path(&self) -> &str {
        match self {
            RepoOp::Create { path, .. } | RepoOp::Update { path, .. } | RepoOp::Delete { path } => {
                path
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitEvent {
    /// DID of the repository that published the commit.
    pub repo: String,
    pub seq: i64,
    pub ops: Vec<RepoOp>,
    /// CAR archive holding the blocks referenced by `ops`.
    pub blocks: Bytes,
    pub rev: Option<String>,
    pub time: Option<String>,
    pub too_big: bool,
}

impl CommitEvent {
    pub fn uri_for(&self, path: &str) -> String {
        format!("at://{}/{}", self.repo, path)
    }
}

/// A decoded stream message.
#[derive(Debug, Clone, PartialEq)]
pub enum RepoEvent {
    Commit(CommitEvent),
    Identity { seq: i64, did: String },
    Account { seq: i64, did: String, active: bool },
    Info { name: String, message: Option<String> },
    Other { kind: String },
}

impl RepoEvent {
    pub fn seq(&self) -> Option<i64> {
        match self {
            RepoEvent::Commit(commit) => Some(commit.seq),
            RepoEvent::Identity { seq, .. } | RepoEvent::Account { seq, .. } => Some(*seq),
            RepoEvent::Info { .. } | RepoEvent::Other { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateOp<T> {
    pub uri: String,
    pub cid: String,
    pub author: String,
    pub record: T,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteOp {
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Operations<T> {
    pub creates: Vec<CreateOp<T>>,
    pub deletes: Vec<DeleteOp>,
}

impl<T> Default for Operations<T> {
    fn default() -> Self {
        Self {
            creates: Vec::new(),
            deletes: Vec::new(),
        }
    }
}

impl<T> Operations<T> {
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.deletes.is_empty()
    }

    /// Record a delete, discarding earlier creates of the same URI.
    pub(crate) fn push_delete(&mut self, uri: String) {
        self.creates.retain(|create| create.uri != uri);
        self.deletes.push(DeleteOp { uri });
    }
}

/// Classification result for one commit, in stream order within each list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationsByType {
    pub posts: Operations<PostRecord>,
    pub reposts: Operations<RepostRecord>,
    pub likes: Operations<LikeRecord>,
    pub follows: Operations<FollowRecord>,
}

impl OperationsByType {
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
            && self.reposts.is_empty()
            && self.likes.is_empty()
            && self.follows.is_empty()
    }

    /// `(creates, deletes)` for one record type.
    pub fn counts(&self, kind: RecordType) -> (usize, usize) {
        match kind {
            RecordType::Post => (self.posts.creates.len(), self.posts.deletes.len()),
            RecordType::Repost => (self.reposts.creates.len(), self.reposts.deletes.len()),
            RecordType::Like => (self.likes.creates.len(), self.likes.deletes.len()),
            RecordType::Follow => (self.follows.creates.len(), self.follows.deletes.len()),
        }
    }

    /// A later delete wins over a create of the same record in one commit.
    pub(crate) fn push_delete(&mut self, kind: RecordType, uri: String) {
        match kind {
            RecordType::Post => self.posts.push_delete(uri),
            RecordType::Repost => self.reposts.push_delete(uri),
            RecordType::Like => self.likes.push_delete(uri),
            RecordType::Follow => self.follows.push_delete(uri),
        }
    }
}
