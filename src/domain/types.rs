//! Collections the service understands, keyed by their lexicon NSIDs.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Post,
    Repost,
    Like,
    Follow,
}

impl RecordType {
    pub const ALL: [RecordType; 4] = [
        RecordType::Post,
        RecordType::Repost,
        RecordType::Like,
        RecordType::Follow,
    ];

    pub fn nsid(self) -> &'static str {
        match self {
            RecordType::Post => "app.bsky.feed.post",
            RecordType::Repost => "app.bsky.feed.repost",
            RecordType::Like => "app.bsky.feed.like",
            RecordType::Follow => "app.bsky.graph.follow",
        }
    }

    /// Name of the bucket in a classification result.
    pub fn as_str(self) -> &'static str {
        match self {
            RecordType::Post => "posts",
            RecordType::Repost => "reposts",
            RecordType::Like => "likes",
            RecordType::Follow => "follows",
        }
    }

    pub fn from_nsid(nsid: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.nsid() == nsid)
    }

    /// Resolve the collection segment of a repo path (`<collection>/<rkey>`).
    pub fn from_path(path: &str) -> Option<Self> {
        let collection = path.split('/').next()?;
        Self::from_nsid(collection)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.nsid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_prefix_selects_collection() {
        assert_eq!(
            RecordType::from_path("app.bsky.feed.post/3k2a"),
            Some(RecordType::Post)
        );
        assert_eq!(
            RecordType::from_path("app.bsky.graph.follow/3k2b"),
            Some(RecordType::Follow)
        );
        assert_eq!(RecordType::from_path("app.bsky.actor.profile/self"), None);
        assert_eq!(RecordType::from_path("app.bsky.feed.postgres/x"), None);
    }
}
