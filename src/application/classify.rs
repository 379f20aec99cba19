//! Splits a commit into typed per-collection creates and deletes.
//!
//! Classification is pure: it reads the commit's CAR archive, decodes the blocks
//! referenced by create operations and validates them against the record schema
//! of their collection. Failures are isolated to the operation that caused them
//! and are reported back in [`ClassifiedCommit::dropped`] so the caller can log them.

use crate::codec::{BlockMap, DecodeError, decode_lex, read_car};
use crate::domain::cid::Cid;
use crate::domain::error::RecordError;
use crate::domain::operations::{CommitEvent, CreateOp, Operations, OperationsByType, RepoOp};
use crate::domain::records::{
    FollowRecord, LikeRecord, PostRecord, Record, RepostRecord, decode_record,
};
use crate::domain::types::RecordType;

#[derive(Debug, Clone, PartialEq)]
pub enum DropReason {
    MissingCid,
    MissingBlock,
    Undecodable(DecodeError),
    Invalid(RecordError),
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DropReason::MissingCid => "missing_cid",
            DropReason::MissingBlock => "missing_block",
            DropReason::Undecodable(_) => "undecodable",
            DropReason::Invalid(_) => "invalid",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DroppedOp {
    pub path: String,
    pub reason: DropReason,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassifiedCommit {
    pub ops: OperationsByType,
    pub dropped: Vec<DroppedOp>,
    /// Set when the archive could not be read; every create is then dropped.
    pub archive_error: Option<DecodeError>,
}

/// Classification result without the diagnostics.
pub fn ops_by_type(commit: &CommitEvent) -> OperationsByType {
    classify_commit(commit).ops
}

pub fn classify_commit(commit: &CommitEvent) -> ClassifiedCommit {
    let mut classified = ClassifiedCommit::default();
    let blocks = match read_car(&commit.blocks) {
        Ok(archive) => archive.blocks,
        Err(err) => {
            classified.archive_error = Some(err);
            BlockMap::default()
        }
    };

    for op in &commit.ops {
        let Some(kind) = RecordType::from_path(op.path()) else {
            continue;
        };
        match op {
            RepoOp::Update { .. } => {}
            RepoOp::Delete { path } => classified.ops.push_delete(kind, commit.uri_for(path)),
            RepoOp::Create { path, cid } => {
                let outcome =
                    classify_create(commit, &blocks, kind, path, cid.as_ref(), &mut classified.ops);
                if let Err(reason) = outcome {
                    classified.dropped.push(DroppedOp {
                        path: path.clone(),
                        reason,
                    });
                }
            }
        }
    }

    classified
}

fn classify_create(
    commit: &CommitEvent,
    blocks: &BlockMap,
    kind: RecordType,
    path: &str,
    cid: Option<&Cid>,
    ops: &mut OperationsByType,
) -> Result<(), DropReason> {
    let cid = cid.ok_or(DropReason::MissingCid)?;
    let block = blocks.get(cid).ok_or(DropReason::MissingBlock)?;
    let value = decode_lex(block).map_err(DropReason::Undecodable)?;

    let uri = commit.uri_for(path);
    match kind {
        RecordType::Post => push_create(&mut ops.posts, commit, uri, cid, &value),
        RecordType::Repost => push_create(&mut ops.reposts, commit, uri, cid, &value),
        RecordType::Like => push_create(&mut ops.likes, commit, uri, cid, &value),
        RecordType::Follow => push_create(&mut ops.follows, commit, uri, cid, &value),
    }
    .map_err(DropReason::Invalid)
}

fn push_create<T: Record>(
    target: &mut Operations<T>,
    commit: &CommitEvent,
    uri: String,
    cid: &Cid,
    value: &serde_json::Value,
) -> Result<(), RecordError> {
    let record = decode_record::<T>(value)?;
    target.creates.push(CreateOp {
        uri,
        cid: cid.to_string(),
        author: commit.repo.clone(),
        record,
    });
    Ok(())
}
