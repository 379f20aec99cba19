//! Stream frame decoding with structural validation of the known message bodies.

use bytes::Bytes;
use ciborium::Value;

use crate::domain::cid::Cid;
use crate::domain::operations::{CommitEvent, RepoEvent, RepoOp};

use super::DecodeError;
use super::dag_cbor::{cid_from_link, read_value};

const OP_MESSAGE: i128 = 1;
const OP_ERROR: i128 = -1;

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Event(RepoEvent),
    /// The remote ended the subscription with an error, e.g. `FutureCursor`.
    Error {
        error: String,
        message: Option<String>,
    },
}

pub fn decode_frame(bytes: &[u8]) -> Result<Frame, DecodeError> {
    let mut reader = bytes;
    let header = read_value(&mut reader)?;
    let body = read_value(&mut reader)?;

    let header = Fields::new(&header, "header")?;
    let body = Fields::new(&body, "body")?;

    match header.integer("op")? {
        OP_ERROR => Ok(Frame::Error {
            error: body.text("error")?.to_string(),
            message: body.optional_text("message")?.map(str::to_string),
        }),
        OP_MESSAGE => {
            let kind = header.text("t")?;
            decode_message(kind, &body).map(Frame::Event)
        }
        other => Err(DecodeError::structure(format!("unknown frame op {other}"))),
    }
}

fn decode_message(kind: &str, body: &Fields<'_>) -> Result<RepoEvent, DecodeError> {
    match kind {
        "#commit" => decode_commit(body).map(RepoEvent::Commit),
        "#identity" => Ok(RepoEvent::Identity {
            seq: body.seq()?,
            did: body.text("did")?.to_string(),
        }),
        "#account" => Ok(RepoEvent::Account {
            seq: body.seq()?,
            did: body.text("did")?.to_string(),
            active: body.bool("active")?,
        }),
        "#info" => Ok(RepoEvent::Info {
            name: body.text("name")?.to_string(),
            message: body.optional_text("message")?.map(str::to_string),
        }),
        other => Ok(RepoEvent::Other {
            kind: other.to_string(),
        }),
    }
}

fn decode_commit(body: &Fields<'_>) -> Result<CommitEvent, DecodeError> {
    let ops = body
        .array("ops")?
        .iter()
        .filter_map(|op| decode_op(op).transpose())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CommitEvent {
        repo: body.text("repo")?.to_string(),
        seq: body.seq()?,
        ops,
        blocks: Bytes::copy_from_slice(body.bytes("blocks")?),
        rev: body.optional_text("rev")?.map(str::to_string),
        time: body.optional_text("time")?.map(str::to_string),
        too_big: body.optional_bool("tooBig")?.unwrap_or(false),
    })
}

/// `Ok(None)` for actions outside create/update/delete.
fn decode_op(value: &Value) -> Result<Option<RepoOp>, DecodeError> {
    let fields = Fields::new(value, "op")?;
    let path = fields.text("path")?.to_string();
    let cid = fields.optional_link("cid")?;

    let op = match fields.text("action")? {
        "create" => RepoOp::Create { path, cid },
        "update" => RepoOp::Update { path, cid },
        "delete" => RepoOp::Delete { path },
        _ => return Ok(None),
    };
    Ok(Some(op))
}

struct Fields<'a> {
    entries: &'a [(Value, Value)],
    context: &'static str,
}

impl<'a> Fields<'a> {
    fn new(value: &'a Value, context: &'static str) -> Result<Self, DecodeError> {
        match value {
            Value::Map(entries) => Ok(Self { entries, context }),
            _ => Err(DecodeError::structure(format!("{context} must be a map"))),
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.entries
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .map(|(_, v)| v)
            .filter(|v| !v.is_null())
    }

    fn require(&self, key: &str) -> Result<&'a Value, DecodeError> {
        self.get(key).ok_or_else(|| {
            DecodeError::structure(format!("{} is missing `{key}`", self.context))
        })
    }

    fn mistyped(&self, key: &str, expected: &str) -> DecodeError {
        DecodeError::structure(format!("{} field `{key}` must be {expected}", self.context))
    }

    fn integer(&self, key: &str) -> Result<i128, DecodeError> {
        match self.require(key)? {
            Value::Integer(value) => Ok(i128::from(*value)),
            _ => Err(self.mistyped(key, "an integer")),
        }
    }

    fn seq(&self) -> Result<i64, DecodeError> {
        i64::try_from(self.integer("seq")?).map_err(|_| self.mistyped("seq", "a 64-bit integer"))
    }

    fn text(&self, key: &str) -> Result<&'a str, DecodeError> {
        self.require(key)?
            .as_text()
            .ok_or_else(|| self.mistyped(key, "a string"))
    }

    fn optional_text(&self, key: &str) -> Result<Option<&'a str>, DecodeError> {
        self.get(key)
            .map(|value| value.as_text().ok_or_else(|| self.mistyped(key, "a string")))
            .transpose()
    }

    fn bool(&self, key: &str) -> Result<bool, DecodeError> {
        self.optional_bool(key)?.ok_or_else(|| {
            DecodeError::structure(format!("{} is missing `{key}`", self.context))
        })
    }

    fn optional_bool(&self, key: &str) -> Result<Option<bool>, DecodeError> {
        self.get(key)
            .map(|value| value.as_bool().ok_or_else(|| self.mistyped(key, "a boolean")))
            .transpose()
    }

    fn bytes(&self, key: &str) -> Result<&'a [u8], DecodeError> {
        match self.require(key)? {
            Value::Bytes(bytes) => Ok(bytes),
            _ => Err(self.mistyped(key, "bytes")),
        }
    }

    fn array(&self, key: &str) -> Result<&'a [Value], DecodeError> {
        match self.require(key)? {
            Value::Array(items) => Ok(items),
            _ => Err(self.mistyped(key, "an array")),
        }
    }

    fn optional_link(&self, key: &str) -> Result<Option<Cid>, DecodeError> {
        self.get(key).map(cid_from_link).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::fixtures::{block_for, frame, link, message_header, post_value, text, text_map};

    fn commit_body(ops: Vec<Value>) -> Value {
        text_map(vec![
            ("seq", Value::Integer(1234.into())),
            ("repo", text("did:plc:alice")),
            ("rev", text("3kabc")),
            ("time", text("2024-05-01T12:00:00.000Z")),
            ("tooBig", Value::Bool(false)),
            ("blocks", Value::Bytes(vec![0x0a])),
            ("ops", Value::Array(ops)),
        ])
    }

    fn op(action: &str, path: &str, cid: Option<&Cid>) -> Value {
        text_map(vec![
            ("action", text(action)),
            ("path", text(path)),
            ("cid", cid.map(link).unwrap_or(Value::Null)),
        ])
    }

    #[test]
    fn decodes_commit_with_all_actions() {
        let (cid, _) = block_for(&post_value("hi"));
        let body = commit_body(vec![
            op("create", "app.bsky.feed.post/1", Some(&cid)),
            op("update", "app.bsky.actor.profile/self", Some(&cid)),
            op("delete", "app.bsky.feed.post/0", None),
        ]);

        let decoded = decode_frame(&frame(&message_header("#commit"), &body)).expect("decode");
        let Frame::Event(RepoEvent::Commit(commit)) = decoded else {
            panic!("expected commit, got {decoded:?}");
        };
        assert_eq!(commit.seq, 1234);
        assert_eq!(commit.repo, "did:plc:alice");
        assert_eq!(commit.rev.as_deref(), Some("3kabc"));
        assert_eq!(
            commit.ops,
            vec![
                RepoOp::Create {
                    path: "app.bsky.feed.post/1".into(),
                    cid: Some(cid.clone())
                },
                RepoOp::Update {
                    path: "app.bsky.actor.profile/self".into(),
                    cid: Some(cid)
                },
                RepoOp::Delete {
                    path: "app.bsky.feed.post/0".into()
                },
            ]
        );
        assert_eq!(commit.blocks.as_ref(), &[0x0a]);
    }

    #[test]
    fn unknown_actions_are_skipped() {
        let body = commit_body(vec![op("mutate", "app.bsky.feed.post/1", None)]);
        let decoded = decode_frame(&frame(&message_header("#commit"), &body)).expect("decode");
        assert!(matches!(decoded, Frame::Event(RepoEvent::Commit(c)) if c.ops.is_empty()));
    }

    #[test]
    fn commit_without_seq_fails_validation() {
        let body = text_map(vec![
            ("repo", text("did:plc:alice")),
            ("blocks", Value::Bytes(vec![])),
            ("ops", Value::Array(vec![])),
        ]);
        let err = decode_frame(&frame(&message_header("#commit"), &body)).expect_err("invalid");
        assert_eq!(err, DecodeError::structure("body is missing `seq`"));
    }

    #[test]
    fn error_frames_are_surfaced() {
        let header = text_map(vec![("op", Value::Integer((-1).into()))]);
        let body = text_map(vec![
            ("error", text("FutureCursor")),
            ("message", text("cursor in the future")),
        ]);
        assert_eq!(
            decode_frame(&frame(&header, &body)),
            Ok(Frame::Error {
                error: "FutureCursor".into(),
                message: Some("cursor in the future".into()),
            })
        );
    }

    #[test]
    fn other_message_types_decode_without_payload() {
        let identity = text_map(vec![
            ("seq", Value::Integer(9.into())),
            ("did", text("did:plc:bob")),
        ]);
        assert_eq!(
            decode_frame(&frame(&message_header("#identity"), &identity)),
            Ok(Frame::Event(RepoEvent::Identity {
                seq: 9,
                did: "did:plc:bob".into()
            }))
        );

        let sync = text_map(vec![("seq", Value::Integer(10.into()))]);
        assert_eq!(
            decode_frame(&frame(&message_header("#sync"), &sync)),
            Ok(Frame::Event(RepoEvent::Other {
                kind: "#sync".into()
            }))
        );
    }

    #[test]
    fn single_item_frame_is_rejected() {
        let header = crate::codec::fixtures::encode_cbor(&message_header("#commit"));
        assert!(decode_frame(&header).is_err());
    }
}
