//! Builders for DAG-CBOR blocks, CAR archives and stream frames used by tests.

use bytes::Bytes;
use ciborium::Value;
use sha2::{Digest, Sha256};

use crate::domain::cid::{Cid, DAG_CBOR, SHA2_256};
use crate::util::varint::write_uvarint;

use super::dag_cbor::CID_TAG;

pub(crate) fn encode_cbor(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).expect("encode cbor");
    out
}

pub(crate) fn text_map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(key, value)| (Value::Text(key.to_string()), value))
            .collect(),
    )
}

pub(crate) fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

pub(crate) fn link(cid: &Cid) -> Value {
    let mut payload = vec![0x00];
    payload.extend_from_slice(&cid.to_bytes());
    Value::Tag(CID_TAG, Box::new(Value::Bytes(payload)))
}

/// Encode a record and derive its CID the way a PDS would.
pub(crate) fn block_for(value: &Value) -> (Cid, Vec<u8>) {
    let bytes = encode_cbor(value);
    let digest = Sha256::digest(&bytes);
    (Cid::new_v1(DAG_CBOR, SHA2_256, digest.as_slice()), bytes)
}

pub(crate) fn car_bytes(roots: &[Cid], blocks: &[(Cid, Vec<u8>)]) -> Bytes {
    let header = encode_cbor(&text_map(vec![
        ("version", Value::Integer(1.into())),
        ("roots", Value::Array(roots.iter().map(link).collect())),
    ]));

    let mut out = Vec::new();
    write_uvarint(header.len() as u64, &mut out);
    out.extend_from_slice(&header);
    for (cid, block) in blocks {
        let cid_bytes = cid.to_bytes();
        write_uvarint((cid_bytes.len() + block.len()) as u64, &mut out);
        out.extend_from_slice(&cid_bytes);
        out.extend_from_slice(block);
    }
    Bytes::from(out)
}

pub(crate) fn post_value(body: &str) -> Value {
    text_map(vec![
        ("$type", text("app.bsky.feed.post")),
        ("text", text(body)),
        ("createdAt", text("2024-05-01T12:00:00.000Z")),
    ])
}

pub(crate) fn like_value(subject_uri: &str, subject_cid: &Cid) -> Value {
    text_map(vec![
        ("$type", text("app.bsky.feed.like")),
        (
            "subject",
            text_map(vec![
                ("uri", text(subject_uri)),
                ("cid", text(&subject_cid.to_string())),
            ]),
        ),
        ("createdAt", text("2024-05-01T12:00:00.000Z")),
    ])
}

pub(crate) fn follow_value(subject: &str) -> Value {
    text_map(vec![
        ("$type", text("app.bsky.graph.follow")),
        ("subject", text(subject)),
        ("createdAt", text("2024-05-01T12:00:00.000Z")),
    ])
}

/// Concatenate a header and body the way the stream frames messages.
pub(crate) fn frame(header: &Value, body: &Value) -> Vec<u8> {
    let mut out = encode_cbor(header);
    out.extend_from_slice(&encode_cbor(body));
    out
}

pub(crate) fn message_header(kind: &str) -> Value {
    text_map(vec![("op", Value::Integer(1.into())), ("t", text(kind))])
}
