use thiserror::Error;

use crate::util::varint::VarintError;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CidError {
    #[error("malformed cid varint: {0}")]
    Varint(#[from] VarintError),
    #[error("unsupported cid version {0}")]
    UnsupportedVersion(u64),
    #[error("cid digest is truncated: expected {expected} bytes, found {found}")]
    TruncatedDigest { expected: usize, found: usize },
    #[error("cid has {0} trailing bytes")]
    TrailingBytes(usize),
    #[error("cid string must use the base32 multibase prefix `b`")]
    UnsupportedMultibase,
    #[error("cid string is not valid base32")]
    InvalidBase32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("record `$type` is `{found}`, expected `{expected}`")]
    TypeMismatch {
        expected: &'static str,
        found: String,
    },
    #[error("record does not match the `{nsid}` schema: {message}")]
    Schema { nsid: &'static str, message: String },
    #[error("record field `{field}` is invalid: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl RecordError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
