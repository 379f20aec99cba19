//! Wire decoding for the repository event stream.
//!
//! - [`dag_cbor`]: DAG-CBOR values to lexicon JSON
//! - [`car`]: CAR v1 archives carried in commit `blocks`
//! - [`frame`]: two-part stream frames (header + body)

pub mod car;
pub mod dag_cbor;
pub mod frame;

#[cfg(test)]
pub(crate) mod fixtures;

use thiserror::Error;

use crate::domain::error::CidError;
use crate::util::varint::VarintError;

pub use car::{BlockMap, CarArchive, read_car};
pub use dag_cbor::decode_lex;
pub use frame::{Frame, decode_frame};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("cbor decode failed: {0}")]
    Cbor(String),
    #[error(transparent)]
    Cid(#[from] CidError),
    #[error("car framing: {0}")]
    Varint(#[from] VarintError),
    #[error("car archive is truncated")]
    Truncated,
    #[error("unsupported car version {0}")]
    CarVersion(i128),
    #[error("unsupported cbor tag {0}")]
    UnsupportedTag(u64),
    #[error("unsupported cbor value: {0}")]
    Unsupported(&'static str),
    #[error("malformed message: {0}")]
    Structure(String),
}

impl DecodeError {
    pub(crate) fn structure(message: impl Into<String>) -> Self {
        Self::Structure(message.into())
    }
}
