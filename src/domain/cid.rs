//! Content identifiers (CIDv1) as they appear in repository commits and CAR archives.

use std::fmt;
use std::str::FromStr;

use base32::Alphabet;

use crate::util::varint::{read_uvarint, write_uvarint};

use super::error::CidError;

/// Multicodec for DAG-CBOR blocks.
pub const DAG_CBOR: u64 = 0x71;
/// Multihash code for sha2-256.
pub const SHA2_256: u64 = 0x12;

const BASE32: Alphabet = Alphabet::Rfc4648 { padding: false };

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid {
    codec: u64,
    hash_code: u64,
    digest: Vec<u8>,
}

impl Cid {
    pub fn new_v1(codec: u64, hash_code: u64, digest: impl Into<Vec<u8>>) -> Self {
        Self {
            codec,
            hash_code,
            digest: digest.into(),
        }
    }

    /// Parse a binary CID from the front of `input`, returning it with the number of bytes used.
    ///
    /// CAR sections concatenate the CID and the block payload, so the length is
    /// only known after walking the multihash header.
    pub fn read_prefix(input: &[u8]) -> Result<(Self, usize), CidError> {
        let mut offset = 0;
        let mut next = |input: &[u8]| -> Result<u64, CidError> {
            let (value, used) = read_uvarint(&input[offset..])?;
            offset += used;
            Ok(value)
        };

        let version = next(input)?;
        if version != 1 {
            return Err(CidError::UnsupportedVersion(version));
        }
        let codec = next(input)?;
        let hash_code = next(input)?;
        let digest_len = next(input)? as usize;

        let remaining = input.len() - offset;
        if remaining < digest_len {
            return Err(CidError::TruncatedDigest {
                expected: digest_len,
                found: remaining,
            });
        }

        let digest = input[offset..offset + digest_len].to_vec();
        Ok((
            Self {
                codec,
                hash_code,
                digest,
            },
            offset + digest_len,
        ))
    }

    /// Parse a binary CID that must span all of `input`.
    pub fn from_bytes(input: &[u8]) -> Result<Self, CidError> {
        let (cid, used) = Self::read_prefix(input)?;
        if used != input.len() {
            return Err(CidError::TrailingBytes(input.len() - used));
        }
        Ok(cid)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(4 + self.digest.len());
        write_uvarint(1, &mut out);
        write_uvarint(self.codec, &mut out);
        write_uvarint(self.hash_code, &mut out);
        write_uvarint(self.digest.len() as u64, &mut out);
        out.extend_from_slice(&self.digest);
        out
    }

    pub fn hash_code(&self) -> u64 {
        self.hash_code
    }

    pub fn digest(&self) -> &[u8] {
        &self.digest
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = base32::encode(BASE32, &self.to_bytes());
        write!(f, "b{}", encoded.to_ascii_lowercase())
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({self})")
    }
}

impl FromStr for Cid {
    type Err = CidError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let encoded = value
            .strip_prefix('b')
            .ok_or(CidError::UnsupportedMultibase)?;
        let bytes = base32::decode(BASE32, &encoded.to_ascii_uppercase())
            .ok_or(CidError::InvalidBase32)?;
        let cid = Self::from_bytes(&bytes)?;
        // Reject uppercase input and stray trailing bits.
        if cid.to_string() != value {
            return Err(CidError::InvalidBase32);
        }
        Ok(cid)
    }
}
