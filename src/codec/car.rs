//! CAR v1 reader for the block archives embedded in commits.

use std::collections::HashMap;

use bytes::Bytes;
use ciborium::Value;
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::domain::cid::{Cid, SHA2_256};
use crate::util::varint::read_uvarint;

use super::DecodeError;
use super::dag_cbor::{cid_from_link, read_value};

/// Blocks of one archive keyed by CID.
#[derive(Debug, Clone, Default)]
pub struct BlockMap {
    blocks: HashMap<Cid, Bytes>,
}

impl BlockMap {
    pub fn get(&self, cid: &Cid) -> Option<&Bytes> {
        self.blocks.get(cid)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn insert(&mut self, cid: Cid, block: Bytes) {
        self.blocks.insert(cid, block);
    }
}

#[derive(Debug, Clone, Default)]
pub struct CarArchive {
    pub roots: Vec<Cid>,
    pub blocks: BlockMap,
}

/// Parse a CAR v1 archive.
///
/// sha2-256 blocks are checked against their CID; mismatching blocks are left
/// out of the map rather than failing the whole archive.
pub fn read_car(data: &Bytes) -> Result<CarArchive, DecodeError> {
    let (header_len, used) = read_uvarint(data)?;
    let header_end = checked_end(used, header_len, data.len())?;
    let roots = parse_header(&data[used..header_end])?;

    let mut blocks = BlockMap::default();
    let mut offset = header_end;
    while offset < data.len() {
        let (section_len, used) = read_uvarint(&data[offset..])?;
        let start = offset + used;
        let end = checked_end(start, section_len, data.len())?;

        let (cid, cid_len) = Cid::read_prefix(&data[start..end])?;
        let block = data.slice(start + cid_len..end);
        offset = end;

        if cid.hash_code() == SHA2_256 {
            let digest = Sha256::digest(&block);
            if digest.as_slice() != cid.digest() {
                warn!(cid = %cid, "discarding car block with mismatched digest");
                continue;
            }
        }

        blocks.insert(cid, block);
    }

    Ok(CarArchive { roots, blocks })
}

fn checked_end(start: usize, len: u64, total: usize) -> Result<usize, DecodeError> {
    let len = usize::try_from(len).map_err(|_| DecodeError::Truncated)?;
    start
        .checked_add(len)
        .filter(|end| *end <= total)
        .ok_or(DecodeError::Truncated)
}

fn parse_header(mut bytes: &[u8]) -> Result<Vec<Cid>, DecodeError> {
    let Value::Map(entries) = read_value(&mut bytes)? else {
        return Err(DecodeError::structure("car header must be a map"));
    };

    let mut version = None;
    let mut roots = Vec::new();
    for (key, value) in &entries {
        match (key.as_text(), value) {
            (Some("version"), Value::Integer(v)) => version = Some(i128::from(*v)),
            (Some("roots"), Value::Array(links)) => {
                roots = links.iter().map(cid_from_link).collect::<Result<_, _>>()?;
            }
            _ => {}
        }
    }

    match version {
        Some(1) => Ok(roots),
        Some(other) => Err(DecodeError::CarVersion(other)),
        None => Err(DecodeError::structure("car header is missing `version`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::fixtures::{block_for, car_bytes, post_value};

    #[test]
    fn reads_roots_and_blocks() {
        let first = block_for(&post_value("one"));
        let second = block_for(&post_value("two"));
        let data = car_bytes(&[first.0.clone()], &[first.clone(), second.clone()]);

        let archive = read_car(&data).expect("valid car");
        assert_eq!(archive.roots, vec![first.0.clone()]);
        assert_eq!(archive.blocks.len(), 2);
        assert_eq!(
            archive.blocks.get(&second.0).map(|b| b.to_vec()),
            Some(second.1)
        );
    }

    #[test]
    fn drops_blocks_whose_digest_does_not_match() {
        let (cid, _) = block_for(&post_value("claimed"));
        let (_, other_bytes) = block_for(&post_value("actual"));
        let data = car_bytes(&[], &[(cid.clone(), other_bytes)]);

        let archive = read_car(&data).expect("archive still parses");
        assert!(archive.blocks.get(&cid).is_none());
        assert!(archive.blocks.is_empty());
    }

    #[test]
    fn truncated_section_is_an_error() {
        let block = block_for(&post_value("one"));
        let data = car_bytes(&[], &[block]);
        let cut = data.slice(..data.len() - 3);
        assert_eq!(read_car(&cut).err(), Some(DecodeError::Truncated));
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(read_car(&Bytes::new()).is_err());
    }
}
