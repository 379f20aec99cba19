//! Unsigned LEB128 varints as used by multiformats (CIDs, multihashes and CAR framing).

use thiserror::Error;

/// Multiformats caps varints at nine bytes (63 bits of payload).
const MAX_VARINT_BYTES: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VarintError {
    #[error("varint is truncated")]
    Truncated,
    #[error("varint exceeds {MAX_VARINT_BYTES} bytes")]
    Overflow,
    #[error("varint is not minimally encoded")]
    NotMinimal,
}

/// Decode one varint from the start of `input`, returning the value and the number of bytes read.
pub fn read_uvarint(input: &[u8]) -> Result<(u64, usize), VarintError> {
    let mut value: u64 = 0;

    for (index, byte) in input.iter().copied().enumerate() {
        if index == MAX_VARINT_BYTES {
            return Err(VarintError::Overflow);
        }

        value |= u64::from(byte & 0x7f) << (7 * index);

        if byte & 0x80 == 0 {
            if byte == 0 && index > 0 {
                return Err(VarintError::NotMinimal);
            }
            return Ok((value, index + 1));
        }
    }

    if input.len() >= MAX_VARINT_BYTES {
        Err(VarintError::Overflow)
    } else {
        Err(VarintError::Truncated)
    }
}

/// Append the varint encoding of `value` to `out`.
pub fn write_uvarint(mut value: u64, out: &mut Vec<u8>) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_single_and_multi_byte_values() {
        assert_eq!(read_uvarint(&[0x01]), Ok((1, 1)));
        assert_eq!(read_uvarint(&[0x7f, 0xff]), Ok((127, 1)));
        assert_eq!(read_uvarint(&[0x80, 0x01]), Ok((128, 2)));
        assert_eq!(read_uvarint(&[0xac, 0x02]), Ok((300, 2)));
    }

    #[test]
    fn rejects_truncated_input() {
        assert_eq!(read_uvarint(&[]), Err(VarintError::Truncated));
        assert_eq!(read_uvarint(&[0x80, 0x80]), Err(VarintError::Truncated));
    }

    #[test]
    fn rejects_overlong_and_padded_encodings() {
        assert_eq!(read_uvarint(&[0xff; 10]), Err(VarintError::Overflow));
        assert_eq!(read_uvarint(&[0x81, 0x00]), Err(VarintError::NotMinimal));
    }

    #[test]
    fn writer_output_reads_back() {
        for value in [0, 1, 127, 128, 300, 16_384, u64::from(u32::MAX)] {
            let mut buf = Vec::new();
            write_uvarint(value, &mut buf);
            assert_eq!(read_uvarint(&buf), Ok((value, buf.len())));
        }
    }
}
