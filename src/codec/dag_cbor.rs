//! DAG-CBOR decoding into the lexicon JSON data model.

use base64::Engine;
use base64::engine::general_purpose::STANDARD_NO_PAD;
use ciborium::Value;
use serde_json::{Map, Number, Value as JsonValue};

use crate::domain::cid::Cid;

use super::DecodeError;

/// CBOR tag that marks a CID link.
pub const CID_TAG: u64 = 42;

/// Read exactly one CBOR item from the front of `reader`, advancing it.
pub fn read_value(reader: &mut &[u8]) -> Result<Value, DecodeError> {
    ciborium::from_reader(reader).map_err(|err| DecodeError::Cbor(format!("{err:?}")))
}

/// Decode a whole block into lexicon JSON.
pub fn decode_lex(bytes: &[u8]) -> Result<JsonValue, DecodeError> {
    let mut reader = bytes;
    let value = read_value(&mut reader)?;
    if !reader.is_empty() {
        return Err(DecodeError::structure(format!(
            "{} trailing bytes after record",
            reader.len()
        )));
    }
    to_lex(value)
}

/// Interpret a tag-42 value as a CID. Link payloads carry a leading `0x00` multibase byte.
pub fn cid_from_link(value: &Value) -> Result<Cid, DecodeError> {
    match value {
        Value::Tag(CID_TAG, inner) => match inner.as_ref() {
            Value::Bytes(bytes) => match bytes.split_first() {
                Some((0x00, rest)) => Ok(Cid::from_bytes(rest)?),
                _ => Err(DecodeError::structure("cid link is missing the identity prefix")),
            },
            _ => Err(DecodeError::structure("cid link payload must be bytes")),
        },
        Value::Tag(tag, _) => Err(DecodeError::UnsupportedTag(*tag)),
        _ => Err(DecodeError::structure("expected a cid link")),
    }
}

pub fn to_lex(value: Value) -> Result<JsonValue, DecodeError> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Bool(flag) => Ok(JsonValue::Bool(flag)),
        Value::Integer(integer) => {
            let wide = i128::from(integer);
            if let Ok(signed) = i64::try_from(wide) {
                Ok(JsonValue::Number(signed.into()))
            } else if let Ok(unsigned) = u64::try_from(wide) {
                Ok(JsonValue::Number(unsigned.into()))
            } else {
                Err(DecodeError::Unsupported("integer out of 64-bit range"))
            }
        }
        Value::Float(float) => Number::from_f64(float)
            .map(JsonValue::Number)
            .ok_or(DecodeError::Unsupported("non-finite float")),
        Value::Text(text) => Ok(JsonValue::String(text)),
        Value::Bytes(bytes) => {
            let mut object = Map::with_capacity(1);
            object.insert(
                "$bytes".to_string(),
                JsonValue::String(STANDARD_NO_PAD.encode(bytes)),
            );
            Ok(JsonValue::Object(object))
        }
        tagged @ Value::Tag(..) => {
            let cid = cid_from_link(&tagged)?;
            let mut object = Map::with_capacity(1);
            object.insert("$link".to_string(), JsonValue::String(cid.to_string()));
            Ok(JsonValue::Object(object))
        }
        Value::Array(items) => items
            .into_iter()
            .map(to_lex)
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        Value::Map(entries) => {
            let mut object = Map::with_capacity(entries.len());
            for (key, value) in entries {
                let Value::Text(key) = key else {
                    return Err(DecodeError::Unsupported("non-string map key"));
                };
                object.insert(key, to_lex(value)?);
            }
            Ok(JsonValue::Object(object))
        }
        _ => Err(DecodeError::Unsupported("cbor simple value")),
    }
}
