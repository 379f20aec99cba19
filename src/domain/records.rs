//! Typed application records and their schema checks.
//!
//! Records arrive as lexicon JSON (see `codec::dag_cbor`). Unknown fields are
//! tolerated, required fields and constraints are enforced.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use super::cid::Cid;
use super::error::RecordError;
use super::types::RecordType;

const POST_TEXT_MAX_BYTES: usize = 3000;
const POST_LANGS_MAX: usize = 3;
const POST_TAGS_MAX: usize = 8;
const POST_TAG_MAX_BYTES: usize = 640;

/// A record schema bound to one collection.
pub trait Record: DeserializeOwned {
    const TYPE: RecordType;

    fn validate(&self) -> Result<(), RecordError>;
}

/// Check `$type`, deserialize and validate a lexicon value as `T`.
pub fn decode_record<T: Record>(value: &Value) -> Result<T, RecordError> {
    let nsid = T::TYPE.nsid();
    let found = value
        .get("$type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if found != nsid {
        return Err(RecordError::TypeMismatch {
            expected: nsid,
            found: found.to_string(),
        });
    }

    let record = T::deserialize(value).map_err(|err| RecordError::Schema {
        nsid,
        message: err.to_string(),
    })?;
    record.validate()?;
    Ok(record)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrongRef {
    pub uri: String,
    pub cid: String,
}

impl StrongRef {
    fn validate(&self, field: &'static str) -> Result<(), RecordError> {
        if !self.uri.starts_with("at://") {
            return Err(RecordError::invalid(field, "uri must be an at:// uri"));
        }
        self.cid
            .parse::<Cid>()
            .map_err(|err| RecordError::invalid(field, format!("cid: {err}")))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyRef {
    pub root: StrongRef,
    pub parent: StrongRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    pub text: String,
    pub created_at: String,
    #[serde(default)]
    pub reply: Option<ReplyRef>,
    #[serde(default)]
    pub langs: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub facets: Option<Value>,
    #[serde(default)]
    pub embed: Option<Value>,
    #[serde(default)]
    pub labels: Option<Value>,
}

impl Record for PostRecord {
    const TYPE: RecordType = RecordType::Post;

    fn validate(&self) -> Result<(), RecordError> {
        if self.text.len() > POST_TEXT_MAX_BYTES {
            return Err(RecordError::invalid(
                "text",
                format!("exceeds {POST_TEXT_MAX_BYTES} bytes"),
            ));
        }
        validate_datetime("createdAt", &self.created_at)?;
        if let Some(reply) = &self.reply {
            reply.root.validate("reply.root")?;
            reply.parent.validate("reply.parent")?;
        }
        if self.langs.len() > POST_LANGS_MAX {
            return Err(RecordError::invalid(
                "langs",
                format!("more than {POST_LANGS_MAX} entries"),
            ));
        }
        if self.tags.len() > POST_TAGS_MAX {
            return Err(RecordError::invalid(
                "tags",
                format!("more than {POST_TAGS_MAX} entries"),
            ));
        }
        if self.tags.iter().any(|tag| tag.len() > POST_TAG_MAX_BYTES) {
            return Err(RecordError::invalid(
                "tags",
                format!("entry exceeds {POST_TAG_MAX_BYTES} bytes"),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepostRecord {
    pub subject: StrongRef,
    pub created_at: String,
}

impl Record for RepostRecord {
    const TYPE: RecordType = RecordType::Repost;

    fn validate(&self) -> Result<(), RecordError> {
        self.subject.validate("subject")?;
        validate_datetime("createdAt", &self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeRecord {
    pub subject: StrongRef,
    pub created_at: String,
}

impl Record for LikeRecord {
    const TYPE: RecordType = RecordType::Like;

    fn validate(&self) -> Result<(), RecordError> {
        self.subject.validate("subject")?;
        validate_datetime("createdAt", &self.created_at)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowRecord {
    /// DID of the followed account.
    pub subject: String,
    pub created_at: String,
}

impl Record for FollowRecord {
    const TYPE: RecordType = RecordType::Follow;

    fn validate(&self) -> Result<(), RecordError> {
        if !self.subject.starts_with("did:") {
            return Err(RecordError::invalid("subject", "must be a did"));
        }
        validate_datetime("createdAt", &self.created_at)
    }
}

fn validate_datetime(field: &'static str, value: &str) -> Result<(), RecordError> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map(|_| ())
        .map_err(|err| RecordError::invalid(field, err.to_string()))
}
