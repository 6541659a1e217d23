//! Entity references and their durable text encoding.
//!
//! A reference names one instance in the primary datastore: the entity type
//! plus its primary key. The encoded form is the durable queue-item key, so
//! it must round-trip exactly and stay stable across releases:
//!
//! ```text
//! v1|<entity type>|<tag>|<payload>
//!
//! tag  payload
//! s    raw string
//! u    hyphenated uuid
//! i    decimal i32
//! l    decimal i64
//! c    JSON object, field -> "<tag>:<text>"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::key::{EntityKey, KeyKind, KeyValue};

/// Current encoding version prefix
pub const CODEC_VERSION: &str = "v1";

const SEPARATOR: char = '|';
const COMPOSITE_TAG: char = 'c';

/// Reference to one entity instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
  pub entity_type: String,
  pub key: EntityKey,
}

impl EntityRef {
  pub fn new(entity_type: impl Into<String>, key: impl Into<EntityKey>) -> Self {
    Self {
      entity_type: entity_type.into(),
      key: key.into(),
    }
  }

  /// Encode to the stable text form
  pub fn encode(&self) -> Result<String> {
    validate_entity_type(&self.entity_type)?;

    let (tag, payload) = match &self.key {
      EntityKey::Single(value) => (value.kind().tag(), value.to_text()),
      EntityKey::Composite(fields) => {
        if fields.is_empty() {
          return Err(Error::codec("composite key has no fields"));
        }
        let tagged: BTreeMap<&str, String> = fields
          .iter()
          .map(|(name, value)| (name.as_str(), format!("{}:{}", value.kind().tag(), value.to_text())))
          .collect();
        let json = serde_json::to_string(&tagged).map_err(|e| Error::codec(e.to_string()))?;
        (COMPOSITE_TAG, json)
      }
    };

    Ok(format!(
      "{}{sep}{}{sep}{}{sep}{}",
      CODEC_VERSION,
      self.entity_type,
      tag,
      payload,
      sep = SEPARATOR
    ))
  }

  /// Decode the text form produced by [`EntityRef::encode`]
  pub fn decode(encoded: &str) -> Result<Self> {
    let mut parts = encoded.splitn(4, SEPARATOR);
    let version = parts.next().unwrap_or_default();
    if version != CODEC_VERSION {
      return Err(Error::codec(format!("unsupported reference version '{}'", version)));
    }

    let entity_type = parts
      .next()
      .ok_or_else(|| Error::codec(format!("missing entity type in '{}'", encoded)))?;
    validate_entity_type(entity_type)?;

    let tag = parts
      .next()
      .ok_or_else(|| Error::codec(format!("missing key tag in '{}'", encoded)))?;
    let payload = parts
      .next()
      .ok_or_else(|| Error::codec(format!("missing key payload in '{}'", encoded)))?;

    let mut tag_chars = tag.chars();
    let tag_char = match (tag_chars.next(), tag_chars.next()) {
      (Some(c), None) => c,
      _ => return Err(Error::codec(format!("invalid key tag '{}'", tag))),
    };

    let key = if tag_char == COMPOSITE_TAG {
      let tagged: BTreeMap<String, String> =
        serde_json::from_str(payload).map_err(|e| Error::codec(format!("invalid composite key: {}", e)))?;
      if tagged.is_empty() {
        return Err(Error::codec("composite key has no fields"));
      }
      let mut fields = BTreeMap::new();
      for (name, text) in tagged {
        let (field_tag, value) = text
          .split_once(':')
          .ok_or_else(|| Error::codec(format!("untagged composite field '{}'", name)))?;
        fields.insert(name, decode_scalar(field_tag, value)?);
      }
      EntityKey::Composite(fields)
    } else {
      EntityKey::Single(decode_scalar(tag, payload)?)
    };

    Ok(Self {
      entity_type: entity_type.to_string(),
      key,
    })
  }
}

impl fmt::Display for EntityRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}-{}", self.entity_type, self.key)
  }
}

impl std::str::FromStr for EntityRef {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    Self::decode(s)
  }
}

fn decode_scalar(tag: &str, text: &str) -> Result<KeyValue> {
  let mut chars = tag.chars();
  let kind = match (chars.next(), chars.next()) {
    (Some(c), None) => KeyKind::from_tag(c),
    _ => None,
  }
  .ok_or_else(|| Error::codec(format!("unknown key tag '{}'", tag)))?;
  KeyValue::parse(kind, text).map_err(|e| Error::codec(e.to_string()))
}

/// Entity type names are embedded verbatim in the encoded reference
pub fn validate_entity_type(entity_type: &str) -> Result<()> {
  if entity_type.is_empty() {
    return Err(Error::codec("entity type must not be empty"));
  }
  if entity_type.contains(SEPARATOR) {
    return Err(Error::codec(format!(
      "entity type '{}' must not contain '{}'",
      entity_type, SEPARATOR
    )));
  }
  Ok(())
}
