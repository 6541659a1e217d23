//! Primary-key scalars and their text form.
//!
//! Cursor values are persisted as text and parsed back into the ordering
//! property's scalar kind before being used as a comparison bound.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Scalar kinds usable as a key or ordering property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyKind {
  String,
  Uuid,
  Int,
  Long,
}

impl KeyKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      KeyKind::String => "string",
      KeyKind::Uuid => "uuid",
      KeyKind::Int => "int",
      KeyKind::Long => "long",
    }
  }

  /// Single-character tag used by the entity reference codec
  pub fn tag(&self) -> char {
    match self {
      KeyKind::String => 's',
      KeyKind::Uuid => 'u',
      KeyKind::Int => 'i',
      KeyKind::Long => 'l',
    }
  }

  pub fn from_tag(tag: char) -> Option<Self> {
    match tag {
      's' => Some(KeyKind::String),
      'u' => Some(KeyKind::Uuid),
      'i' => Some(KeyKind::Int),
      'l' => Some(KeyKind::Long),
      _ => None,
    }
  }
}

impl std::str::FromStr for KeyKind {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_lowercase().as_str() {
      "string" => Ok(KeyKind::String),
      "uuid" => Ok(KeyKind::Uuid),
      "int" | "integer" => Ok(KeyKind::Int),
      "long" => Ok(KeyKind::Long),
      _ => Err(format!("Unknown key kind: {}", s)),
    }
  }
}

/// A single primary-key or ordering-property value
///
/// Ordering is only meaningful between values of the same kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum KeyValue {
  String(String),
  Uuid(Uuid),
  Int(i32),
  Long(i64),
}

impl KeyValue {
  pub fn kind(&self) -> KeyKind {
    match self {
      KeyValue::String(_) => KeyKind::String,
      KeyValue::Uuid(_) => KeyKind::Uuid,
      KeyValue::Int(_) => KeyKind::Int,
      KeyValue::Long(_) => KeyKind::Long,
    }
  }

  /// Parse the text form of a value of the given kind
  pub fn parse(kind: KeyKind, text: &str) -> Result<Self> {
    match kind {
      KeyKind::String => Ok(KeyValue::String(text.to_string())),
      KeyKind::Uuid => Uuid::parse_str(text)
        .map(KeyValue::Uuid)
        .map_err(|e| Error::invalid_key(format!("'{}' is not a uuid: {}", text, e))),
      KeyKind::Int => text
        .parse::<i32>()
        .map(KeyValue::Int)
        .map_err(|e| Error::invalid_key(format!("'{}' is not an int: {}", text, e))),
      KeyKind::Long => text
        .parse::<i64>()
        .map(KeyValue::Long)
        .map_err(|e| Error::invalid_key(format!("'{}' is not a long: {}", text, e))),
    }
  }

  pub fn to_text(&self) -> String {
    match self {
      KeyValue::String(s) => s.clone(),
      KeyValue::Uuid(u) => u.to_string(),
      KeyValue::Int(i) => i.to_string(),
      KeyValue::Long(l) => l.to_string(),
    }
  }
}

impl fmt::Display for KeyValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.to_text())
  }
}

impl From<&str> for KeyValue {
  fn from(value: &str) -> Self {
    KeyValue::String(value.to_string())
  }
}

impl From<String> for KeyValue {
  fn from(value: String) -> Self {
    KeyValue::String(value)
  }
}

impl From<Uuid> for KeyValue {
  fn from(value: Uuid) -> Self {
    KeyValue::Uuid(value)
  }
}

impl From<i32> for KeyValue {
  fn from(value: i32) -> Self {
    KeyValue::Int(value)
  }
}

impl From<i64> for KeyValue {
  fn from(value: i64) -> Self {
    KeyValue::Long(value)
  }
}

/// Primary key of an entity instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityKey {
  Single(KeyValue),
  /// Composite key, field name -> value
  Composite(BTreeMap<String, KeyValue>),
}

impl EntityKey {
  pub fn composite<I, K>(fields: I) -> Self
  where
    I: IntoIterator<Item = (K, KeyValue)>,
    K: Into<String>,
  {
    EntityKey::Composite(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
  }

  pub fn as_single(&self) -> Option<&KeyValue> {
    match self {
      EntityKey::Single(v) => Some(v),
      EntityKey::Composite(_) => None,
    }
  }
}

impl From<KeyValue> for EntityKey {
  fn from(value: KeyValue) -> Self {
    EntityKey::Single(value)
  }
}

macro_rules! single_key_from {
  ($($ty:ty),*) => {
    $(
      impl From<$ty> for EntityKey {
        fn from(value: $ty) -> Self {
          EntityKey::Single(KeyValue::from(value))
        }
      }
    )*
  };
}

single_key_from!(&str, String, Uuid, i32, i64);

impl fmt::Display for EntityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      EntityKey::Single(v) => write!(f, "{}", v),
      EntityKey::Composite(fields) => {
        let parts: Vec<String> = fields.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        write!(f, "({})", parts.join(", "))
      }
    }
  }
}
