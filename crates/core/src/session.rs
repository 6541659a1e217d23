use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::OrderingProperty;
use crate::error::Result;
use crate::key::KeyValue;

/// Status of an enqueueing session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionStatus {
  Active,
  Suspended,
}

impl SessionStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      SessionStatus::Active => "ACTIVE",
      SessionStatus::Suspended => "SUSPENDED",
    }
  }
}

impl std::str::FromStr for SessionStatus {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_uppercase().as_str() {
      "ACTIVE" => Ok(SessionStatus::Active),
      "SUSPENDED" => Ok(SessionStatus::Suspended),
      _ => Err(format!("Unknown session status: {}", s)),
    }
  }
}

/// Per-entity-type cursor for a resumable bulk reindex
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueingSession {
  /// Unique key: one session per entity type
  pub entity_type: String,
  pub ordering: OrderingProperty,
  /// Text form of the last processed ordering value
  pub last_ordering_value: Option<String>,
  pub status: SessionStatus,
  pub created_at: DateTime<Utc>,
  /// Assigned by the store; breaks ties between equal `created_at`
  pub seq: i64,
}

impl EnqueueingSession {
  /// Fresh active session with no cursor
  pub fn new(entity_type: impl Into<String>, ordering: OrderingProperty) -> Self {
    Self {
      entity_type: entity_type.into(),
      ordering,
      last_ordering_value: None,
      status: SessionStatus::Active,
      created_at: Utc::now(),
      seq: 0,
    }
  }

  pub fn is_active(&self) -> bool {
    self.status == SessionStatus::Active
  }

  /// Parse the persisted cursor back into the ordering property's scalar kind.
  ///
  /// Composite orderings never carry a cursor.
  pub fn cursor(&self) -> Result<Option<KeyValue>> {
    match (&self.last_ordering_value, self.ordering.kind()) {
      (Some(text), Some(kind)) => Ok(Some(KeyValue::parse(kind, text)?)),
      _ => Ok(None),
    }
  }
}
