use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity_ref::EntityRef;

/// Index mutation requested by a queue item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexOperation {
  Index,
  Delete,
}

impl IndexOperation {
  pub fn as_str(&self) -> &'static str {
    match self {
      IndexOperation::Index => "INDEX",
      IndexOperation::Delete => "DELETE",
    }
  }
}

impl std::str::FromStr for IndexOperation {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s.to_uppercase().as_str() {
      "INDEX" => Ok(IndexOperation::Index),
      "DELETE" => Ok(IndexOperation::Delete),
      _ => Err(format!("Unknown index operation: {}", s)),
    }
  }
}

/// A durable request to apply one index mutation to one entity.
///
/// Never mutated after insert. `seq` is assigned by the store and is strictly
/// increasing in insertion order; it is the only tie-break between items for
/// the same reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
  pub id: Uuid,
  pub entity_ref: EntityRef,
  pub operation: IndexOperation,
  pub created_at: DateTime<Utc>,
  pub seq: i64,
}

impl QueueItem {
  /// Create an unsaved item; the store assigns `seq` on insert
  pub fn new(entity_ref: EntityRef, operation: IndexOperation) -> Self {
    Self {
      id: Uuid::now_v7(),
      entity_ref,
      operation,
      created_at: Utc::now(),
      seq: 0,
    }
  }

  pub fn entity_type(&self) -> &str {
    &self.entity_ref.entity_type
  }
}
