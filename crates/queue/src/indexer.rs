use async_trait::async_trait;
use reindex_core::EntityRef;
use std::collections::HashSet;

use crate::error::BoxError;

/// One reference the indexer could not process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexFailure {
  pub entity_ref: EntityRef,
  pub reason: String,
}

/// Outcome of a bulk indexer call; references not listed succeeded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexResult {
  pub failures: Vec<IndexFailure>,
}

impl IndexResult {
  pub fn success() -> Self {
    Self::default()
  }

  pub fn with_failure(mut self, entity_ref: EntityRef, reason: impl Into<String>) -> Self {
    self.failures.push(IndexFailure {
      entity_ref,
      reason: reason.into(),
    });
    self
  }

  pub fn failed_refs(&self) -> HashSet<&EntityRef> {
    self.failures.iter().map(|f| &f.entity_ref).collect()
  }
}

/// Client that writes to the search index.
///
/// Both calls must be idempotent: items whose removal fails after a
/// successful call are dispatched again on a later pass.
#[async_trait]
pub trait EntityIndexer: Send + Sync {
  async fn index_by_ids(&self, refs: &[EntityRef]) -> Result<IndexResult, BoxError>;

  async fn delete_by_ids(&self, refs: &[EntityRef]) -> Result<IndexResult, BoxError>;
}
