//! Storage interface consumed by the queue and session managers.
//!
//! Each method is one short write or read against the backing store; no
//! method spans a whole bulk operation.

use async_trait::async_trait;
use reindex_core::{EnqueueingSession, EntityRef, QueueItem};
use std::collections::{BTreeMap, HashSet};

use crate::connection::Result;

#[async_trait]
pub trait QueueStore: Send + Sync {
  /// Persist items in one write, assigning increasing `seq` in input order
  async fn insert_items(&self, items: Vec<QueueItem>) -> Result<Vec<QueueItem>>;

  /// Up to `limit` items with the lowest `seq`, skipping excluded entity types
  async fn load_oldest(&self, limit: usize, excluded_types: &HashSet<String>) -> Result<Vec<QueueItem>>;

  /// Remove every item for the given references with `seq <= through_seq`
  /// in a single removal. Items enqueued after the bound survive.
  async fn delete_by_refs(&self, refs: &[EntityRef], through_seq: i64) -> Result<usize>;

  async fn delete_all(&self) -> Result<usize>;

  async fn delete_by_type(&self, entity_type: &str) -> Result<usize>;

  async fn count(&self, entity_type: Option<&str>) -> Result<usize>;

  async fn count_by_type(&self) -> Result<BTreeMap<String, usize>>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
  /// Insert or replace the session for its entity type.
  ///
  /// A session with `seq == 0` is given a fresh sequence number.
  async fn upsert_session(&self, session: EnqueueingSession) -> Result<EnqueueingSession>;

  /// Returns whether a session existed
  async fn delete_session(&self, entity_type: &str) -> Result<bool>;

  async fn load_session(&self, entity_type: &str) -> Result<Option<EnqueueingSession>>;

  /// Oldest-created active session across all entity types
  async fn load_oldest_active_session(&self) -> Result<Option<EnqueueingSession>>;

  /// All sessions, oldest first
  async fn list_sessions(&self) -> Result<Vec<EnqueueingSession>>;
}

/// Sort key shared by every backend for FIFO session order
pub(crate) fn session_order(a: &EnqueueingSession, b: &EnqueueingSession) -> std::cmp::Ordering {
  a.created_at.cmp(&b.created_at).then(a.seq.cmp(&b.seq))
}
