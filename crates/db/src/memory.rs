//! In-process store used by tests and short-lived tools.

use async_trait::async_trait;
use reindex_core::{EnqueueingSession, EntityRef, QueueItem};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;

use crate::connection::Result;
use crate::store::{QueueStore, SessionStore, session_order};

#[derive(Debug)]
pub struct MemoryStore {
  items: RwLock<Vec<QueueItem>>,
  sessions: RwLock<HashMap<String, EnqueueingSession>>,
  next_seq: AtomicI64,
}

impl Default for MemoryStore {
  fn default() -> Self {
    Self {
      items: RwLock::new(Vec::new()),
      sessions: RwLock::new(HashMap::new()),
      next_seq: AtomicI64::new(1),
    }
  }
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Snapshot of every stored item in `seq` order
  pub async fn items(&self) -> Vec<QueueItem> {
    self.items.read().await.clone()
  }

  fn reserve_seq(&self, count: usize) -> i64 {
    self.next_seq.fetch_add(count as i64, Ordering::SeqCst)
  }
}

#[async_trait]
impl QueueStore for MemoryStore {
  async fn insert_items(&self, items: Vec<QueueItem>) -> Result<Vec<QueueItem>> {
    let mut stored = self.items.write().await;
    let first = self.reserve_seq(items.len());
    let items: Vec<QueueItem> = items
      .into_iter()
      .enumerate()
      .map(|(offset, mut item)| {
        item.seq = first + offset as i64;
        item
      })
      .collect();
    stored.extend(items.iter().cloned());
    Ok(items)
  }

  async fn load_oldest(&self, limit: usize, excluded_types: &HashSet<String>) -> Result<Vec<QueueItem>> {
    Ok(
      self
        .items
        .read()
        .await
        .iter()
        .filter(|item| !excluded_types.contains(item.entity_type()))
        .take(limit)
        .cloned()
        .collect(),
    )
  }

  async fn delete_by_refs(&self, refs: &[EntityRef], through_seq: i64) -> Result<usize> {
    let refs: HashSet<&EntityRef> = refs.iter().collect();
    let mut stored = self.items.write().await;
    let before = stored.len();
    stored.retain(|item| item.seq > through_seq || !refs.contains(&item.entity_ref));
    Ok(before - stored.len())
  }

  async fn delete_all(&self) -> Result<usize> {
    let mut stored = self.items.write().await;
    let count = stored.len();
    stored.clear();
    Ok(count)
  }

  async fn delete_by_type(&self, entity_type: &str) -> Result<usize> {
    let mut stored = self.items.write().await;
    let before = stored.len();
    stored.retain(|item| item.entity_type() != entity_type);
    Ok(before - stored.len())
  }

  async fn count(&self, entity_type: Option<&str>) -> Result<usize> {
    let stored = self.items.read().await;
    Ok(match entity_type {
      Some(t) => stored.iter().filter(|item| item.entity_type() == t).count(),
      None => stored.len(),
    })
  }

  async fn count_by_type(&self) -> Result<BTreeMap<String, usize>> {
    let mut counts = BTreeMap::new();
    for item in self.items.read().await.iter() {
      *counts.entry(item.entity_type().to_string()).or_insert(0) += 1;
    }
    Ok(counts)
  }
}

#[async_trait]
impl SessionStore for MemoryStore {
  async fn upsert_session(&self, mut session: EnqueueingSession) -> Result<EnqueueingSession> {
    if session.seq == 0 {
      session.seq = self.reserve_seq(1);
    }
    self
      .sessions
      .write()
      .await
      .insert(session.entity_type.clone(), session.clone());
    Ok(session)
  }

  async fn delete_session(&self, entity_type: &str) -> Result<bool> {
    Ok(self.sessions.write().await.remove(entity_type).is_some())
  }

  async fn load_session(&self, entity_type: &str) -> Result<Option<EnqueueingSession>> {
    Ok(self.sessions.read().await.get(entity_type).cloned())
  }

  async fn load_oldest_active_session(&self) -> Result<Option<EnqueueingSession>> {
    Ok(
      self
        .sessions
        .read()
        .await
        .values()
        .filter(|s| s.is_active())
        .min_by(|a, b| session_order(a, b))
        .cloned(),
    )
  }

  async fn list_sessions(&self) -> Result<Vec<EnqueueingSession>> {
    let mut sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
    sessions.sort_by(session_order);
    Ok(sessions)
  }
}
