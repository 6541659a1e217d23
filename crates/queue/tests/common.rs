//! Shared doubles for queue integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use db::MemoryStore;
use queue::{
  BoxError, EntityIndexer, EntitySource, InMemoryLocks, IndexResult, IndexStates, LockManager, QueueManager, ScannedId,
};
use reindex_core::{Config, EntityRef, KeyValue, QueueConfig};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

pub const CONFIG: &str = r#"
[[entities]]
name = "Product"
primary_key = { property = "id", kind = "long" }

[[entities]]
name = "Customer"
primary_key = { property = "id", kind = "long" }

[[entities]]
name = "OrderLine"
composite_key = { property = "key", fields = [{ name = "order", kind = "long" }, { name = "line", kind = "int" }] }
"#;

/// One indexer invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexerCall {
  Index(Vec<EntityRef>),
  Delete(Vec<EntityRef>),
}

/// Records calls and fails the references it is told to
#[derive(Default)]
pub struct RecordingIndexer {
  calls: Mutex<Vec<IndexerCall>>,
  failing: Mutex<HashSet<EntityRef>>,
  broken: Mutex<bool>,
  gate: Mutex<Option<Arc<Notify>>>,
  entered: Notify,
}

impl RecordingIndexer {
  pub fn calls(&self) -> Vec<IndexerCall> {
    self.calls.lock().unwrap().clone()
  }

  pub fn clear_calls(&self) {
    self.calls.lock().unwrap().clear();
  }

  pub fn fail(&self, entity_ref: EntityRef) {
    self.failing.lock().unwrap().insert(entity_ref);
  }

  pub fn heal(&self) {
    self.failing.lock().unwrap().clear();
    *self.broken.lock().unwrap() = false;
  }

  /// Make every call error as a whole
  pub fn break_entirely(&self) {
    *self.broken.lock().unwrap() = true;
  }

  /// Block calls until the returned notify is signalled
  pub fn hold(&self) -> Arc<Notify> {
    let gate = Arc::new(Notify::new());
    *self.gate.lock().unwrap() = Some(gate.clone());
    gate
  }

  /// Resolves once a call has started
  pub async fn entered(&self) {
    self.entered.notified().await;
  }

  async fn record(&self, call: IndexerCall, refs: &[EntityRef]) -> Result<IndexResult, BoxError> {
    self.calls.lock().unwrap().push(call);
    self.entered.notify_one();

    let gate = self.gate.lock().unwrap().clone();
    if let Some(gate) = gate {
      gate.notified().await;
    }

    if *self.broken.lock().unwrap() {
      return Err("search cluster unreachable".into());
    }

    let failing = self.failing.lock().unwrap().clone();
    Ok(
      refs
        .iter()
        .filter(|r| failing.contains(*r))
        .fold(IndexResult::success(), |result, r| {
          result.with_failure(r.clone(), "mapping rejected document")
        }),
    )
  }
}

#[async_trait]
impl EntityIndexer for RecordingIndexer {
  async fn index_by_ids(&self, refs: &[EntityRef]) -> Result<IndexResult, BoxError> {
    self.record(IndexerCall::Index(refs.to_vec()), refs).await
  }

  async fn delete_by_ids(&self, refs: &[EntityRef]) -> Result<IndexResult, BoxError> {
    self.record(IndexerCall::Delete(refs.to_vec()), refs).await
  }
}

/// Primary datastore double: entity type -> ordering value -> reference
#[derive(Default)]
pub struct MemorySource {
  rows: Mutex<BTreeMap<String, BTreeMap<KeyValue, EntityRef>>>,
  delay: Mutex<Duration>,
  scans: Mutex<usize>,
}

impl MemorySource {
  /// Add entities with simple long ids `1..=count`
  pub fn with_longs(self, entity_type: &str, count: i64) -> Self {
    for id in 1..=count {
      self.insert(EntityRef::new(entity_type, id), KeyValue::Long(id));
    }
    self
  }

  pub fn insert(&self, entity_ref: EntityRef, ordering_value: KeyValue) {
    self
      .rows
      .lock()
      .unwrap()
      .entry(entity_ref.entity_type.clone())
      .or_default()
      .insert(ordering_value, entity_ref);
  }

  /// Slow every page load down
  pub fn with_delay(self, delay: Duration) -> Self {
    *self.delay.lock().unwrap() = delay;
    self
  }

  /// Number of page or full loads served
  pub fn scans(&self) -> usize {
    *self.scans.lock().unwrap()
  }

  async fn pause(&self) {
    *self.scans.lock().unwrap() += 1;
    let delay = *self.delay.lock().unwrap();
    if !delay.is_zero() {
      tokio::time::sleep(delay).await;
    }
  }
}

#[async_trait]
impl EntitySource for MemorySource {
  async fn load_ids(
    &self,
    entity_type: &str,
    _ordering_property: &str,
    after: Option<&KeyValue>,
    limit: usize,
  ) -> Result<Vec<ScannedId>, BoxError> {
    self.pause().await;
    let rows = self.rows.lock().unwrap();
    let Some(table) = rows.get(entity_type) else {
      return Ok(Vec::new());
    };
    Ok(
      table
        .iter()
        .filter(|(value, _)| after.is_none_or(|after| *value > after))
        .take(limit)
        .map(|(value, entity_ref)| ScannedId {
          entity_ref: entity_ref.clone(),
          ordering_value: value.clone(),
        })
        .collect(),
    )
  }

  async fn load_all_ids(&self, entity_type: &str) -> Result<Vec<EntityRef>, BoxError> {
    self.pause().await;
    let rows = self.rows.lock().unwrap();
    Ok(
      rows
        .get(entity_type)
        .map(|table| table.values().cloned().collect())
        .unwrap_or_default(),
    )
  }
}

pub struct Harness {
  pub manager: Arc<QueueManager>,
  pub store: Arc<MemoryStore>,
  pub indexer: Arc<RecordingIndexer>,
  pub source: Arc<MemorySource>,
  pub locks: Arc<InMemoryLocks>,
  pub states: Arc<IndexStates>,
}

pub fn harness() -> Harness {
  harness_with(MemorySource::default())
}

pub fn harness_with(source: MemorySource) -> Harness {
  let store = Arc::new(MemoryStore::new());
  let indexer = Arc::new(RecordingIndexer::default());
  let source = Arc::new(source);
  let locks = Arc::new(InMemoryLocks::new());
  let states = Arc::new(IndexStates::new());
  let config = Arc::new(Config::from_toml(CONFIG).unwrap());

  let settings = QueueConfig {
    session_lock_timeout_ms: 200,
    ..QueueConfig::default()
  };

  let manager = QueueManager::builder(store.clone(), store.clone(), indexer.clone(), source.clone(), config)
    .locks(locks.clone() as Arc<dyn LockManager>)
    .index_states(states.clone())
    .settings(settings)
    .build();

  Harness {
    manager: Arc::new(manager),
    store,
    indexer,
    source,
    locks,
    states,
  }
}

pub fn product(id: i64) -> EntityRef {
  EntityRef::new("Product", id)
}

pub fn customer(id: i64) -> EntityRef {
  EntityRef::new("Customer", id)
}
