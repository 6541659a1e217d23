//! Queue orchestration: enqueue, bulk enqueue-all, and the
//! dequeue/aggregate/dispatch/cleanup processing loop.

use db::{QueueStore, SessionStore};
use reindex_core::{EnqueueingSession, EntityKey, EntityRef, IndexOperation, QueueConfig, QueueItem};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::aggregate::{AggregatedBatch, aggregate};
use crate::error::{QueueError, Result};
use crate::index_state::{IndexConfiguration, IndexStateRegistry, IndexStates};
use crate::indexer::EntityIndexer;
use crate::loader::EntityIdsLoader;
use crate::lock::{InMemoryLocks, LockGuard, LockKey, LockManager};
use crate::session_manager::SessionManager;
use crate::source::EntitySource;

/// Outcome of one dequeue/dispatch/cleanup pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchOutcome {
  pub dequeued: usize,
  pub deleted: usize,
  pub failed_refs: usize,
}

pub struct QueueManager {
  queue: Arc<dyn QueueStore>,
  sessions: SessionManager,
  loader: EntityIdsLoader,
  indexer: Arc<dyn EntityIndexer>,
  config: Arc<dyn IndexConfiguration>,
  states: Arc<dyn IndexStateRegistry>,
  locks: Arc<dyn LockManager>,
  settings: QueueConfig,
}

pub struct QueueManagerBuilder {
  queue: Arc<dyn QueueStore>,
  sessions: Arc<dyn SessionStore>,
  indexer: Arc<dyn EntityIndexer>,
  source: Arc<dyn EntitySource>,
  config: Arc<dyn IndexConfiguration>,
  states: Option<Arc<dyn IndexStateRegistry>>,
  locks: Option<Arc<dyn LockManager>>,
  settings: QueueConfig,
}

impl QueueManagerBuilder {
  pub fn locks(mut self, locks: Arc<dyn LockManager>) -> Self {
    self.locks = Some(locks);
    self
  }

  pub fn index_states(mut self, states: Arc<dyn IndexStateRegistry>) -> Self {
    self.states = Some(states);
    self
  }

  pub fn settings(mut self, settings: QueueConfig) -> Self {
    self.settings = settings;
    self
  }

  pub fn build(self) -> QueueManager {
    let locks = self.locks.unwrap_or_else(|| Arc::new(InMemoryLocks::new()));
    let sessions = SessionManager::new(
      self.sessions,
      Arc::clone(&locks),
      Arc::clone(&self.config),
      self.settings.session_lock_timeout(),
    );

    QueueManager {
      queue: self.queue,
      sessions,
      loader: EntityIdsLoader::new(self.source),
      indexer: self.indexer,
      config: self.config,
      states: self.states.unwrap_or_else(|| Arc::new(IndexStates::new())),
      locks,
      settings: self.settings,
    }
  }
}

impl QueueManager {
  pub fn builder(
    queue: Arc<dyn QueueStore>,
    sessions: Arc<dyn SessionStore>,
    indexer: Arc<dyn EntityIndexer>,
    source: Arc<dyn EntitySource>,
    config: Arc<dyn IndexConfiguration>,
  ) -> QueueManagerBuilder {
    QueueManagerBuilder {
      queue,
      sessions,
      indexer,
      source,
      config,
      states: None,
      locks: None,
      settings: QueueConfig::default(),
    }
  }

  pub fn sessions(&self) -> &SessionManager {
    &self.sessions
  }

  pub fn settings(&self) -> &QueueConfig {
    &self.settings
  }

  // ==========================================================================
  // Enqueue
  // ==========================================================================

  pub async fn enqueue_index(&self, entity_ref: EntityRef) -> Result<usize> {
    self.enqueue([entity_ref], IndexOperation::Index).await
  }

  pub async fn enqueue_index_many(&self, refs: impl IntoIterator<Item = EntityRef>) -> Result<usize> {
    self.enqueue(refs, IndexOperation::Index).await
  }

  pub async fn enqueue_index_by_ids<K: Into<EntityKey>>(
    &self,
    entity_type: &str,
    ids: impl IntoIterator<Item = K>,
  ) -> Result<usize> {
    self
      .enqueue(ids.into_iter().map(|id| EntityRef::new(entity_type, id)), IndexOperation::Index)
      .await
  }

  pub async fn enqueue_delete(&self, entity_ref: EntityRef) -> Result<usize> {
    self.enqueue([entity_ref], IndexOperation::Delete).await
  }

  pub async fn enqueue_delete_many(&self, refs: impl IntoIterator<Item = EntityRef>) -> Result<usize> {
    self.enqueue(refs, IndexOperation::Delete).await
  }

  pub async fn enqueue_delete_by_ids<K: Into<EntityKey>>(
    &self,
    entity_type: &str,
    ids: impl IntoIterator<Item = K>,
  ) -> Result<usize> {
    self
      .enqueue(ids.into_iter().map(|id| EntityRef::new(entity_type, id)), IndexOperation::Delete)
      .await
  }

  /// Persist one item per indexable reference in a single write.
  /// References of non-indexable types are skipped.
  async fn enqueue(&self, refs: impl IntoIterator<Item = EntityRef>, operation: IndexOperation) -> Result<usize> {
    let mut skipped = 0;
    let items: Vec<QueueItem> = refs
      .into_iter()
      .filter(|r| {
        let indexable = self.config.is_indexable(&r.entity_type);
        if !indexable {
          skipped += 1;
        }
        indexable
      })
      .map(|r| QueueItem::new(r, operation))
      .collect();

    if skipped > 0 {
      debug!(skipped = skipped, "Skipped references of non-indexable types");
    }
    if items.is_empty() {
      return Ok(0);
    }

    let inserted = self.queue.insert_items(items).await?.len();
    debug!(count = inserted, operation = operation.as_str(), "Enqueued");
    Ok(inserted)
  }

  // ==========================================================================
  // Enqueue all
  // ==========================================================================

  /// Enqueue INDEX for every existing instance of the type.
  ///
  /// Returns 0 without waiting when another enqueue-all for the type is
  /// running.
  pub async fn enqueue_all(&self, entity_type: &str, batch_size: usize) -> Result<usize> {
    let Some(descriptor) = self.config.descriptor(entity_type) else {
      debug!(entity_type = %entity_type, "Not indexable, skipping enqueue-all");
      return Ok(0);
    };
    let ordering = descriptor
      .ordering_property()
      .map_err(|e| QueueError::Configuration(e.to_string()))?;

    let Some(_guard) = self.lock_enqueue_all(entity_type).await else {
      return Ok(0);
    };

    let batch_size = batch_size.max(1);
    let mut scan = EnqueueingSession::new(entity_type, ordering);
    let mut total = 0;

    loop {
      let page = self.loader.load_next(&scan, batch_size).await?;
      total += self.enqueue(page.refs, IndexOperation::Index).await?;
      if page.complete {
        break;
      }
      scan.last_ordering_value = page.last_ordering_value.map(|v| v.to_text());
    }

    info!(entity_type = %entity_type, count = total, "Enqueue-all finished");
    Ok(total)
  }

  /// `enqueue_all` for every indexable type
  pub async fn enqueue_index_all_types(&self, batch_size: usize) -> Result<usize> {
    let mut total = 0;
    for entity_type in self.config.indexable_types() {
      total += self.enqueue_all(&entity_type, batch_size).await?;
    }
    Ok(total)
  }

  // ==========================================================================
  // Session-driven enqueue-all
  // ==========================================================================

  /// Start a resumable bulk reindex of one type
  pub async fn init_async_enqueue_index_all(&self, entity_type: &str) -> Result<bool> {
    self.sessions.init_session(entity_type).await
  }

  /// Start resumable bulk reindexes of every indexable type; returns how many
  /// sessions were created
  pub async fn init_async_enqueue_index_all_types(&self) -> Result<usize> {
    let mut created = 0;
    for entity_type in self.config.indexable_types() {
      if self.sessions.init_session(&entity_type).await? {
        created += 1;
      }
    }
    Ok(created)
  }

  /// Advance the oldest active session by one page
  pub async fn process_next_enqueueing_session(&self, batch_size: usize) -> Result<usize> {
    let Some(session) = self.sessions.get_next_active_session().await? else {
      return Ok(0);
    };

    // A type dropped from the configuration would otherwise block the FIFO
    if !self.config.is_indexable(&session.entity_type) {
      warn!(entity_type = %session.entity_type, "Discarding session of a type that is no longer indexable");
      self.sessions.discard_session(&session.entity_type).await?;
      return Ok(0);
    }

    self.process_enqueueing_session(&session.entity_type, batch_size).await
  }

  /// Enqueue one page for the type's session, then advance its cursor or
  /// remove it when the scan is done
  pub async fn process_enqueueing_session(&self, entity_type: &str, batch_size: usize) -> Result<usize> {
    let Some(_guard) = self.lock_enqueue_all(entity_type).await else {
      return Ok(0);
    };

    let session = match self.sessions.get_session(entity_type).await? {
      Some(session) if session.is_active() => session,
      _ => return Ok(0),
    };

    let page = self.loader.load_next(&session, batch_size.max(1)).await?;
    let enqueued = self.enqueue(page.refs, IndexOperation::Index).await?;

    if page.complete {
      if !self.sessions.finish_session(entity_type, session.seq).await? {
        warn!(entity_type = %entity_type, "Could not remove finished session; it will rescan");
      }
      info!(entity_type = %entity_type, count = enqueued, "Enqueueing session finished");
    } else if !self
      .sessions
      .advance_session(entity_type, session.seq, page.last_ordering_value.as_ref())
      .await?
    {
      warn!(entity_type = %entity_type, "Could not persist session cursor; page will be enqueued again");
    }

    Ok(enqueued)
  }

  // ==========================================================================
  // Processing
  // ==========================================================================

  pub async fn process_next_batch(&self, batch_size: usize) -> Result<usize> {
    self.process(batch_size, false).await
  }

  pub async fn process_next_batch_default(&self) -> Result<usize> {
    self.process(self.settings.batch_size, false).await
  }

  /// Process batches until the queue is drained or a pass makes no progress
  pub async fn process_entire_queue(&self, batch_size: usize) -> Result<usize> {
    self.process(batch_size, true).await
  }

  pub async fn process_entire_queue_default(&self) -> Result<usize> {
    self.process(self.settings.batch_size, true).await
  }

  /// Returns the number of queue items removed
  async fn process(&self, batch_size: usize, entire: bool) -> Result<usize> {
    let timeout = self.settings.processing_lock_timeout();
    let Some(_guard) = LockGuard::try_acquire(&self.locks, LockKey::QueueProcessing, timeout).await else {
      debug!("Queue processing already running");
      return Ok(0);
    };

    let batch_size = batch_size.max(1);
    let mut total = 0;

    loop {
      let outcome = self.process_batch(batch_size).await?;
      total += outcome.deleted;

      if !entire || outcome.dequeued < batch_size {
        break;
      }
      if outcome.deleted == 0 {
        warn!(
          failed_refs = outcome.failed_refs,
          "Full batch made no progress, stopping until the next pass"
        );
        break;
      }
    }

    Ok(total)
  }

  async fn process_batch(&self, batch_size: usize) -> Result<BatchOutcome> {
    let excluded = self.states.unavailable_entity_types();
    let items = self.queue.load_oldest(batch_size, &excluded).await?;
    let dequeued = items.len();
    if dequeued == 0 {
      return Ok(BatchOutcome::default());
    }

    let batch = aggregate(items);
    let mut failed: HashSet<EntityRef> = HashSet::new();

    if !batch.index.is_empty() {
      failed.extend(self.dispatch(&batch.index, IndexOperation::Index).await);
    }
    if !batch.delete.is_empty() {
      failed.extend(self.dispatch(&batch.delete, IndexOperation::Delete).await);
    }

    let succeeded = succeeded_refs(&batch, &failed);
    let deleted = if succeeded.is_empty() {
      0
    } else {
      self.queue.delete_by_refs(&succeeded, batch.max_seq).await?
    };

    debug!(
      dequeued = dequeued,
      refs = batch.groups.len(),
      index = batch.index.len(),
      delete = batch.delete.len(),
      failed = failed.len(),
      deleted = deleted,
      "Processed queue batch"
    );

    Ok(BatchOutcome {
      dequeued,
      deleted,
      failed_refs: failed.len(),
    })
  }

  /// Send one group to the indexer; returns the references that failed
  async fn dispatch(&self, refs: &[EntityRef], operation: IndexOperation) -> Vec<EntityRef> {
    let result = match operation {
      IndexOperation::Index => self.indexer.index_by_ids(refs).await,
      IndexOperation::Delete => self.indexer.delete_by_ids(refs).await,
    };

    match result {
      Ok(result) => {
        let requested: HashSet<&EntityRef> = refs.iter().collect();
        result
          .failures
          .into_iter()
          .filter(|f| requested.contains(&f.entity_ref))
          .map(|f| {
            warn!(
              entity_ref = %f.entity_ref,
              operation = operation.as_str(),
              reason = %f.reason,
              "Indexing failed, item stays queued"
            );
            f.entity_ref
          })
          .collect()
      }
      Err(e) => {
        warn!(
          count = refs.len(),
          operation = operation.as_str(),
          err = %e,
          "Indexer call failed, items stay queued"
        );
        refs.to_vec()
      }
    }
  }

  // ==========================================================================
  // Administration
  // ==========================================================================

  pub async fn empty_queue(&self) -> Result<usize> {
    let deleted = self.queue.delete_all().await?;
    info!(deleted = deleted, "Queue emptied");
    Ok(deleted)
  }

  pub async fn empty_queue_by_type(&self, entity_type: &str) -> Result<usize> {
    let deleted = self.queue.delete_by_type(entity_type).await?;
    info!(entity_type = %entity_type, deleted = deleted, "Queue emptied for type");
    Ok(deleted)
  }

  pub async fn queue_size(&self, entity_type: Option<&str>) -> Result<usize> {
    Ok(self.queue.count(entity_type).await?)
  }

  pub async fn queue_size_by_type(&self) -> Result<BTreeMap<String, usize>> {
    Ok(self.queue.count_by_type().await?)
  }

  async fn lock_enqueue_all(&self, entity_type: &str) -> Option<LockGuard> {
    let key = LockKey::EnqueueAll(entity_type.to_string());
    let guard = LockGuard::try_acquire(&self.locks, key, self.settings.enqueue_all_lock_timeout()).await;
    if guard.is_none() {
      debug!(entity_type = %entity_type, "Enqueue-all already running for type");
    }
    guard
  }
}

fn succeeded_refs(batch: &AggregatedBatch, failed: &HashSet<EntityRef>) -> Vec<EntityRef> {
  batch
    .index
    .iter()
    .chain(batch.delete.iter())
    .filter(|r| !failed.contains(*r))
    .cloned()
    .collect()
}
