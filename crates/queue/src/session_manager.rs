//! Lifecycle of per-entity-type enqueueing sessions.
//!
//! none -> init -> ACTIVE <-> SUSPENDED -> remove -> none
//!
//! Mutations run under `session-management:<type>` with a bounded wait and
//! return `false` when the lock could not be taken.

use db::SessionStore;
use reindex_core::{EnqueueingSession, KeyValue, OrderingProperty, SessionStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{QueueError, Result};
use crate::index_state::IndexConfiguration;
use crate::lock::{LockGuard, LockKey, LockManager};

pub struct SessionManager {
  store: Arc<dyn SessionStore>,
  locks: Arc<dyn LockManager>,
  config: Arc<dyn IndexConfiguration>,
  lock_timeout: Duration,
}

impl SessionManager {
  pub fn new(
    store: Arc<dyn SessionStore>,
    locks: Arc<dyn LockManager>,
    config: Arc<dyn IndexConfiguration>,
    lock_timeout: Duration,
  ) -> Self {
    Self {
      store,
      locks,
      config,
      lock_timeout,
    }
  }

  /// Create a fresh ACTIVE session, replacing any existing one for the type.
  ///
  /// Fails with a configuration error when the type has no usable ordering
  /// property.
  pub async fn init_session(&self, entity_type: &str) -> Result<bool> {
    let ordering = self.ordering_property(entity_type)?;

    let Some(_guard) = self.lock(entity_type).await else {
      return Ok(false);
    };

    let session = self
      .store
      .upsert_session(EnqueueingSession::new(entity_type, ordering))
      .await?;

    info!(
      entity_type = %entity_type,
      ordering_property = %session.ordering.name(),
      composite = session.ordering.is_composite(),
      "Enqueueing session initialised"
    );
    Ok(true)
  }

  /// ACTIVE -> SUSPENDED; any other state is left alone
  pub async fn suspend_session(&self, entity_type: &str) -> Result<bool> {
    self
      .transition(entity_type, SessionStatus::Active, SessionStatus::Suspended)
      .await
  }

  /// SUSPENDED -> ACTIVE; any other state is left alone
  pub async fn resume_session(&self, entity_type: &str) -> Result<bool> {
    self
      .transition(entity_type, SessionStatus::Suspended, SessionStatus::Active)
      .await
  }

  pub async fn remove_session(&self, entity_type: &str) -> Result<bool> {
    self.ensure_indexable(entity_type)?;

    let Some(_guard) = self.lock(entity_type).await else {
      return Ok(false);
    };

    if self.store.delete_session(entity_type).await? {
      info!(entity_type = %entity_type, "Enqueueing session removed");
    }
    Ok(true)
  }

  /// Delete a session without the indexable check
  pub(crate) async fn discard_session(&self, entity_type: &str) -> Result<bool> {
    let Some(_guard) = self.lock(entity_type).await else {
      return Ok(false);
    };
    Ok(self.store.delete_session(entity_type).await?)
  }

  pub async fn get_session(&self, entity_type: &str) -> Result<Option<EnqueueingSession>> {
    self.ensure_indexable(entity_type)?;
    Ok(self.store.load_session(entity_type).await?)
  }

  /// Oldest-created ACTIVE session across every entity type
  pub async fn get_next_active_session(&self) -> Result<Option<EnqueueingSession>> {
    Ok(self.store.load_oldest_active_session().await?)
  }

  pub async fn list_sessions(&self) -> Result<Vec<EnqueueingSession>> {
    Ok(self.store.list_sessions().await?)
  }

  /// Persist a new cursor, or clear it with `None`
  pub async fn update_ordering_value(&self, entity_type: &str, value: Option<&KeyValue>) -> Result<bool> {
    self.ensure_indexable(entity_type)?;

    let Some(_guard) = self.lock(entity_type).await else {
      return Ok(false);
    };

    self.write_cursor(entity_type, None, value).await?;
    Ok(true)
  }

  /// Persist a cursor only if the session is still the generation `expected_seq`.
  ///
  /// A session re-initialised after the page was read keeps its reset cursor.
  pub async fn advance_session(&self, entity_type: &str, expected_seq: i64, value: Option<&KeyValue>) -> Result<bool> {
    self.ensure_indexable(entity_type)?;

    let Some(_guard) = self.lock(entity_type).await else {
      return Ok(false);
    };

    self.write_cursor(entity_type, Some(expected_seq), value).await?;
    Ok(true)
  }

  /// Remove the session only if it is still the generation `expected_seq`
  pub async fn finish_session(&self, entity_type: &str, expected_seq: i64) -> Result<bool> {
    self.ensure_indexable(entity_type)?;

    let Some(_guard) = self.lock(entity_type).await else {
      return Ok(false);
    };

    match self.store.load_session(entity_type).await? {
      Some(session) if session.seq == expected_seq => {
        self.store.delete_session(entity_type).await?;
        info!(entity_type = %entity_type, "Enqueueing session removed");
      }
      Some(session) => {
        debug!(entity_type = %entity_type, expected_seq, current_seq = session.seq, "Session replaced; keeping it");
      }
      None => {}
    }
    Ok(true)
  }

  async fn write_cursor(&self, entity_type: &str, expected_seq: Option<i64>, value: Option<&KeyValue>) -> Result<()> {
    match self.store.load_session(entity_type).await? {
      Some(session) if expected_seq.is_some_and(|seq| seq != session.seq) => {
        debug!(entity_type = %entity_type, current_seq = session.seq, "Session replaced; cursor not written");
      }
      Some(mut session) => {
        session.last_ordering_value = value.map(KeyValue::to_text);
        self.store.upsert_session(session).await?;
        debug!(entity_type = %entity_type, cursor = ?value.map(KeyValue::to_text), "Session cursor updated");
      }
      None => {
        debug!(entity_type = %entity_type, "No session to update");
      }
    }
    Ok(())
  }

  async fn transition(&self, entity_type: &str, from: SessionStatus, to: SessionStatus) -> Result<bool> {
    self.ensure_indexable(entity_type)?;

    let Some(_guard) = self.lock(entity_type).await else {
      return Ok(false);
    };

    if let Some(mut session) = self.store.load_session(entity_type).await?
      && session.status == from
    {
      session.status = to;
      self.store.upsert_session(session).await?;
      info!(entity_type = %entity_type, status = to.as_str(), "Enqueueing session status changed");
    }
    Ok(true)
  }

  fn ensure_indexable(&self, entity_type: &str) -> Result<()> {
    if self.config.is_indexable(entity_type) {
      Ok(())
    } else {
      Err(QueueError::NotIndexable(entity_type.to_string()))
    }
  }

  fn ordering_property(&self, entity_type: &str) -> Result<OrderingProperty> {
    let descriptor = self
      .config
      .descriptor(entity_type)
      .ok_or_else(|| QueueError::NotIndexable(entity_type.to_string()))?;
    descriptor
      .ordering_property()
      .map_err(|e| QueueError::Configuration(e.to_string()))
  }

  async fn lock(&self, entity_type: &str) -> Option<LockGuard> {
    let key = LockKey::SessionManagement(entity_type.to_string());
    let guard = LockGuard::try_acquire(&self.locks, key, self.lock_timeout).await;
    if guard.is_none() {
      warn!(entity_type = %entity_type, "Session management lock unavailable");
    }
    guard
  }
}
