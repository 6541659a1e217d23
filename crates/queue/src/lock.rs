//! Cooperative, timeout-bounded mutual exclusion over the three queue lock
//! domains.
//!
//! Acquisition never errors: contention is reported as `false` so periodic
//! callers simply retry on their next tick.

use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::trace;

/// A (domain, key) pair naming one exclusive resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockKey {
  /// Single global key serialising every processing pass
  QueueProcessing,
  /// Synchronous or session-driven bulk enqueue of one entity type
  EnqueueAll(String),
  /// Mutations of one entity type's enqueueing session
  SessionManagement(String),
}

impl LockKey {
  pub fn domain(&self) -> &'static str {
    match self {
      LockKey::QueueProcessing => "queue-processing",
      LockKey::EnqueueAll(_) => "enqueue-all",
      LockKey::SessionManagement(_) => "session-management",
    }
  }

  /// Stable string token, e.g. `enqueue-all:Book`
  pub fn token(&self) -> String {
    match self {
      LockKey::QueueProcessing => self.domain().to_string(),
      LockKey::EnqueueAll(entity_type) | LockKey::SessionManagement(entity_type) => {
        format!("{}:{}", self.domain(), entity_type)
      }
    }
  }
}

impl fmt::Display for LockKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.token())
  }
}

#[async_trait]
pub trait LockManager: Send + Sync {
  /// Try to take `key`, waiting at most `timeout`. A zero timeout makes a
  /// single attempt.
  async fn try_acquire(&self, key: &LockKey, timeout: Duration) -> bool;

  /// Release `key`. Releasing a key that is not held is a no-op.
  fn release(&self, key: &LockKey);
}

/// Holds a lock until dropped, so every exit path releases it
pub struct LockGuard {
  locks: Arc<dyn LockManager>,
  key: LockKey,
}

impl LockGuard {
  /// Acquire `key` or return `None` on contention
  pub async fn try_acquire(locks: &Arc<dyn LockManager>, key: LockKey, timeout: Duration) -> Option<Self> {
    if locks.try_acquire(&key, timeout).await {
      trace!(lock = %key, "Lock acquired");
      Some(Self {
        locks: Arc::clone(locks),
        key,
      })
    } else {
      trace!(lock = %key, timeout_ms = timeout.as_millis() as u64, "Lock unavailable");
      None
    }
  }

  pub fn key(&self) -> &LockKey {
    &self.key
  }
}

impl Drop for LockGuard {
  fn drop(&mut self) {
    self.locks.release(&self.key);
    trace!(lock = %self.key, "Lock released");
  }
}

/// Single-process lock registry
#[derive(Default)]
pub struct InMemoryLocks {
  mutexes: DashMap<String, Arc<Mutex<()>>>,
  held: DashMap<String, OwnedMutexGuard<()>>,
}

impl InMemoryLocks {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_held(&self, key: &LockKey) -> bool {
    self.held.contains_key(&key.token())
  }
}

#[async_trait]
impl LockManager for InMemoryLocks {
  async fn try_acquire(&self, key: &LockKey, timeout: Duration) -> bool {
    let token = key.token();
    let mutex = self.mutexes.entry(token.clone()).or_default().clone();

    let guard = if timeout.is_zero() {
      mutex.try_lock_owned().ok()
    } else {
      tokio::time::timeout(timeout, mutex.lock_owned()).await.ok()
    };

    match guard {
      Some(guard) => {
        self.held.insert(token, guard);
        true
      }
      None => false,
    }
  }

  fn release(&self, key: &LockKey) {
    self.held.remove(&key.token());
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_tokens() {
    assert_eq!(LockKey::QueueProcessing.token(), "queue-processing");
    assert_eq!(LockKey::EnqueueAll("Book".into()).token(), "enqueue-all:Book");
    assert_eq!(
      LockKey::SessionManagement("Book".into()).token(),
      "session-management:Book"
    );
  }

  #[tokio::test]
  async fn test_second_acquire_fails_until_release() {
    let locks = InMemoryLocks::new();
    let key = LockKey::QueueProcessing;

    assert!(locks.try_acquire(&key, Duration::ZERO).await);
    assert!(!locks.try_acquire(&key, Duration::from_millis(20)).await);

    locks.release(&key);
    assert!(locks.try_acquire(&key, Duration::ZERO).await);
  }

  #[tokio::test]
  async fn test_domains_are_independent() {
    let locks = InMemoryLocks::new();

    assert!(locks.try_acquire(&LockKey::EnqueueAll("Book".into()), Duration::ZERO).await);
    assert!(locks.try_acquire(&LockKey::EnqueueAll("Author".into()), Duration::ZERO).await);
    assert!(
      locks
        .try_acquire(&LockKey::SessionManagement("Book".into()), Duration::ZERO)
        .await
    );
    assert!(locks.try_acquire(&LockKey::QueueProcessing, Duration::ZERO).await);
  }

  #[tokio::test]
  async fn test_waiter_acquires_after_release() {
    let locks: Arc<dyn LockManager> = Arc::new(InMemoryLocks::new());
    let key = LockKey::SessionManagement("Book".into());

    let guard = LockGuard::try_acquire(&locks, key.clone(), Duration::ZERO).await.unwrap();

    let waiter = {
      let locks = Arc::clone(&locks);
      let key = key.clone();
      tokio::spawn(async move { locks.try_acquire(&key, Duration::from_secs(5)).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(guard);

    assert!(waiter.await.unwrap());
  }

  #[tokio::test]
  async fn test_guard_releases_on_drop() {
    let locks: Arc<dyn LockManager> = Arc::new(InMemoryLocks::new());
    {
      let _guard = LockGuard::try_acquire(&locks, LockKey::QueueProcessing, Duration::ZERO)
        .await
        .unwrap();
      assert!(
        LockGuard::try_acquire(&locks, LockKey::QueueProcessing, Duration::ZERO)
          .await
          .is_none()
      );
    }
    assert!(
      LockGuard::try_acquire(&locks, LockKey::QueueProcessing, Duration::ZERO)
        .await
        .is_some()
    );
  }
}
