//! Lock discipline integration tests
//!
//! Tests: enqueue-all exclusion per type, independent types, global
//! processing exclusion, session-management contention.

mod common;

use common::{MemorySource, harness, harness_with, product};
use queue::{LockKey, LockManager};
use std::time::Duration;

#[tokio::test]
async fn test_concurrent_enqueue_all_same_type_runs_once() {
  let h = harness_with(
    MemorySource::default()
      .with_longs("Customer", 20)
      .with_delay(Duration::from_millis(50)),
  );

  let (first, second) = tokio::join!(
    h.manager.enqueue_all("Customer", 5),
    h.manager.enqueue_all("Customer", 5)
  );

  let mut counts = vec![first.unwrap(), second.unwrap()];
  counts.sort();
  assert_eq!(counts, vec![0, 20]);
  assert_eq!(h.manager.queue_size(Some("Customer")).await.unwrap(), 20);
}

#[tokio::test]
async fn test_enqueue_all_different_types_run_concurrently() {
  let h = harness_with(
    MemorySource::default()
      .with_longs("Customer", 6)
      .with_longs("Product", 4)
      .with_delay(Duration::from_millis(30)),
  );

  let (customers, products) = tokio::join!(
    h.manager.enqueue_all("Customer", 2),
    h.manager.enqueue_all("Product", 2)
  );

  assert_eq!(customers.unwrap(), 6);
  assert_eq!(products.unwrap(), 4);
}

#[tokio::test]
async fn test_enqueue_all_does_not_wait_for_lock() {
  let h = harness_with(MemorySource::default().with_longs("Customer", 3));
  let key = LockKey::EnqueueAll("Customer".to_string());
  assert!(h.locks.try_acquire(&key, Duration::ZERO).await);

  assert_eq!(h.manager.enqueue_all("Customer", 10).await.unwrap(), 0);
  assert_eq!(h.source.scans(), 0);

  h.locks.release(&key);
  assert_eq!(h.manager.enqueue_all("Customer", 10).await.unwrap(), 3);
}

#[tokio::test]
async fn test_processing_is_globally_serialised() {
  let h = harness();
  h.manager.enqueue_index_by_ids("Product", [1i64, 2]).await.unwrap();
  let gate = h.indexer.hold();

  let first = {
    let manager = h.manager.clone();
    tokio::spawn(async move { manager.process_entire_queue(10).await })
  };
  h.indexer.entered().await;

  // Blocked pass holds the lock; a second caller returns immediately
  assert_eq!(h.manager.process_next_batch(10).await.unwrap(), 0);
  assert!(h.locks.is_held(&LockKey::QueueProcessing));

  gate.notify_one();
  assert_eq!(first.await.unwrap().unwrap(), 2);
  assert!(!h.locks.is_held(&LockKey::QueueProcessing));
  assert_eq!(h.indexer.calls().len(), 1);
}

#[tokio::test]
async fn test_enqueue_proceeds_while_processing() {
  let h = harness();
  h.manager.enqueue_index(product(1)).await.unwrap();
  let gate = h.indexer.hold();

  let pass = {
    let manager = h.manager.clone();
    tokio::spawn(async move { manager.process_next_batch(10).await })
  };
  h.indexer.entered().await;

  assert_eq!(h.manager.enqueue_index(product(2)).await.unwrap(), 1);

  gate.notify_one();
  pass.await.unwrap().unwrap();
  assert_eq!(h.manager.queue_size(None).await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_session_init_leaves_locks_free() {
  let h = harness_with(MemorySource::default());
  h.manager.init_async_enqueue_index_all("Product").await.unwrap();

  // Configuration errors exit before taking the lock; the session lock stays free
  assert!(h.manager.init_async_enqueue_index_all("Invoice").await.is_err());
  assert!(!h.locks.is_held(&LockKey::SessionManagement("Invoice".to_string())));
  assert!(!h.locks.is_held(&LockKey::SessionManagement("Product".to_string())));
}

#[tokio::test]
async fn test_session_mutation_times_out_under_contention() {
  let h = harness_with(MemorySource::default());
  let key = LockKey::SessionManagement("Product".to_string());
  assert!(h.locks.try_acquire(&key, Duration::ZERO).await);

  let started = std::time::Instant::now();
  assert!(!h.manager.init_async_enqueue_index_all("Product").await.unwrap());
  assert!(started.elapsed() >= Duration::from_millis(150));

  h.locks.release(&key);
  assert!(h.manager.init_async_enqueue_index_all("Product").await.unwrap());
}
