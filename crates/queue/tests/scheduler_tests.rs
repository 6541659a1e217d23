//! Scheduler integration tests

mod common;

use common::{MemorySource, harness_with};
use queue::spawn_scheduler;
use reindex_core::SchedulerConfig;
use std::time::Duration;
use tokio::sync::broadcast;

#[tokio::test]
async fn test_scheduler_drives_sessions_and_queue() {
  let h = harness_with(MemorySource::default().with_longs("Product", 5));
  h.manager.init_async_enqueue_index_all("Product").await.unwrap();

  let config = SchedulerConfig {
    enabled: true,
    queue_interval_secs: 1,
    session_interval_secs: 1,
  };
  let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
  let handle = spawn_scheduler(h.manager.clone(), config, shutdown_rx);

  let mut drained = false;
  for _ in 0..40 {
    tokio::time::sleep(Duration::from_millis(100)).await;
    let session_done = h.manager.sessions().get_session("Product").await.unwrap().is_none();
    if session_done && !h.indexer.calls().is_empty() && h.manager.queue_size(None).await.unwrap() == 0 {
      drained = true;
      break;
    }
  }

  shutdown_tx.send(()).unwrap();
  handle.await.unwrap();
  assert!(drained, "scheduler did not drain the session and queue");
}

#[tokio::test]
async fn test_scheduler_stops_on_shutdown() {
  let h = harness_with(MemorySource::default());
  let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
  let handle = spawn_scheduler(h.manager.clone(), SchedulerConfig::default(), shutdown_rx);

  shutdown_tx.send(()).unwrap();
  tokio::time::timeout(Duration::from_secs(2), handle)
    .await
    .expect("scheduler did not stop")
    .unwrap();
}
