//! Bulk enqueue integration tests
//!
//! Tests: synchronous enqueue-all paging, session-driven resumable scans,
//! cursor completeness, suspend/resume, composite-key fallback.

mod common;

use common::{MemorySource, harness_with, product};
use db::QueueStore;
use queue::QueueError;
use reindex_core::{EntityKey, EntityRef, KeyValue, SessionStatus};
use std::collections::HashSet;
use std::time::Duration;

async fn queued_refs(h: &common::Harness) -> Vec<EntityRef> {
  h.store
    .load_oldest(usize::MAX, &HashSet::new())
    .await
    .unwrap()
    .into_iter()
    .map(|item| item.entity_ref)
    .collect()
}

#[tokio::test]
async fn test_enqueue_all_pages_until_short_page() {
  let h = harness_with(MemorySource::default().with_longs("Product", 10));

  assert_eq!(h.manager.enqueue_all("Product", 4).await.unwrap(), 10);

  // Pages of 4, 4, 2
  assert_eq!(h.source.scans(), 3);
  let expected: Vec<EntityRef> = (1..=10).map(product).collect();
  assert_eq!(queued_refs(&h).await, expected);
}

#[tokio::test]
async fn test_enqueue_all_exact_multiple_ends_on_empty_page() {
  let h = harness_with(MemorySource::default().with_longs("Product", 6));

  assert_eq!(h.manager.enqueue_all("Product", 3).await.unwrap(), 6);
  assert_eq!(h.source.scans(), 3);
}

#[tokio::test]
async fn test_enqueue_all_non_indexable_is_noop() {
  let h = harness_with(MemorySource::default().with_longs("Invoice", 3));
  assert_eq!(h.manager.enqueue_all("Invoice", 10).await.unwrap(), 0);
  assert_eq!(h.source.scans(), 0);
}

#[tokio::test]
async fn test_enqueue_all_types() {
  let h = harness_with(
    MemorySource::default()
      .with_longs("Product", 3)
      .with_longs("Customer", 2),
  );
  assert_eq!(h.manager.enqueue_index_all_types(10).await.unwrap(), 5);
}

#[tokio::test]
async fn test_session_scan_returns_every_id_once_in_order() {
  let h = harness_with(MemorySource::default().with_longs("Product", 11));

  assert!(h.manager.init_async_enqueue_index_all("Product").await.unwrap());

  let mut rounds = 0;
  while h.manager.sessions().get_session("Product").await.unwrap().is_some() {
    h.manager.process_next_enqueueing_session(4).await.unwrap();
    rounds += 1;
    assert!(rounds < 10, "session never finished");
  }

  assert_eq!(rounds, 3);
  let expected: Vec<EntityRef> = (1..=11).map(product).collect();
  assert_eq!(queued_refs(&h).await, expected);
}

#[tokio::test]
async fn test_session_cursor_persists_between_pages() {
  let h = harness_with(MemorySource::default().with_longs("Product", 5));
  h.manager.init_async_enqueue_index_all("Product").await.unwrap();

  assert_eq!(h.manager.process_enqueueing_session("Product", 2).await.unwrap(), 2);
  let session = h.manager.sessions().get_session("Product").await.unwrap().unwrap();
  assert_eq!(session.cursor().unwrap(), Some(KeyValue::Long(2)));

  assert_eq!(h.manager.process_enqueueing_session("Product", 2).await.unwrap(), 2);
  assert_eq!(h.manager.process_enqueueing_session("Product", 2).await.unwrap(), 1);
  assert!(h.manager.sessions().get_session("Product").await.unwrap().is_none());
}

#[tokio::test]
async fn test_reinit_during_page_keeps_reset_cursor() {
  let h = harness_with(
    MemorySource::default()
      .with_longs("Product", 5)
      .with_delay(Duration::from_millis(100)),
  );
  h.manager.init_async_enqueue_index_all("Product").await.unwrap();

  let manager = h.manager.clone();
  let page = tokio::spawn(async move { manager.process_enqueueing_session("Product", 2).await });
  tokio::time::sleep(Duration::from_millis(30)).await;
  assert!(h.manager.init_async_enqueue_index_all("Product").await.unwrap());

  assert_eq!(page.await.unwrap().unwrap(), 2);
  let session = h.manager.sessions().get_session("Product").await.unwrap().unwrap();
  assert!(session.last_ordering_value.is_none());
}

#[tokio::test]
async fn test_reinit_during_last_page_keeps_new_session() {
  let h = harness_with(
    MemorySource::default()
      .with_longs("Product", 1)
      .with_delay(Duration::from_millis(100)),
  );
  h.manager.init_async_enqueue_index_all("Product").await.unwrap();

  let manager = h.manager.clone();
  let page = tokio::spawn(async move { manager.process_enqueueing_session("Product", 2).await });
  tokio::time::sleep(Duration::from_millis(30)).await;
  h.manager.init_async_enqueue_index_all("Product").await.unwrap();

  assert_eq!(page.await.unwrap().unwrap(), 1);
  let session = h.manager.sessions().get_session("Product").await.unwrap().unwrap();
  assert_eq!(session.status, SessionStatus::Active);
  assert!(session.last_ordering_value.is_none());
}

#[tokio::test]
async fn test_suspended_session_is_skipped() {
  let h = harness_with(
    MemorySource::default()
      .with_longs("Product", 3)
      .with_longs("Customer", 3),
  );
  h.manager.init_async_enqueue_index_all("Product").await.unwrap();
  h.manager.init_async_enqueue_index_all("Customer").await.unwrap();
  h.manager.sessions().suspend_session("Product").await.unwrap();

  assert_eq!(h.manager.process_next_enqueueing_session(10).await.unwrap(), 3);
  assert_eq!(h.manager.queue_size(Some("Customer")).await.unwrap(), 3);
  assert_eq!(h.manager.process_enqueueing_session("Product", 10).await.unwrap(), 0);
  assert_eq!(h.manager.process_next_enqueueing_session(10).await.unwrap(), 0);

  h.manager.sessions().resume_session("Product").await.unwrap();
  assert_eq!(h.manager.process_next_enqueueing_session(10).await.unwrap(), 3);
}

#[tokio::test]
async fn test_next_session_is_fifo() {
  let h = harness_with(
    MemorySource::default()
      .with_longs("Product", 2)
      .with_longs("Customer", 2),
  );
  h.manager.init_async_enqueue_index_all("Customer").await.unwrap();
  h.manager.init_async_enqueue_index_all("Product").await.unwrap();

  let next = h.manager.sessions().get_next_active_session().await.unwrap().unwrap();
  assert_eq!(next.entity_type, "Customer");
  assert_eq!(next.status, SessionStatus::Active);
}

#[tokio::test]
async fn test_init_all_types_creates_one_session_each() {
  let h = harness_with(MemorySource::default());
  assert_eq!(h.manager.init_async_enqueue_index_all_types().await.unwrap(), 3);
  assert_eq!(h.manager.sessions().list_sessions().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_composite_ordering_loads_everything_in_one_page() {
  let source = MemorySource::default();
  for order in 1..=3i64 {
    for line in 1..=2i32 {
      let key = EntityKey::composite([("order", KeyValue::Long(order)), ("line", KeyValue::Int(line))]);
      source.insert(
        EntityRef::new("OrderLine", key),
        KeyValue::String(format!("{}-{}", order, line)),
      );
    }
  }
  let h = harness_with(source);

  h.manager.init_async_enqueue_index_all("OrderLine").await.unwrap();
  let session = h.manager.sessions().get_session("OrderLine").await.unwrap().unwrap();
  assert!(session.ordering.is_composite());

  assert_eq!(h.manager.process_enqueueing_session("OrderLine", 2).await.unwrap(), 6);
  assert_eq!(h.source.scans(), 1);
  assert!(h.manager.sessions().get_session("OrderLine").await.unwrap().is_none());
}

#[tokio::test]
async fn test_session_operations_reject_non_indexable_types() {
  let h = harness_with(MemorySource::default());
  assert!(matches!(
    h.manager.init_async_enqueue_index_all("Invoice").await,
    Err(QueueError::NotIndexable(_))
  ));
  assert!(matches!(
    h.manager.sessions().remove_session("Invoice").await,
    Err(QueueError::NotIndexable(_))
  ));
}
