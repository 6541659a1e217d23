//! Queue inspection and administration

use anyhow::{Result, bail};
use db::{QueueStore, SessionStore};
use reindex_core::{EntityRef, IndexOperation, QueueItem};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

use super::Context;

#[derive(Serialize)]
struct QueueStatus {
  total: usize,
  by_type: BTreeMap<String, usize>,
  active_sessions: usize,
  suspended_sessions: usize,
}

/// Show pending item counts and session totals
pub async fn cmd_queue_status(ctx: &Context, json: bool) -> Result<()> {
  let by_type = ctx.store.count_by_type().await?;
  let sessions = ctx.store.list_sessions().await?;
  let active = sessions.iter().filter(|s| s.is_active()).count();

  let status = QueueStatus {
    total: by_type.values().sum(),
    by_type,
    active_sessions: active,
    suspended_sessions: sessions.len() - active,
  };

  if json {
    println!("{}", serde_json::to_string_pretty(&status)?);
    return Ok(());
  }

  println!("Pending queue items: {}", status.total);
  for (entity_type, count) in &status.by_type {
    println!("  {:<24} {}", entity_type, count);
  }
  println!();
  println!(
    "Enqueueing sessions: {} active, {} suspended",
    status.active_sessions, status.suspended_sessions
  );
  Ok(())
}

/// Enqueue one INDEX or DELETE request
pub async fn cmd_queue_enqueue(ctx: &Context, entity_type: &str, id: &str, delete: bool) -> Result<()> {
  let Some(descriptor) = ctx.config.descriptor(entity_type) else {
    bail!("Entity type '{}' is not indexable", entity_type);
  };
  let key = descriptor.parse_key(id)?;
  let operation = if delete {
    IndexOperation::Delete
  } else {
    IndexOperation::Index
  };

  let entity_ref = EntityRef::new(entity_type, key);
  ctx
    .store
    .insert_items(vec![QueueItem::new(entity_ref.clone(), operation)])
    .await?;

  info!(entity_ref = %entity_ref, operation = operation.as_str(), "Enqueued");
  println!("Enqueued {} {}", operation.as_str(), entity_ref);
  Ok(())
}

/// Delete every pending item, or only those of one type
pub async fn cmd_queue_empty(ctx: &Context, entity_type: Option<&str>) -> Result<()> {
  let deleted = match entity_type {
    Some(entity_type) => ctx.store.delete_by_type(entity_type).await?,
    None => ctx.store.delete_all().await?,
  };

  match entity_type {
    Some(entity_type) => println!("Deleted {} queue items for {}", deleted, entity_type),
    None => println!("Deleted {} queue items", deleted),
  }
  Ok(())
}
