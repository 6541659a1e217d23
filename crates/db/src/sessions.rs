// Enqueueing sessions table operations

use arrow_array::{Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use reindex_core::{EnqueueingSession, KeyKind, OrderingProperty, SessionStatus};
use std::sync::Arc;
use tracing::debug;

use crate::connection::{DbError, LanceStore, Result, escape_sql, timestamp};
use crate::schema::enqueueing_sessions_schema;
use crate::store::{SessionStore, session_order};

impl LanceStore {
  /// Load sessions matching an optional filter, oldest first
  pub async fn load_sessions_where(&self, filter: Option<&str>) -> Result<Vec<EnqueueingSession>> {
    let table = self.sessions_table().await?;

    let query = match filter {
      Some(f) => table.query().only_if(f),
      None => table.query(),
    };

    let results: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

    let mut sessions = Vec::new();
    for batch in results {
      for i in 0..batch.num_rows() {
        sessions.push(batch_to_session(&batch, i)?);
      }
    }

    sessions.sort_by(session_order);
    Ok(sessions)
  }
}

#[async_trait]
impl SessionStore for LanceStore {
  #[tracing::instrument(level = "trace", skip(self, session), fields(entity_type = %session.entity_type))]
  async fn upsert_session(&self, mut session: EnqueueingSession) -> Result<EnqueueingSession> {
    // A new generation takes its number under the counter lease
    let _lease = if session.seq == 0 {
      let mut lease = self.lease_seq().await?;
      session.seq = lease.reserve(1)?;
      Some(lease)
    } else {
      None
    };

    let table = self.sessions_table().await?;
    table
      .delete(&format!("entity_type = '{}'", escape_sql(&session.entity_type)))
      .await?;

    let batch = session_to_batch(&session)?;
    let batches = RecordBatchIterator::new(vec![Ok(batch)], enqueueing_sessions_schema());
    table.add(Box::new(batches)).execute().await?;

    debug!(
      table = "enqueueing_sessions",
      operation = "upsert",
      entity_type = %session.entity_type,
      status = session.status.as_str(),
      cursor = ?session.last_ordering_value,
      "Session saved"
    );
    Ok(session)
  }

  async fn delete_session(&self, entity_type: &str) -> Result<bool> {
    let filter = format!("entity_type = '{}'", escape_sql(entity_type));
    let table = self.sessions_table().await?;
    let existing = table.count_rows(Some(filter.clone())).await?;
    if existing == 0 {
      return Ok(false);
    }

    table.delete(&filter).await?;
    debug!(table = "enqueueing_sessions", operation = "delete", entity_type = %entity_type, "Session deleted");
    Ok(true)
  }

  async fn load_session(&self, entity_type: &str) -> Result<Option<EnqueueingSession>> {
    let filter = format!("entity_type = '{}'", escape_sql(entity_type));
    Ok(self.load_sessions_where(Some(&filter)).await?.into_iter().next())
  }

  async fn load_oldest_active_session(&self) -> Result<Option<EnqueueingSession>> {
    let filter = format!("status = '{}'", SessionStatus::Active.as_str());
    Ok(self.load_sessions_where(Some(&filter)).await?.into_iter().next())
  }

  async fn list_sessions(&self) -> Result<Vec<EnqueueingSession>> {
    self.load_sessions_where(None).await
  }
}

fn session_to_batch(session: &EnqueueingSession) -> Result<RecordBatch> {
  let entity_type = StringArray::from(vec![session.entity_type.clone()]);
  let ordering_property = StringArray::from(vec![session.ordering.name().to_string()]);
  let ordering_kind = StringArray::from(vec![session.ordering.kind().map(|k| k.as_str().to_string())]);
  let last_ordering_value = StringArray::from(vec![session.last_ordering_value.clone()]);
  let status = StringArray::from(vec![session.status.as_str()]);
  let created_at = Int64Array::from(vec![session.created_at.timestamp_millis()]);
  let seq = Int64Array::from(vec![session.seq]);

  let batch = RecordBatch::try_new(
    enqueueing_sessions_schema(),
    vec![
      Arc::new(entity_type),
      Arc::new(ordering_property),
      Arc::new(ordering_kind),
      Arc::new(last_ordering_value),
      Arc::new(status),
      Arc::new(created_at),
      Arc::new(seq),
    ],
  )?;

  Ok(batch)
}

fn batch_to_session(batch: &RecordBatch, row: usize) -> Result<EnqueueingSession> {
  let get_string = |name: &str| -> Result<String> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<StringArray>())
      .map(|a| a.value(row).to_string())
      .ok_or_else(|| DbError::NotFound(format!("column {}", name)))
  };

  let get_optional_string = |name: &str| -> Option<String> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<StringArray>())
      .and_then(|a| if a.is_null(row) { None } else { Some(a.value(row).to_string()) })
  };

  let get_i64 = |name: &str| -> Result<i64> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
      .map(|a| a.value(row))
      .ok_or_else(|| DbError::NotFound(format!("column {}", name)))
  };

  let name = get_string("ordering_property")?;
  let ordering = match get_optional_string("ordering_kind") {
    Some(kind) => OrderingProperty::Scalar {
      name,
      kind: kind.parse::<KeyKind>().map_err(DbError::InvalidInput)?,
    },
    None => OrderingProperty::Composite { name },
  };

  Ok(EnqueueingSession {
    entity_type: get_string("entity_type")?,
    ordering,
    last_ordering_value: get_optional_string("last_ordering_value"),
    status: get_string("status")?
      .parse::<SessionStatus>()
      .map_err(DbError::InvalidInput)?,
    created_at: timestamp(get_i64("created_at")?)?,
    seq: get_i64("seq")?,
  })
}
