// Queue items table operations

use arrow_array::{Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use reindex_core::{EntityRef, IndexOperation, QueueItem};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::connection::{DbError, LanceStore, Result, escape_sql, seq_values, sql_in_list, timestamp};
use crate::schema::queue_items_schema;
use crate::store::QueueStore;

impl LanceStore {
  /// Load every queue item matching an optional filter, in `seq` order
  pub async fn load_all_items(&self, filter: Option<&str>) -> Result<Vec<QueueItem>> {
    let table = self.queue_items_table().await?;

    let query = match filter {
      Some(f) => table.query().only_if(f),
      None => table.query(),
    };

    let results: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

    let mut items = Vec::new();
    for batch in results {
      for i in 0..batch.num_rows() {
        items.push(batch_to_queue_item(&batch, i)?);
      }
    }

    // LanceDB returns rows in storage order
    items.sort_by_key(|item| item.seq);
    Ok(items)
  }
}

#[async_trait]
impl QueueStore for LanceStore {
  #[tracing::instrument(level = "trace", skip(self, items), fields(count = items.len()))]
  async fn insert_items(&self, items: Vec<QueueItem>) -> Result<Vec<QueueItem>> {
    if items.is_empty() {
      return Ok(items);
    }

    let mut lease = self.lease_seq().await?;
    let first = lease.reserve(items.len())?;
    let items: Vec<QueueItem> = items
      .into_iter()
      .enumerate()
      .map(|(offset, mut item)| {
        item.seq = first + offset as i64;
        item
      })
      .collect();

    let batch = queue_items_to_batch(&items)?;
    let table = self.queue_items_table().await?;
    let batches = RecordBatchIterator::new(vec![Ok(batch)], queue_items_schema());
    table.add(Box::new(batches)).execute().await?;
    drop(lease);

    debug!(
      table = "queue_items",
      operation = "insert",
      count = items.len(),
      first_seq = first,
      "Queue items inserted"
    );
    Ok(items)
  }

  async fn load_oldest(&self, limit: usize, excluded_types: &HashSet<String>) -> Result<Vec<QueueItem>> {
    let filter = if excluded_types.is_empty() {
      None
    } else {
      Some(format!(
        "entity_type NOT IN ({})",
        sql_in_list(excluded_types.iter().map(String::as_str))
      ))
    };

    if limit == 0 {
      return Ok(Vec::new());
    }

    // Find the cut-off from the seq column alone, then fetch only those rows
    let mut seqs = seq_values(&self.queue_items_table().await?, filter.as_deref()).await?;
    if seqs.is_empty() {
      return Ok(Vec::new());
    }
    seqs.sort_unstable();
    let cutoff = seqs[limit.min(seqs.len()) - 1];

    let bounded = match &filter {
      Some(f) => format!("{} AND seq <= {}", f, cutoff),
      None => format!("seq <= {}", cutoff),
    };
    let mut items = self.load_all_items(Some(&bounded)).await?;
    items.truncate(limit);

    trace!(
      table = "queue_items",
      operation = "load_oldest",
      limit = limit,
      excluded = excluded_types.len(),
      loaded = items.len(),
      "Loaded oldest queue items"
    );
    Ok(items)
  }

  async fn delete_by_refs(&self, refs: &[EntityRef], through_seq: i64) -> Result<usize> {
    if refs.is_empty() {
      return Ok(0);
    }

    let encoded = refs.iter().map(EntityRef::encode).collect::<reindex_core::Result<Vec<_>>>()?;
    let filter = format!(
      "entity_ref IN ({}) AND seq <= {}",
      sql_in_list(encoded.iter().map(String::as_str)),
      through_seq
    );

    let table = self.queue_items_table().await?;
    let count = table.count_rows(Some(filter.clone())).await?;
    table.delete(&filter).await?;

    debug!(
      table = "queue_items",
      operation = "delete_by_refs",
      refs = refs.len(),
      through_seq = through_seq,
      deleted = count,
      "Queue items deleted"
    );
    Ok(count)
  }

  async fn delete_all(&self) -> Result<usize> {
    let table = self.queue_items_table().await?;
    let count = table.count_rows(None).await?;
    if count > 0 {
      table.delete("true").await?;
    }
    debug!(table = "queue_items", operation = "delete_all", deleted = count, "Queue emptied");
    Ok(count)
  }

  async fn delete_by_type(&self, entity_type: &str) -> Result<usize> {
    let filter = format!("entity_type = '{}'", escape_sql(entity_type));
    let table = self.queue_items_table().await?;
    let count = table.count_rows(Some(filter.clone())).await?;
    if count > 0 {
      table.delete(&filter).await?;
    }
    debug!(
      table = "queue_items",
      operation = "delete_by_type",
      entity_type = %entity_type,
      deleted = count,
      "Queue items deleted for type"
    );
    Ok(count)
  }

  async fn count(&self, entity_type: Option<&str>) -> Result<usize> {
    let table = self.queue_items_table().await?;
    let filter = entity_type.map(|t| format!("entity_type = '{}'", escape_sql(t)));
    Ok(table.count_rows(filter).await?)
  }

  async fn count_by_type(&self) -> Result<BTreeMap<String, usize>> {
    let table = self.queue_items_table().await?;
    let results: Vec<RecordBatch> = table
      .query()
      .select(Select::columns(&["entity_type"]))
      .execute()
      .await?
      .try_collect()
      .await?;

    let mut counts = BTreeMap::new();
    for batch in results {
      let column = batch
        .column_by_name("entity_type")
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| DbError::NotFound("column entity_type".to_string()))?;
      for entity_type in column.iter().flatten() {
        *counts.entry(entity_type.to_string()).or_insert(0) += 1;
      }
    }
    Ok(counts)
  }
}

fn queue_items_to_batch(items: &[QueueItem]) -> Result<RecordBatch> {
  let mut encoded = Vec::with_capacity(items.len());
  for item in items {
    encoded.push(item.entity_ref.encode()?);
  }

  let id = StringArray::from(items.iter().map(|i| i.id.to_string()).collect::<Vec<_>>());
  let entity_type = StringArray::from(
    items
      .iter()
      .map(|i| i.entity_ref.entity_type.clone())
      .collect::<Vec<_>>(),
  );
  let entity_ref = StringArray::from(encoded);
  let operation = StringArray::from(items.iter().map(|i| i.operation.as_str()).collect::<Vec<_>>());
  let created_at = Int64Array::from(
    items
      .iter()
      .map(|i| i.created_at.timestamp_millis())
      .collect::<Vec<_>>(),
  );
  let seq = Int64Array::from(items.iter().map(|i| i.seq).collect::<Vec<_>>());

  let batch = RecordBatch::try_new(
    queue_items_schema(),
    vec![
      Arc::new(id),
      Arc::new(entity_type),
      Arc::new(entity_ref),
      Arc::new(operation),
      Arc::new(created_at),
      Arc::new(seq),
    ],
  )?;

  Ok(batch)
}

fn batch_to_queue_item(batch: &RecordBatch, row: usize) -> Result<QueueItem> {
  let get_string = |name: &str| -> Result<String> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<StringArray>())
      .map(|a| a.value(row).to_string())
      .ok_or_else(|| DbError::NotFound(format!("column {}", name)))
  };

  let get_i64 = |name: &str| -> Result<i64> {
    batch
      .column_by_name(name)
      .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
      .map(|a| a.value(row))
      .ok_or_else(|| DbError::NotFound(format!("column {}", name)))
  };

  let id_str = get_string("id")?;
  let operation_str = get_string("operation")?;

  Ok(QueueItem {
    id: Uuid::parse_str(&id_str).map_err(|_| DbError::InvalidInput(format!("Invalid queue item id: {}", id_str)))?,
    entity_ref: EntityRef::decode(&get_string("entity_ref")?)?,
    operation: operation_str.parse::<IndexOperation>().map_err(DbError::InvalidInput)?,
    created_at: timestamp(get_i64("created_at")?)?,
    seq: get_i64("seq")?,
  })
}
