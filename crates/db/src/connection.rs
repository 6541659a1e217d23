use arrow_array::{Array, Int64Array, RecordBatch};
use chrono::{DateTime, TimeZone, Utc};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase, Select};
use lancedb::{Connection, Table, connect};
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::schema::{enqueueing_sessions_schema, queue_items_schema};
use crate::sequence::{SeqLease, counter_path};

pub(crate) const QUEUE_ITEMS_TABLE: &str = "queue_items";
pub(crate) const SESSIONS_TABLE: &str = "enqueueing_sessions";

#[derive(Error, Debug)]
pub enum DbError {
  #[error("LanceDB error: {0}")]
  Lance(#[from] lancedb::Error),
  #[error("Arrow error: {0}")]
  Arrow(#[from] arrow::error::ArrowError),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Not found: {0}")]
  NotFound(String),
  #[error("Invalid record: {0}")]
  Core(#[from] reindex_core::Error),
  #[error("Invalid input: {0}")]
  InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// LanceDB-backed queue and session storage
pub struct LanceStore {
  pub path: PathBuf,
  pub connection: Connection,
  seq_path: PathBuf,
}

impl LanceStore {
  /// Open or create the store under the default data directory
  pub async fn open_default() -> Result<Self> {
    Self::open_at_path(default_data_dir().join("lancedb")).await
  }

  /// Open database at a specific path
  pub async fn open_at_path(db_path: PathBuf) -> Result<Self> {
    // Ensure directory exists
    if let Some(parent) = db_path.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }

    info!(path = %db_path.display(), "Opening queue database");
    let connection = match connect(db_path.to_string_lossy().as_ref()).execute().await {
      Ok(conn) => {
        debug!(path = %db_path.display(), "Database connection established");
        conn
      }
      Err(e) => {
        error!(path = %db_path.display(), err = %e, "Failed to connect to database");
        return Err(e.into());
      }
    };

    let store = Self {
      seq_path: counter_path(&db_path),
      path: db_path,
      connection,
    };

    store.ensure_tables().await?;
    Ok(store)
  }

  /// Ensure all required tables exist
  async fn ensure_tables(&self) -> Result<()> {
    let table_names = self.connection.table_names().execute().await?;

    if !table_names.contains(&QUEUE_ITEMS_TABLE.to_string()) {
      debug!("Creating queue_items table");
      self
        .connection
        .create_empty_table(QUEUE_ITEMS_TABLE, queue_items_schema())
        .execute()
        .await?;
    }

    if !table_names.contains(&SESSIONS_TABLE.to_string()) {
      debug!("Creating enqueueing_sessions table");
      self
        .connection
        .create_empty_table(SESSIONS_TABLE, enqueueing_sessions_schema())
        .execute()
        .await?;
    }

    Ok(())
  }

  /// Take the host-wide sequence counter, seeding it from the tables the
  /// first time the database is written through a counter file
  pub(crate) async fn lease_seq(&self) -> Result<SeqLease> {
    let mut lease = SeqLease::acquire(self.seq_path.clone()).await?;
    if lease.needs_seed() {
      let items = seq_values(&self.queue_items_table().await?, None).await?;
      let sessions = seq_values(&self.sessions_table().await?, None).await?;
      lease.seed(items.into_iter().chain(sessions).max().unwrap_or(0));
    }
    Ok(lease)
  }

  /// Get the queue_items table
  pub async fn queue_items_table(&self) -> Result<lancedb::Table> {
    Ok(self.connection.open_table(QUEUE_ITEMS_TABLE).execute().await?)
  }

  /// Get the enqueueing_sessions table
  pub async fn sessions_table(&self) -> Result<lancedb::Table> {
    Ok(self.connection.open_table(SESSIONS_TABLE).execute().await?)
  }
}

/// Read only the `seq` column of the rows matching `filter`, unordered
pub(crate) async fn seq_values(table: &Table, filter: Option<&str>) -> Result<Vec<i64>> {
  let query = table.query().select(Select::columns(&["seq"]));
  let query = match filter {
    Some(f) => query.only_if(f),
    None => query,
  };

  let results: Vec<RecordBatch> = query.execute().await?.try_collect().await?;

  let mut seqs = Vec::new();
  for batch in results {
    let column = batch
      .column_by_name("seq")
      .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
      .ok_or_else(|| DbError::NotFound("column seq".to_string()))?;
    seqs.extend(column.iter().flatten());
  }
  Ok(seqs)
}

/// Convert a persisted millisecond timestamp, rejecting out-of-range values
pub(crate) fn timestamp(millis: i64) -> Result<DateTime<Utc>> {
  Utc
    .timestamp_millis_opt(millis)
    .single()
    .ok_or_else(|| DbError::InvalidInput(format!("Timestamp out of range: {}", millis)))
}

/// Escape single quotes in SQL strings
pub(crate) fn escape_sql(s: &str) -> String {
  s.replace('\'', "''")
}

/// Render a quoted SQL `IN (...)` list
pub(crate) fn sql_in_list<'a>(values: impl IntoIterator<Item = &'a str>) -> String {
  values
    .into_iter()
    .map(|v| format!("'{}'", escape_sql(v)))
    .collect::<Vec<_>>()
    .join(", ")
}

/// Get the default base path for queue data
///
/// Respects the following environment variables (in order of precedence):
/// 1. DATA_DIR - explicit data directory override
/// 2. XDG_DATA_HOME - standard XDG data home directory
/// 3. dirs::data_local_dir() - platform default
pub fn default_data_dir() -> PathBuf {
  if let Ok(dir) = std::env::var("DATA_DIR") {
    return PathBuf::from(dir);
  }

  if let Ok(xdg_data) = std::env::var("XDG_DATA_HOME") {
    return PathBuf::from(xdg_data).join("reindex");
  }

  dirs::data_local_dir()
    .unwrap_or_else(|| PathBuf::from("."))
    .join("reindex")
}
