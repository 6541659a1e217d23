use db::DbError;
use thiserror::Error;

/// Error reported by an external collaborator (indexer or primary datastore)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Error, Debug)]
pub enum QueueError {
  #[error("Storage error: {0}")]
  Db(#[from] DbError),
  #[error("Entity type is not indexable: {0}")]
  NotIndexable(String),
  #[error("Configuration error: {0}")]
  Configuration(String),
  #[error("Invalid data: {0}")]
  Core(#[from] reindex_core::Error),
  #[error("Entity source error: {0}")]
  Source(String),
}

pub type Result<T> = std::result::Result<T, QueueError>;
