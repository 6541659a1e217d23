// Host-wide sequence allocation for a LanceDB store

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::connection::{DbError, Result};

/// Counter file kept next to the database directory
pub(crate) fn counter_path(db_path: &Path) -> PathBuf {
  let mut name = db_path.as_os_str().to_owned();
  name.push(".seq");
  PathBuf::from(name)
}

/// Exclusive hold on the counter file.
///
/// Every process sharing the database allocates through the same file, so
/// `seq` stays unique and increasing across processes. Hold the lease until
/// the rows carrying the reserved numbers are written; a reader then never
/// sees a higher `seq` before a lower one.
pub(crate) struct SeqLease {
  file: File,
  next: Option<i64>,
}

impl SeqLease {
  /// Block (off the runtime threads) until the counter file is ours
  pub(crate) async fn acquire(path: PathBuf) -> Result<Self> {
    let file = tokio::task::spawn_blocking(move || -> std::io::Result<File> {
      let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)?;
      file.lock_exclusive()?;
      Ok(file)
    })
    .await
    .map_err(|e| DbError::Io(std::io::Error::other(e)))??;

    let mut lease = Self { file, next: None };
    lease.next = lease.read_counter()?;
    Ok(lease)
  }

  /// Whether the counter file has never been written
  pub(crate) fn needs_seed(&self) -> bool {
    self.next.is_none()
  }

  pub(crate) fn seed(&mut self, max_persisted: i64) {
    debug!(next_seq = max_persisted + 1, "Sequence counter seeded");
    self.next = Some(max_persisted + 1);
  }

  /// Reserve `count` consecutive numbers and persist the new high mark
  pub(crate) fn reserve(&mut self, count: usize) -> Result<i64> {
    let first = self.next.unwrap_or(1);
    let next = first + count as i64;

    self.file.set_len(0)?;
    self.file.seek(SeekFrom::Start(0))?;
    self.file.write_all(next.to_string().as_bytes())?;
    self.file.sync_data()?;

    self.next = Some(next);
    Ok(first)
  }

  fn read_counter(&mut self) -> Result<Option<i64>> {
    let mut contents = String::new();
    self.file.seek(SeekFrom::Start(0))?;
    self.file.read_to_string(&mut contents)?;

    let contents = contents.trim();
    if contents.is_empty() {
      return Ok(None);
    }
    contents
      .parse::<i64>()
      .map(Some)
      .map_err(|_| DbError::InvalidInput(format!("Corrupt sequence counter: {}", contents)))
  }
}

impl Drop for SeqLease {
  fn drop(&mut self) {
    if let Err(e) = FileExt::unlock(&self.file) {
      warn!(err = %e, "Failed to release sequence counter lock");
    }
  }
}
