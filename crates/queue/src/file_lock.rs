// Host-wide lock files
//
// One file per lock token under a locks directory:
// - Created with create_new so exactly one process wins
// - Stale locks from dead processes are recovered
// - Waiters poll until their timeout elapses

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::lock::{LockKey, LockManager};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Lock file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockRecord {
  pub token: String,
  pub pid: u32,
  pub acquired_at: i64,
}

impl LockRecord {
  fn new(key: &LockKey) -> Self {
    Self {
      token: key.token(),
      pid: std::process::id(),
      acquired_at: Utc::now().timestamp_millis(),
    }
  }
}

/// Lock manager backed by files, serialising processes on one host
pub struct FileLocks {
  locks_dir: PathBuf,
}

impl FileLocks {
  pub fn new(locks_dir: impl Into<PathBuf>) -> Self {
    Self {
      locks_dir: locks_dir.into(),
    }
  }

  /// Locks directory under the default data directory
  pub fn default_dir() -> PathBuf {
    db::default_data_dir().join("locks")
  }

  /// Get the lock file path for a token
  pub fn lock_path(&self, key: &LockKey) -> PathBuf {
    self.locks_dir.join(format!("{}.lock", token_hash(&key.token())))
  }

  /// Current holder of `key`, if held by a live process
  pub fn holder(&self, key: &LockKey) -> Option<LockRecord> {
    read_record(&self.lock_path(key))
      .ok()
      .filter(|record| is_process_running(record.pid))
  }

  /// Single non-blocking attempt
  fn try_create(&self, key: &LockKey) -> std::io::Result<bool> {
    fs::create_dir_all(&self.locks_dir)?;
    let path = self.lock_path(key);

    match create_lock_file(&path, key) {
      Ok(()) => return Ok(true),
      Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
      Err(e) => return Err(e),
    }

    match read_record(&path) {
      Ok(existing) if is_process_running(existing.pid) => return Ok(false),
      Ok(existing) => {
        info!(lock = %key, pid = existing.pid, "Cleaning up stale lock from dead process");
      }
      Err(e) => {
        // A holder may be mid-write; only recover when the file stays unreadable
        let age = fs::metadata(&path)
          .and_then(|m| m.modified())
          .ok()
          .and_then(|t| t.elapsed().ok())
          .unwrap_or_default();
        if age < Duration::from_secs(1) {
          return Ok(false);
        }
        warn!(lock = %key, err = %e, "Corrupted lock file, removing");
      }
    }

    match fs::remove_file(&path) {
      Ok(()) => {}
      Err(e) if e.kind() == ErrorKind::NotFound => {}
      Err(e) => return Err(e),
    }

    match create_lock_file(&path, key) {
      Ok(()) => Ok(true),
      Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
      Err(e) => Err(e),
    }
  }
}

#[async_trait]
impl LockManager for FileLocks {
  async fn try_acquire(&self, key: &LockKey, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;

    loop {
      match self.try_create(key) {
        Ok(true) => {
          debug!(lock = %key, "Acquired lock file");
          return true;
        }
        Ok(false) => {}
        Err(e) => {
          warn!(lock = %key, err = %e, "Failed to create lock file");
          return false;
        }
      }

      let now = Instant::now();
      if now >= deadline {
        return false;
      }
      tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
    }
  }

  fn release(&self, key: &LockKey) {
    let path = self.lock_path(key);

    // Verify we own the lock before releasing
    match read_record(&path) {
      Ok(record) if record.pid == std::process::id() => {
        if let Err(e) = fs::remove_file(&path) {
          warn!(lock = %key, err = %e, "Failed to remove lock file");
        }
      }
      Ok(record) => {
        warn!(
          lock = %key,
          owner = record.pid,
          pid = std::process::id(),
          "Not releasing lock owned by different process"
        );
      }
      Err(_) => {}
    }
  }
}

fn create_lock_file(path: &Path, key: &LockKey) -> std::io::Result<()> {
  let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
  let contents = serde_json::to_string_pretty(&LockRecord::new(key))?;
  file.write_all(contents.as_bytes())?;
  file.sync_all()?;
  Ok(())
}

fn read_record(path: &Path) -> std::io::Result<LockRecord> {
  let contents = fs::read_to_string(path)?;
  Ok(serde_json::from_str(&contents)?)
}

/// Hash a lock token to a file-name-safe identifier
fn token_hash(token: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(token.as_bytes());
  let hash = hasher.finalize();
  hex::encode(&hash[..8])
}

/// Check if a process is running
#[cfg(unix)]
fn is_process_running(pid: u32) -> bool {
  // kill(pid, 0) returns 0 if the process exists
  unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(windows)]
fn is_process_running(pid: u32) -> bool {
  use windows_sys::Win32::Foundation::{CloseHandle, STILL_ACTIVE};
  use windows_sys::Win32::System::Threading::{GetExitCodeProcess, OpenProcess, PROCESS_QUERY_INFORMATION};

  unsafe {
    let handle = OpenProcess(PROCESS_QUERY_INFORMATION, 0, pid);
    if handle.is_null() {
      return false;
    }
    let mut exit_code = 0;
    let result = GetExitCodeProcess(handle, &mut exit_code);
    CloseHandle(handle);
    result != 0 && exit_code == STILL_ACTIVE as u32
  }
}

#[cfg(not(any(unix, windows)))]
fn is_process_running(_pid: u32) -> bool {
  true
}
