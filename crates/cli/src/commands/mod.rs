//! CLI command implementations

mod config;
mod queue;
mod session;

pub use config::{cmd_config_init, cmd_config_show};
pub use self::queue::{cmd_queue_empty, cmd_queue_enqueue, cmd_queue_status};
pub use session::{SessionAction, cmd_session, cmd_session_list};

use anyhow::{Context as _, Result};
use db::LanceStore;
use ::queue::{FileLocks, LockManager, SessionManager};
use reindex_core::Config;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Load config with precedence: explicit path > project > user > defaults
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
  load_config_in(explicit, &std::env::current_dir()?)
}

fn load_config_in(explicit: Option<&Path>, project: &Path) -> Result<Config> {
  if let Some(path) = explicit {
    return Config::load_from(path).with_context(|| format!("Failed to load config {}", path.display()));
  }

  // Logging is not up yet, so a broken project config must not fall back silently
  let project_config = Config::project_config_path(project);
  if project_config.exists() {
    return Config::load_from(&project_config)
      .with_context(|| format!("Failed to load config {}", project_config.display()));
  }

  Ok(Config::load_for_project(project))
}

/// Durable store and host-wide locks resolved from config
pub struct Context {
  pub config: Arc<Config>,
  pub store: Arc<LanceStore>,
  pub locks: Arc<dyn LockManager>,
}

impl Context {
  pub async fn open(config: Config) -> Result<Self> {
    let store = LanceStore::open_at_path(storage_path(&config))
      .await
      .context("Failed to open queue database")?;
    let locks: Arc<dyn LockManager> = Arc::new(FileLocks::new(lock_dir(&config)));

    Ok(Self {
      config: Arc::new(config),
      store: Arc::new(store),
      locks,
    })
  }

  pub fn sessions(&self) -> SessionManager {
    SessionManager::new(
      self.store.clone(),
      self.locks.clone(),
      self.config.clone(),
      self.config.queue.session_lock_timeout(),
    )
  }
}

pub fn storage_path(config: &Config) -> PathBuf {
  config
    .storage
    .path
    .clone()
    .unwrap_or_else(|| db::default_data_dir().join("lancedb"))
}

pub fn lock_dir(config: &Config) -> PathBuf {
  config.storage.lock_dir.clone().unwrap_or_else(FileLocks::default_dir)
}

#[cfg(test)]
pub(crate) mod test_support {
  use super::*;
  use tempfile::TempDir;

  pub const CONFIG: &str = r#"
[[entities]]
name = "Product"
primary_key = { property = "id", kind = "long" }

[[entities]]
name = "OrderLine"
composite_key = { property = "key", fields = [{ name = "order", kind = "long" }, { name = "line", kind = "int" }] }
"#;

  pub async fn context() -> (TempDir, Context) {
    let temp_dir = TempDir::new().unwrap();
    let mut config = Config::from_toml(CONFIG).unwrap();
    config.storage.path = Some(temp_dir.path().join("queue.lancedb"));
    config.storage.lock_dir = Some(temp_dir.path().join("locks"));
    let ctx = Context::open(config).await.unwrap();
    (temp_dir, ctx)
  }
}
