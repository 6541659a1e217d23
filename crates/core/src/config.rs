//! Configuration for the indexing queue with per-project overrides.
//!
//! Config priority: explicit path > project-relative (.reindex/config.toml) >
//! user (~/.config/reindex/config.toml) > defaults

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::entity::EntityDescriptor;
use crate::error::{Error, Result};

// ============================================================================
// Queue Configuration
// ============================================================================

/// Queue processing and locking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
  /// Default batch size for processing and bulk enqueueing (default: 100)
  pub batch_size: usize,

  /// Wait for the global queue-processing lock in ms (default: 0)
  pub processing_lock_timeout_ms: u64,

  /// Wait for a per-type enqueue-all lock in ms (default: 0)
  pub enqueue_all_lock_timeout_ms: u64,

  /// Wait for a per-type session-management lock in ms (default: 5000)
  pub session_lock_timeout_ms: u64,
}

impl Default for QueueConfig {
  fn default() -> Self {
    Self {
      batch_size: 100,
      processing_lock_timeout_ms: 0,
      enqueue_all_lock_timeout_ms: 0,
      session_lock_timeout_ms: 5000,
    }
  }
}

impl QueueConfig {
  pub fn processing_lock_timeout(&self) -> Duration {
    Duration::from_millis(self.processing_lock_timeout_ms)
  }

  pub fn enqueue_all_lock_timeout(&self) -> Duration {
    Duration::from_millis(self.enqueue_all_lock_timeout_ms)
  }

  pub fn session_lock_timeout(&self) -> Duration {
    Duration::from_millis(self.session_lock_timeout_ms)
  }
}

// ============================================================================
// Scheduler Configuration
// ============================================================================

/// Background scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
  /// Whether the scheduler runs at all (default: true)
  pub enabled: bool,

  /// Queue processing interval in seconds (default: 10)
  pub queue_interval_secs: u64,

  /// Enqueueing session processing interval in seconds (default: 5)
  pub session_interval_secs: u64,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      queue_interval_secs: 10,
      session_interval_secs: 5,
    }
  }
}

// ============================================================================
// Storage & Logging
// ============================================================================

/// Durable storage locations
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
  /// LanceDB directory (default: <data dir>/lancedb)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub path: Option<PathBuf>,

  /// Lock file directory (default: <data dir>/locks)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub lock_dir: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
  /// off, error, warn, info, debug, trace (default: info)
  pub level: String,

  /// Log file rotation: daily, hourly, never (default: daily)
  pub rotation: String,
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      rotation: "daily".to_string(),
    }
  }
}

// ============================================================================
// Main Configuration
// ============================================================================

/// Indexing queue configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
  #[serde(default)]
  pub queue: QueueConfig,

  #[serde(default)]
  pub scheduler: SchedulerConfig,

  #[serde(default)]
  pub storage: StorageConfig,

  #[serde(default)]
  pub log: LogConfig,

  /// Indexable entity types
  #[serde(default)]
  pub entities: Vec<EntityDescriptor>,
}

impl Config {
  /// Parse a TOML document
  pub fn from_toml(content: &str) -> Result<Self> {
    let config: Config = toml::from_str(content)?;
    config.validate()?;
    Ok(config)
  }

  /// Load from an explicit path; errors are reported, not swallowed
  pub fn load_from(path: &Path) -> Result<Self> {
    let content = std::fs::read_to_string(path)?;
    Self::from_toml(&content)
  }

  /// Load config for a project, with fallback to user config
  pub fn load_for_project(project_path: &Path) -> Self {
    // Try project-relative first
    let project_config = Self::project_config_path(project_path);
    if let Some(config) = Self::load_if_present(&project_config) {
      return config;
    }

    // Fall back to user config
    if let Some(user_config_path) = Self::user_config_path()
      && let Some(config) = Self::load_if_present(&user_config_path)
    {
      return config;
    }

    Self::default()
  }

  /// Load a config file that may not exist; a file that exists but does not
  /// load is reported and skipped
  fn load_if_present(path: &Path) -> Option<Self> {
    if !path.exists() {
      return None;
    }
    match Self::load_from(path) {
      Ok(config) => Some(config),
      Err(e) => {
        warn!(path = %path.display(), err = %e, "Ignoring config file that failed to load");
        None
      }
    }
  }

  /// Get the user-level config path
  pub fn user_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("CONFIG_DIR") {
      return Some(PathBuf::from(path).join("config.toml"));
    }

    if let Ok(path) = std::env::var("XDG_CONFIG_HOME") {
      return Some(PathBuf::from(path).join("reindex").join("config.toml"));
    }

    dirs::config_dir().map(|p: PathBuf| p.join("reindex").join("config.toml"))
  }

  /// Get the project-relative config path
  pub fn project_config_path(project_path: &Path) -> PathBuf {
    project_path.join(".reindex").join("config.toml")
  }

  fn validate(&self) -> Result<()> {
    let mut seen = std::collections::HashSet::new();
    for entity in &self.entities {
      crate::entity_ref::validate_entity_type(&entity.name).map_err(|e| Error::configuration(e.to_string()))?;
      if !seen.insert(entity.name.as_str()) {
        return Err(Error::configuration(format!("entity '{}' declared twice", entity.name)));
      }
    }
    if self.queue.batch_size == 0 {
      return Err(Error::configuration("queue.batch_size must be greater than zero"));
    }
    Ok(())
  }

  /// Declaration for an entity type, if it is indexable
  pub fn descriptor(&self, entity_type: &str) -> Option<&EntityDescriptor> {
    self.entities.iter().find(|e| e.name == entity_type)
  }

  pub fn is_indexable(&self, entity_type: &str) -> bool {
    self.descriptor(entity_type).is_some()
  }

  pub fn indexable_types(&self) -> Vec<String> {
    self.entities.iter().map(|e| e.name.clone()).collect()
  }

  /// Generate a default config file as a string
  pub fn generate_template() -> String {
    r#"# Indexing queue configuration
# Place in .reindex/config.toml (project) or ~/.config/reindex/config.toml (user)

# ============================================================================
# Queue
# ============================================================================

[queue]
# Items per processing pass and ids per bulk-enqueue page
batch_size = 100

# How long to wait for locks before reporting "did nothing" (milliseconds)
processing_lock_timeout_ms = 0
enqueue_all_lock_timeout_ms = 0
session_lock_timeout_ms = 5000

# ============================================================================
# Scheduler
# ============================================================================

[scheduler]
enabled = true
queue_interval_secs = 10
session_interval_secs = 5

# ============================================================================
# Storage
# ============================================================================

[storage]
# path = "/var/lib/reindex/lancedb"
# lock_dir = "/var/lib/reindex/locks"

# ============================================================================
# Logging
# ============================================================================

[log]
level = "info"
# daily, hourly or never
rotation = "daily"

# ============================================================================
# Indexable entities
# ============================================================================

# Simple primary key:
# [[entities]]
# name = "Customer"
# primary_key = { property = "id", kind = "long" }

# Composite key with a surrogate identifier used for ordering:
# [[entities]]
# name = "OrderLine"
# [entities.composite_key]
# property = "id"
# fields = [{ name = "order", kind = "long" }, { name = "line", kind = "int" }]
# surrogate = { property = "uuid", kind = "uuid" }
"#
    .to_string()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::entity::OrderingProperty;
  use crate::key::KeyKind;
  use tempfile::TempDir;

  const SAMPLE: &str = r#"
[queue]
batch_size = 50

[[entities]]
name = "Customer"
primary_key = { property = "id", kind = "long" }

[[entities]]
name = "OrderLine"
[entities.composite_key]
property = "id"
fields = [{ name = "order", kind = "long" }, { name = "line", kind = "int" }]
surrogate = { property = "uuid", kind = "uuid" }
"#;

  #[test]
  fn test_defaults() {
    let config = Config::default();
    assert_eq!(config.queue.batch_size, 100);
    assert_eq!(config.queue.processing_lock_timeout(), Duration::ZERO);
    assert_eq!(config.queue.session_lock_timeout(), Duration::from_secs(5));
    assert!(config.scheduler.enabled);
    assert_eq!(config.log.level, "info");
    assert!(config.entities.is_empty());
  }

  #[test]
  fn test_parse_entities() {
    let config = Config::from_toml(SAMPLE).unwrap();
    assert_eq!(config.queue.batch_size, 50);
    assert!(config.is_indexable("Customer"));
    assert!(config.is_indexable("OrderLine"));
    assert!(!config.is_indexable("Invoice"));
    assert_eq!(config.indexable_types(), vec!["Customer", "OrderLine"]);

    let ordering = config.descriptor("OrderLine").unwrap().ordering_property().unwrap();
    assert_eq!(
      ordering,
      OrderingProperty::Scalar {
        name: "uuid".into(),
        kind: KeyKind::Uuid
      }
    );
  }

  #[test]
  fn test_rejects_duplicate_entities() {
    let content = r#"
[[entities]]
name = "Customer"
primary_key = { property = "id", kind = "long" }

[[entities]]
name = "Customer"
primary_key = { property = "id", kind = "uuid" }
"#;
    assert!(matches!(Config::from_toml(content), Err(Error::Configuration(_))));
  }

  #[test]
  fn test_rejects_zero_batch_size() {
    assert!(Config::from_toml("[queue]\nbatch_size = 0\n").is_err());
  }

  #[test]
  fn test_load_project_config() {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join(".reindex");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), SAMPLE).unwrap();

    let config = Config::load_for_project(temp.path());
    assert_eq!(config.queue.batch_size, 50);
    assert_eq!(config.entities.len(), 2);
  }

  #[test]
  fn test_unloadable_file_is_skipped() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    std::fs::write(&path, "[[entities]\nname = ").unwrap();

    assert!(Config::load_if_present(&path).is_none());
    assert!(Config::load_if_present(&temp.path().join("missing.toml")).is_none());

    std::fs::write(&path, SAMPLE).unwrap();
    assert_eq!(Config::load_if_present(&path).unwrap().entities.len(), 2);
  }

  #[test]
  fn test_load_from_missing_file_errors() {
    let temp = TempDir::new().unwrap();
    assert!(Config::load_from(&temp.path().join("missing.toml")).is_err());
  }

  #[test]
  fn test_template_parses() {
    let config = Config::from_toml(&Config::generate_template()).unwrap();
    assert_eq!(config.queue.batch_size, 100);
    assert!(config.entities.is_empty());
  }

  #[test]
  fn test_toml_roundtrip() {
    let config = Config::from_toml(SAMPLE).unwrap();
    let toml_str = toml::to_string_pretty(&config).unwrap();
    let parsed = Config::from_toml(&toml_str).unwrap();
    assert_eq!(parsed.entities, config.entities);
    assert_eq!(parsed.queue.batch_size, 50);
  }
}
