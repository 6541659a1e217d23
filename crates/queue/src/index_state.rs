use dashmap::DashSet;
use reindex_core::{Config, EntityDescriptor};
use std::collections::HashSet;
use tracing::info;

/// Which entity types take part in the search index
pub trait IndexConfiguration: Send + Sync {
  fn is_indexable(&self, entity_type: &str) -> bool;

  fn descriptor(&self, entity_type: &str) -> Option<EntityDescriptor>;

  fn indexable_types(&self) -> Vec<String>;
}

impl IndexConfiguration for Config {
  fn is_indexable(&self, entity_type: &str) -> bool {
    Config::is_indexable(self, entity_type)
  }

  fn descriptor(&self, entity_type: &str) -> Option<EntityDescriptor> {
    Config::descriptor(self, entity_type).cloned()
  }

  fn indexable_types(&self) -> Vec<String> {
    Config::indexable_types(self)
  }
}

/// Entity types whose index is temporarily offline
pub trait IndexStateRegistry: Send + Sync {
  fn unavailable_entity_types(&self) -> HashSet<String>;
}

/// In-process registry of offline indexes
#[derive(Debug, Default)]
pub struct IndexStates {
  unavailable: DashSet<String>,
}

impl IndexStates {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns false if the type was already unavailable
  pub fn mark_unavailable(&self, entity_type: &str) -> bool {
    let changed = self.unavailable.insert(entity_type.to_string());
    if changed {
      info!(entity_type = %entity_type, "Index marked unavailable");
    }
    changed
  }

  /// Returns false if the type was already available
  pub fn mark_available(&self, entity_type: &str) -> bool {
    let changed = self.unavailable.remove(entity_type).is_some();
    if changed {
      info!(entity_type = %entity_type, "Index marked available");
    }
    changed
  }

  pub fn is_available(&self, entity_type: &str) -> bool {
    !self.unavailable.contains(entity_type)
  }
}

impl IndexStateRegistry for IndexStates {
  fn unavailable_entity_types(&self) -> HashSet<String> {
    self.unavailable.iter().map(|t| t.key().clone()).collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_mark_unavailable_and_back() {
    let states = IndexStates::new();
    assert!(states.is_available("Book"));

    assert!(states.mark_unavailable("Book"));
    assert!(!states.mark_unavailable("Book"));
    assert_eq!(
      states.unavailable_entity_types(),
      ["Book".to_string()].into_iter().collect()
    );

    assert!(states.mark_available("Book"));
    assert!(!states.mark_available("Book"));
    assert!(states.unavailable_entity_types().is_empty());
  }

  #[test]
  fn test_config_is_index_configuration() {
    let config = Config::from_toml(
      r#"
[[entities]]
name = "Book"
primary_key = { property = "id", kind = "long" }
"#,
    )
    .unwrap();
    let config: &dyn IndexConfiguration = &config;

    assert!(config.is_indexable("Book"));
    assert!(!config.is_indexable("Author"));
    assert_eq!(config.indexable_types(), vec!["Book".to_string()]);
    assert!(config.descriptor("Book").is_some());
  }
}
