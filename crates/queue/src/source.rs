use async_trait::async_trait;
use reindex_core::{EntityRef, KeyValue};

use crate::error::BoxError;

/// An id read from the primary datastore with its ordering-property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedId {
  pub entity_ref: EntityRef,
  pub ordering_value: KeyValue,
}

/// Read access to the primary datastore's entity ids
#[async_trait]
pub trait EntitySource: Send + Sync {
  /// Up to `limit` ids ordered ascending by `ordering_property`, strictly
  /// greater than `after` when given
  async fn load_ids(
    &self,
    entity_type: &str,
    ordering_property: &str,
    after: Option<&KeyValue>,
    limit: usize,
  ) -> Result<Vec<ScannedId>, BoxError>;

  /// Every id of the type in no particular order
  async fn load_all_ids(&self, entity_type: &str) -> Result<Vec<EntityRef>, BoxError>;
}
