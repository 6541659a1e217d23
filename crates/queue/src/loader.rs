//! Cursor-driven, paginated scan of an entity type's ids.

use reindex_core::{EnqueueingSession, EntityRef, KeyValue, OrderingProperty};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{QueueError, Result};
use crate::source::EntitySource;

/// One page of a bulk scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdsPage {
  pub refs: Vec<EntityRef>,
  /// Ordering value of the last returned reference; the next cursor
  pub last_ordering_value: Option<KeyValue>,
  /// No further pages remain
  pub complete: bool,
}

pub struct EntityIdsLoader {
  source: Arc<dyn EntitySource>,
}

impl EntityIdsLoader {
  pub fn new(source: Arc<dyn EntitySource>) -> Self {
    Self { source }
  }

  /// Load up to `batch_size` references after the session's cursor.
  ///
  /// Composite orderings cannot be cursored, so the whole type is loaded in
  /// one unordered page instead.
  pub async fn load_next(&self, session: &EnqueueingSession, batch_size: usize) -> Result<IdsPage> {
    match &session.ordering {
      OrderingProperty::Scalar { name, .. } => {
        let cursor = session.cursor()?;
        self
          .load_page(&session.entity_type, name, cursor.as_ref(), batch_size.max(1))
          .await
      }
      OrderingProperty::Composite { name } => self.load_everything(&session.entity_type, name).await,
    }
  }

  async fn load_page(
    &self,
    entity_type: &str,
    ordering_property: &str,
    after: Option<&KeyValue>,
    batch_size: usize,
  ) -> Result<IdsPage> {
    let mut scanned = self
      .source
      .load_ids(entity_type, ordering_property, after, batch_size)
      .await
      .map_err(|e| QueueError::Source(e.to_string()))?;

    // Hold the source to the page contract
    scanned.sort_by(|a, b| a.ordering_value.cmp(&b.ordering_value));
    if let Some(after) = after {
      scanned.retain(|s| &s.ordering_value > after);
    }
    scanned.truncate(batch_size);

    let complete = scanned.len() < batch_size;
    let last_ordering_value = scanned.last().map(|s| s.ordering_value.clone());
    let refs: Vec<EntityRef> = scanned.into_iter().map(|s| s.entity_ref).collect();

    debug!(
      entity_type = %entity_type,
      after = ?after.map(KeyValue::to_text),
      count = refs.len(),
      complete = complete,
      "Loaded ids page"
    );

    Ok(IdsPage {
      refs,
      last_ordering_value,
      complete,
    })
  }

  async fn load_everything(&self, entity_type: &str, ordering_property: &str) -> Result<IdsPage> {
    warn!(
      entity_type = %entity_type,
      ordering_property = %ordering_property,
      "Ordering property is part of a composite key; loading every id into memory"
    );

    let refs = self
      .source
      .load_all_ids(entity_type)
      .await
      .map_err(|e| QueueError::Source(e.to_string()))?;

    debug!(entity_type = %entity_type, count = refs.len(), "Loaded all ids");
    Ok(IdsPage {
      refs,
      last_ordering_value: None,
      complete: true,
    })
  }
}
