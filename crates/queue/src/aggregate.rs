//! Latest-wins reduction of a dequeued batch.
//!
//! Pass one groups items by reference and tracks the effective (highest
//! `seq`) item of each group. Pass two partitions references by their
//! effective operation. Both passes are linear in the batch size.

use reindex_core::{EntityRef, IndexOperation, QueueItem};
use std::collections::HashMap;

/// All dequeued items for one reference
#[derive(Debug, Clone)]
pub struct ItemGroup {
  pub entity_ref: EntityRef,
  /// Operation of the most recently enqueued item
  pub effective: IndexOperation,
  pub effective_seq: i64,
  pub items: Vec<QueueItem>,
}

#[derive(Debug, Default)]
pub struct AggregatedBatch {
  /// References whose effective operation is INDEX, in first-seen order
  pub index: Vec<EntityRef>,
  /// References whose effective operation is DELETE, in first-seen order
  pub delete: Vec<EntityRef>,
  pub groups: HashMap<EntityRef, ItemGroup>,
  /// Highest `seq` in the batch
  pub max_seq: i64,
}

impl AggregatedBatch {
  pub fn item_count(&self) -> usize {
    self.groups.values().map(|g| g.items.len()).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.groups.is_empty()
  }
}

pub fn aggregate(items: Vec<QueueItem>) -> AggregatedBatch {
  let mut order: Vec<EntityRef> = Vec::new();
  let mut groups: HashMap<EntityRef, ItemGroup> = HashMap::new();
  let mut max_seq = 0;

  for item in items {
    max_seq = max_seq.max(item.seq);
    match groups.get_mut(&item.entity_ref) {
      Some(group) => {
        if item.seq > group.effective_seq {
          group.effective = item.operation;
          group.effective_seq = item.seq;
        }
        group.items.push(item);
      }
      None => {
        order.push(item.entity_ref.clone());
        groups.insert(
          item.entity_ref.clone(),
          ItemGroup {
            entity_ref: item.entity_ref.clone(),
            effective: item.operation,
            effective_seq: item.seq,
            items: vec![item],
          },
        );
      }
    }
  }

  let mut index = Vec::new();
  let mut delete = Vec::new();
  for entity_ref in order {
    match groups.get(&entity_ref).map(|g| g.effective) {
      Some(IndexOperation::Index) => index.push(entity_ref),
      Some(IndexOperation::Delete) => delete.push(entity_ref),
      None => {}
    }
  }

  AggregatedBatch {
    index,
    delete,
    groups,
    max_seq,
  }
}
