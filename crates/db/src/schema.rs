use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Schema for the queue_items table
pub fn queue_items_schema() -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("entity_type", DataType::Utf8, false),
    Field::new("entity_ref", DataType::Utf8, false), // Encoded EntityRef
    Field::new("operation", DataType::Utf8, false),
    Field::new("created_at", DataType::Int64, false), // Unix timestamp ms
    Field::new("seq", DataType::Int64, false),
  ]))
}

/// Schema for the enqueueing_sessions table
pub fn enqueueing_sessions_schema() -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("entity_type", DataType::Utf8, false),
    Field::new("ordering_property", DataType::Utf8, false),
    Field::new("ordering_kind", DataType::Utf8, true), // NULL for composite orderings
    Field::new("last_ordering_value", DataType::Utf8, true),
    Field::new("status", DataType::Utf8, false),
    Field::new("created_at", DataType::Int64, false),
    Field::new("seq", DataType::Int64, false),
  ]))
}
