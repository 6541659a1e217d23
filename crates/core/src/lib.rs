pub mod config;
pub mod entity;
pub mod entity_ref;
pub mod error;
pub mod key;
pub mod queue_item;
pub mod session;

pub use config::{Config, LogConfig, QueueConfig, SchedulerConfig, StorageConfig};
pub use entity::{CompositeKey, EntityDescriptor, KeyField, KeyProperty, OrderingProperty};
pub use entity_ref::{CODEC_VERSION, EntityRef, validate_entity_type};
pub use error::{Error, Result};
pub use key::{EntityKey, KeyKind, KeyValue};
pub use queue_item::{IndexOperation, QueueItem};
pub use session::{EnqueueingSession, SessionStatus};
