pub mod aggregate;
mod error;
pub mod file_lock;
pub mod index_state;
pub mod indexer;
pub mod loader;
pub mod lock;
pub mod manager;
pub mod scheduler;
pub mod session_manager;
pub mod source;

pub use aggregate::{AggregatedBatch, ItemGroup, aggregate};
pub use error::{BoxError, QueueError, Result};
pub use file_lock::FileLocks;
pub use index_state::{IndexConfiguration, IndexStateRegistry, IndexStates};
pub use indexer::{EntityIndexer, IndexFailure, IndexResult};
pub use loader::{EntityIdsLoader, IdsPage};
pub use lock::{InMemoryLocks, LockGuard, LockKey, LockManager};
pub use manager::{BatchOutcome, QueueManager, QueueManagerBuilder};
pub use scheduler::{Scheduler, spawn_scheduler};
pub use session_manager::SessionManager;
pub use source::{EntitySource, ScannedId};
