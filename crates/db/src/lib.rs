pub mod connection;
mod memory;
mod queue_items;
pub mod schema;
mod sequence;
mod sessions;
pub mod store;

pub use connection::{DbError, LanceStore, Result, default_data_dir};
pub use memory::MemoryStore;
pub use store::{QueueStore, SessionStore};
