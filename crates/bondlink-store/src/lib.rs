//! bondlink-store: persisted conversation store.
//! Append-only per-agent record logs with idempotent, keyed appends.
//! No business logic: the engine decides dedup keys and ordering.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use store::{AppendOutcome, ConversationStore};
