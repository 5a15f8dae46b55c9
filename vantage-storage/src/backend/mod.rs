//! Storage backends implementing the cache, event and usage traits.

pub mod lmdb;
pub mod memory;

pub use lmdb::{LmdbStore, LmdbStoreError};
pub use memory::InMemoryStore;
