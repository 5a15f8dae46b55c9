//! Cache store with explicit freshness and a pluggable row backend.
//!
//! Reads return [`CacheRead<T>`], which carries the staleness flag, TTL and
//! hit count, so callers can make freshness-aware decisions even when they
//! asked for expired data.
//!
//! Rows are addressed by [`CacheKey`], which can only be built from a
//! normalized company identifier and a data category.

pub mod freshness;
pub mod key;
pub mod store;
pub mod traits;

pub use freshness::CacheRead;
pub use key::CacheKey;
pub use store::{AdvisoryLock, CacheAnalytics, CacheStore, CategoryAnalytics, SweepReport};
pub use traits::{CacheBackend, CacheEventLog, CacheStats, EntryUpdate};
