//! VANTAGE Storage - Cache Store and Budget Ledger
//!
//! The only durable state the fetch services own: cache rows keyed by
//! (company identifier, data category) and the append-only usage log the
//! budget ledger sums over.

pub mod backend;
pub mod cache;
pub mod ledger;

pub use backend::{InMemoryStore, LmdbStore, LmdbStoreError};
pub use cache::{
    AdvisoryLock, CacheAnalytics, CacheBackend, CacheEventLog, CacheKey, CacheRead, CacheStats,
    CacheStore, CategoryAnalytics, EntryUpdate, SweepReport,
};
pub use ledger::{utc_day_start, BudgetLedger, UsageLedger};
