//! Backend traits for cache rows and cache analytics events.
//!
//! Backends are dumb: they store and return rows. Freshness, TTLs and the
//! advisory lock protocol live in [`super::CacheStore`].

use async_trait::async_trait;
use vantage_core::{
    CacheEntry, CacheEvent, CompanyIdentifier, DataCategory, LogError, StorageError, Timestamp,
};

use super::key::CacheKey;

/// Atomic read-modify-write applied to one row.
///
/// Receives the current row (if any) and returns the row to persist;
/// returning `None` deletes it.
pub type EntryUpdate = Box<dyn FnOnce(Option<CacheEntry>) -> Option<CacheEntry> + Send>;

/// Pluggable cache row storage (LMDB, in-memory).
///
/// Implementations must be thread-safe. `modify` must be atomic with respect
/// to other `modify` calls on the same key within one process.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Load one row.
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StorageError>;

    /// Write one row unconditionally (last writer wins).
    async fn store(&self, entry: &CacheEntry) -> Result<(), StorageError>;

    /// Apply `update` to the row under `key` and return what was persisted.
    async fn modify(
        &self,
        key: &CacheKey,
        update: EntryUpdate,
    ) -> Result<Option<CacheEntry>, StorageError>;

    /// Delete one row. Returns whether it existed.
    async fn remove(&self, key: &CacheKey) -> Result<bool, StorageError>;

    /// Delete a company's rows for the given categories, or all of them
    /// when `categories` is empty. Returns the number removed.
    async fn remove_company(
        &self,
        identifier: &CompanyIdentifier,
        categories: &[DataCategory],
    ) -> Result<u64, StorageError>;

    /// Every row currently stored.
    async fn scan(&self) -> Result<Vec<CacheEntry>, StorageError>;

    /// Backend counters.
    async fn stats(&self) -> Result<CacheStats, StorageError>;
}

/// Append-only log of cache read outcomes.
#[async_trait]
pub trait CacheEventLog: Send + Sync {
    async fn record(&self, event: &CacheEvent) -> Result<(), LogError>;

    async fn events_since(&self, since: Timestamp) -> Result<Vec<CacheEvent>, StorageError>;

    /// Delete every event recorded before `cutoff`. Returns the number removed.
    async fn prune_events_before(&self, cutoff: Timestamp) -> Result<u64, StorageError>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheStats {
    /// Number of loads that found a row.
    pub hits: u64,
    /// Number of loads that found nothing.
    pub misses: u64,
    /// Number of rows currently stored.
    pub entry_count: u64,
    /// Approximate payload bytes stored.
    pub memory_bytes: u64,
    /// Number of rows removed by invalidation or sweeps.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }
}
