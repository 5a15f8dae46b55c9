//! Staleness-annotated cache reads.

use chrono::Utc;
use std::time::Duration;
use vantage_core::Timestamp;

/// Result of a cache read, carrying staleness metadata.
///
/// An "include expired" read can return stale data; the wrapper makes sure
/// callers see that before they use the value.
#[derive(Debug, Clone)]
pub struct CacheRead<T> {
    value: T,
    /// Timestamp freshness is measured from.
    fetched_at: Timestamp,
    ttl: Duration,
    is_stale: bool,
    hit_count: u64,
}

impl<T> CacheRead<T> {
    pub fn new(value: T, fetched_at: Timestamp, ttl: Duration, is_stale: bool, hit_count: u64) -> Self {
        Self {
            value,
            fetched_at,
            ttl,
            is_stale,
            hit_count,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl.as_secs()
    }

    pub fn hit_count(&self) -> u64 {
        self.hit_count
    }

    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    /// Time since the data was fetched.
    pub fn staleness(&self) -> Duration {
        (Utc::now() - self.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Time left before the data goes stale; zero once it has.
    pub fn expires_in(&self) -> Duration {
        self.ttl.saturating_sub(self.staleness())
    }

    pub fn map<U, F>(self, f: F) -> CacheRead<U>
    where
        F: FnOnce(T) -> U,
    {
        CacheRead {
            value: f(self.value),
            fetched_at: self.fetched_at,
            ttl: self.ttl,
            is_stale: self.is_stale,
            hit_count: self.hit_count,
        }
    }
}

impl<T> AsRef<T> for CacheRead<T> {
    fn as_ref(&self) -> &T {
        &self.value
    }
}
