//! Freshness-aware cache store over a pluggable backend.
//!
//! Staleness is always computed at read time from the row's freshness
//! timestamps and the configured TTL. The stored `expires_at` is written for
//! debugging only and never consulted.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use vantage_core::{
    to_chrono, CacheEntry, CacheEvent, CacheEventKind, CompanyIdentifier, DataCategory,
    StorageError, Timestamp, TtlConfig,
};

use super::freshness::CacheRead;
use super::key::CacheKey;
use super::traits::{CacheBackend, CacheEventLog, CacheStats};

/// Outcome of trying to mark a row as "fetch in progress".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvisoryLock {
    /// This caller set the marker.
    Acquired,
    /// Another fetch set the marker at the given time, within the window.
    HeldElsewhere { since: Timestamp },
    /// There is no row to mark yet.
    NoRow,
}

/// Rows examined and removed by one retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: u64,
    pub removed: u64,
}

/// Read outcomes for one category over an analytics window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryAnalytics {
    pub hits: u64,
    pub stale_hits: u64,
    pub misses: u64,
}

impl CategoryAnalytics {
    /// Fresh hits over all reads.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.stale_hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Cache analytics over a window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CacheAnalytics {
    pub since: Option<Timestamp>,
    pub by_category: BTreeMap<DataCategory, CategoryAnalytics>,
    pub backend: CacheStats,
}

impl CacheAnalytics {
    pub fn total(&self) -> CategoryAnalytics {
        self.by_category
            .values()
            .fold(CategoryAnalytics::default(), |acc, c| CategoryAnalytics {
                hits: acc.hits + c.hits,
                stale_hits: acc.stale_hits + c.stale_hits,
                misses: acc.misses + c.misses,
            })
    }
}

/// The cache store: one row per (identifier, category).
#[derive(Clone)]
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    events: Option<Arc<dyn CacheEventLog>>,
    ttl: TtlConfig,
}

impl CacheStore {
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: TtlConfig) -> Self {
        Self {
            backend,
            events: None,
            ttl,
        }
    }

    /// Record a [`CacheEvent`] for every read.
    pub fn with_event_log(mut self, events: Arc<dyn CacheEventLog>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn ttl(&self) -> &TtlConfig {
        &self.ttl
    }

    pub fn ttl_for(&self, category: DataCategory) -> Duration {
        self.ttl.ttl_for(category)
    }

    /// Read a row.
    ///
    /// A fresh row is always returned. A stale row is returned only when
    /// `include_expired` is set, flagged as stale. Every served read bumps
    /// the row's hit count; every read appends an analytics event. Neither
    /// of those side effects can fail the read.
    pub async fn get(
        &self,
        identifier: &CompanyIdentifier,
        category: DataCategory,
        include_expired: bool,
    ) -> Result<Option<CacheRead<CacheEntry>>, StorageError> {
        let key = CacheKey::new(identifier.clone(), category);
        let now = Utc::now();

        let loaded = match self.backend.load(&key).await {
            Ok(loaded) => loaded,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed");
                return Err(e);
            }
        };

        let Some(entry) = loaded else {
            self.record_event(identifier, category, CacheEventKind::Miss, now).await;
            return Ok(None);
        };

        let fresh = entry.is_fresh(&self.ttl, now);
        if !fresh && !include_expired {
            self.record_event(identifier, category, CacheEventKind::Miss, now).await;
            return Ok(None);
        }

        let kind = if fresh {
            CacheEventKind::Hit
        } else {
            CacheEventKind::StaleHit
        };
        self.record_event(identifier, category, kind, now).await;

        let entry = self.bump_hit_count(&key, entry).await;
        let ttl = self.ttl.ttl_for(category);
        let anchor = entry.freshness_anchor();
        let hits = entry.cache_hit_count;
        Ok(Some(CacheRead::new(entry, anchor, ttl, !fresh, hits)))
    }

    /// Load a row regardless of freshness, without counting it as a read.
    ///
    /// For write paths that merge new sections into what is already cached.
    pub async fn peek(
        &self,
        identifier: &CompanyIdentifier,
        category: DataCategory,
    ) -> Result<Option<CacheEntry>, StorageError> {
        self.backend
            .load(&CacheKey::new(identifier.clone(), category))
            .await
    }

    async fn bump_hit_count(&self, key: &CacheKey, loaded: CacheEntry) -> CacheEntry {
        let result = self
            .backend
            .modify(
                key,
                Box::new(|current: Option<CacheEntry>| {
                    current.map(|mut e| {
                        e.cache_hit_count = e.cache_hit_count.saturating_add(1);
                        e
                    })
                }),
            )
            .await;
        match result {
            Ok(Some(updated)) => updated,
            Ok(None) => loaded,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Failed to bump cache hit count");
                loaded
            }
        }
    }

    async fn record_event(
        &self,
        identifier: &CompanyIdentifier,
        category: DataCategory,
        kind: CacheEventKind,
        at: Timestamp,
    ) {
        let Some(events) = &self.events else {
            return;
        };
        let event = CacheEvent {
            identifier: identifier.clone(),
            category,
            kind,
            at,
        };
        if let Err(e) = events.record(&event).await {
            tracing::debug!(identifier = %identifier, error = %e, "Failed to record cache event");
        }
    }

    /// Upsert a row.
    ///
    /// An existing row keeps its hit count, creation time and advisory lock;
    /// payload, source and confidence are overwritten and the category's
    /// freshness timestamps are bumped.
    pub async fn put(
        &self,
        identifier: &CompanyIdentifier,
        category: DataCategory,
        company_name: &str,
        payload: serde_json::Value,
        source: &str,
        confidence_score: f64,
    ) -> Result<CacheEntry, StorageError> {
        let key = CacheKey::new(identifier.clone(), category);
        let ttl = self.ttl.ttl_for(category);
        let now = Utc::now();
        let identifier_owned = identifier.clone();
        let company_name = company_name.to_string();
        let source = source.to_string();

        let written = self
            .backend
            .modify(
                &key,
                Box::new(move |current: Option<CacheEntry>| {
                    Some(match current {
                        Some(mut existing) => {
                            existing.overwrite(
                                company_name,
                                payload,
                                source,
                                confidence_score,
                                ttl,
                                now,
                            );
                            existing
                        }
                        None => CacheEntry::new(
                            identifier_owned,
                            category,
                            company_name,
                            payload,
                            source,
                            confidence_score,
                            ttl,
                            now,
                        ),
                    })
                }),
            )
            .await?;

        written.ok_or_else(|| StorageError::WriteFailed {
            identifier: identifier.to_string(),
            category,
            reason: "backend dropped the row".to_string(),
        })
    }

    /// Hard-delete a company's rows; all categories when `categories` is
    /// `None` or empty. Returns the number removed.
    pub async fn invalidate(
        &self,
        identifier: &CompanyIdentifier,
        categories: Option<&[DataCategory]>,
    ) -> Result<u64, StorageError> {
        let removed = self
            .backend
            .remove_company(identifier, categories.unwrap_or(&[]))
            .await?;
        tracing::info!(identifier = %identifier, removed, "Cache invalidated");
        Ok(removed)
    }

    /// Hard-delete rows whose computed expiry plus `grace` has passed.
    pub async fn sweep(&self, grace: Duration) -> Result<SweepReport, StorageError> {
        let now = Utc::now();
        let grace = to_chrono(grace);
        let rows = self.backend.scan().await?;
        let mut report = SweepReport {
            scanned: rows.len() as u64,
            removed: 0,
        };

        for row in rows {
            if row.computed_expiry(&self.ttl) + grace >= now {
                continue;
            }
            let key = CacheKey::new(row.identifier.clone(), row.category);
            let ttl = self.ttl;
            // Re-check inside the write so a concurrent refresh survives.
            let kept = self
                .backend
                .modify(
                    &key,
                    Box::new(move |current: Option<CacheEntry>| {
                        current.filter(|e| e.computed_expiry(&ttl) + grace >= now)
                    }),
                )
                .await?;
            if kept.is_none() {
                report.removed += 1;
            }
        }

        tracing::info!(scanned = report.scanned, removed = report.removed, "Cache sweep finished");
        Ok(report)
    }

    /// Delete cache events recorded before `cutoff`. Without an event log
    /// there is nothing to prune.
    pub async fn prune_events(&self, cutoff: Timestamp) -> Result<u64, StorageError> {
        let Some(events) = &self.events else {
            return Ok(0);
        };
        let removed = events.prune_events_before(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, cutoff = %cutoff, "Cache events pruned");
        }
        Ok(removed)
    }

    /// Set the advisory "fetch in progress" marker unless another fetch set
    /// it within `window`.
    ///
    /// Best-effort only. A missing row cannot be marked and reports
    /// [`AdvisoryLock::NoRow`].
    pub async fn try_mark_fetching(
        &self,
        identifier: &CompanyIdentifier,
        category: DataCategory,
        window: Duration,
    ) -> Result<AdvisoryLock, StorageError> {
        let key = CacheKey::new(identifier.clone(), category);
        let now = Utc::now();
        let acquired = Arc::new(AtomicBool::new(false));
        let flag = acquired.clone();

        let row = self
            .backend
            .modify(
                &key,
                Box::new(move |current: Option<CacheEntry>| {
                    current.map(|mut e| {
                        if !e.lock_held(now, window) {
                            e.parallel_fetch_lock = Some(now);
                            flag.store(true, Ordering::SeqCst);
                        }
                        e
                    })
                }),
            )
            .await?;

        Ok(match row {
            None => AdvisoryLock::NoRow,
            Some(_) if acquired.load(Ordering::SeqCst) => AdvisoryLock::Acquired,
            Some(e) => AdvisoryLock::HeldElsewhere {
                since: e.parallel_fetch_lock.unwrap_or(now),
            },
        })
    }

    /// Clear the advisory marker.
    pub async fn clear_fetch_lock(
        &self,
        identifier: &CompanyIdentifier,
        category: DataCategory,
    ) -> Result<(), StorageError> {
        let key = CacheKey::new(identifier.clone(), category);
        self.backend
            .modify(
                &key,
                Box::new(|current: Option<CacheEntry>| {
                    current.map(|mut e| {
                        e.parallel_fetch_lock = None;
                        e
                    })
                }),
            )
            .await?;
        Ok(())
    }

    /// Read outcomes per category since `since`, plus backend counters.
    pub async fn analytics(&self, since: Timestamp) -> Result<CacheAnalytics, StorageError> {
        let mut analytics = CacheAnalytics {
            since: Some(since),
            by_category: BTreeMap::new(),
            backend: self.backend.stats().await?,
        };
        let Some(events) = &self.events else {
            return Ok(analytics);
        };

        for event in events.events_since(since).await? {
            let slot = analytics.by_category.entry(event.category).or_default();
            match event.kind {
                CacheEventKind::Hit => slot.hits += 1,
                CacheEventKind::StaleHit => slot.stale_hits += 1,
                CacheEventKind::Miss => slot.misses += 1,
            }
        }
        Ok(analytics)
    }

    pub async fn stats(&self) -> Result<CacheStats, StorageError> {
        self.backend.stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;
    use serde_json::json;

    fn store() -> (CacheStore, InMemoryStore) {
        let backend = InMemoryStore::new();
        let cache = CacheStore::new(Arc::new(backend.clone()), TtlConfig::default())
            .with_event_log(Arc::new(backend.clone()));
        (cache, backend)
    }

    fn id(s: &str) -> CompanyIdentifier {
        CompanyIdentifier::from_assigned(s)
    }

    /// Seed a row whose freshness anchor is `age` in the past.
    async fn seed_aged(backend: &InMemoryStore, identifier: &str, category: DataCategory, age: chrono::Duration) {
        let at = Utc::now() - age;
        let entry = CacheEntry::new(
            id(identifier),
            category,
            identifier,
            json!({"seeded": true}),
            "tavily",
            0.5,
            TtlConfig::default().ttl_for(category),
            at,
        );
        backend.store(&entry).await.unwrap();
    }

    #[tokio::test]
    async fn test_put_then_get_is_fresh_hit() {
        let (cache, _) = store();
        cache
            .put(&id("acme.io"), DataCategory::Static, "Acme", json!({"a": 1}), "tavily", 0.5)
            .await
            .unwrap();

        let read = cache
            .get(&id("acme.io"), DataCategory::Static, false)
            .await
            .unwrap()
            .expect("fresh row");
        assert!(!read.is_stale());
        assert_eq!(read.hit_count(), 1);
        assert_eq!(read.ttl_seconds(), 30 * 24 * 3600);
        assert_eq!(read.value().payload, json!({"a": 1}));
    }

    #[tokio::test]
    async fn test_live_row_16_minutes_old_is_stale() {
        let (cache, backend) = store();
        seed_aged(&backend, "chainlink", DataCategory::Live, chrono::Duration::minutes(16)).await;

        assert!(cache
            .get(&id("chainlink"), DataCategory::Live, false)
            .await
            .unwrap()
            .is_none());

        let stale = cache
            .get(&id("chainlink"), DataCategory::Live, true)
            .await
            .unwrap()
            .expect("stale row served on request");
        assert!(stale.is_stale());
    }

    #[tokio::test]
    async fn test_live_row_10_minutes_old_is_fresh() {
        let (cache, backend) = store();
        seed_aged(&backend, "chainlink", DataCategory::Live, chrono::Duration::minutes(10)).await;
        let read = cache
            .get(&id("chainlink"), DataCategory::Live, false)
            .await
            .unwrap();
        assert!(read.is_some_and(|r| !r.is_stale()));
    }

    #[tokio::test]
    async fn test_put_upserts_in_place() {
        let (cache, backend) = store();
        let first = cache
            .put(&id("acme.io"), DataCategory::Mixed, "Acme", json!({"v": 1}), "tavily", 0.25)
            .await
            .unwrap();
        cache.get(&id("acme.io"), DataCategory::Mixed, false).await.unwrap();
        let second = cache
            .put(&id("acme.io"), DataCategory::Mixed, "Acme", json!({"v": 2}), "tavily+coingecko", 0.5)
            .await
            .unwrap();

        assert_eq!(backend.scan().await.unwrap().len(), 1);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.cache_hit_count, 1);
        assert_eq!(second.payload, json!({"v": 2}));
        assert!(second.last_fetched_static.is_some());
        assert!(second.last_fetched_live.is_some());
        assert!(second.last_fetched >= first.last_fetched);
    }

    #[tokio::test]
    async fn test_invalidate_counts() {
        let (cache, _) = store();
        for category in DataCategory::ALL {
            cache
                .put(&id("acme.io"), category, "Acme", json!({}), "tavily", 0.5)
                .await
                .unwrap();
        }
        let removed = cache
            .invalidate(&id("acme.io"), Some(&[DataCategory::Live]))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(cache.invalidate(&id("acme.io"), None).await.unwrap(), 2);
        assert_eq!(cache.invalidate(&id("acme.io"), None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_respects_grace() {
        let (cache, backend) = store();
        // Live TTL 15m: 2 days old is past TTL + 1 day grace.
        seed_aged(&backend, "old", DataCategory::Live, chrono::Duration::days(2)).await;
        // 1 hour old is stale but still inside the grace period.
        seed_aged(&backend, "recent", DataCategory::Live, chrono::Duration::hours(1)).await;
        cache
            .put(&id("fresh"), DataCategory::Static, "Fresh", json!({}), "tavily", 0.5)
            .await
            .unwrap();

        let report = cache.sweep(Duration::from_secs(24 * 3600)).await.unwrap();
        assert_eq!(report.scanned, 3);
        assert_eq!(report.removed, 1);
        let remaining: Vec<String> = backend
            .scan()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.identifier.into_inner())
            .collect();
        assert!(!remaining.contains(&"old".to_string()));
    }

    #[tokio::test]
    async fn test_advisory_lock_protocol() {
        let (cache, _) = store();
        let window = Duration::from_secs(300);
        assert_eq!(
            cache
                .try_mark_fetching(&id("acme.io"), DataCategory::Static, window)
                .await
                .unwrap(),
            AdvisoryLock::NoRow
        );

        cache
            .put(&id("acme.io"), DataCategory::Static, "Acme", json!({}), "tavily", 0.5)
            .await
            .unwrap();
        assert_eq!(
            cache
                .try_mark_fetching(&id("acme.io"), DataCategory::Static, window)
                .await
                .unwrap(),
            AdvisoryLock::Acquired
        );
        assert!(matches!(
            cache
                .try_mark_fetching(&id("acme.io"), DataCategory::Static, window)
                .await
                .unwrap(),
            AdvisoryLock::HeldElsewhere { .. }
        ));

        cache
            .clear_fetch_lock(&id("acme.io"), DataCategory::Static)
            .await
            .unwrap();
        assert_eq!(
            cache
                .try_mark_fetching(&id("acme.io"), DataCategory::Static, window)
                .await
                .unwrap(),
            AdvisoryLock::Acquired
        );
    }

    #[tokio::test]
    async fn test_peek_is_not_a_read() {
        let (cache, backend) = store();
        seed_aged(&backend, "acme.io", DataCategory::Live, chrono::Duration::hours(2)).await;

        let row = cache.peek(&id("acme.io"), DataCategory::Live).await.unwrap();
        assert_eq!(row.map(|r| r.cache_hit_count), Some(0));
        assert!(cache.peek(&id("acme.io"), DataCategory::Static).await.unwrap().is_none());
        assert!(backend.cache_events().is_empty());
    }

    #[tokio::test]
    async fn test_analytics_counts_events() {
        let (cache, backend) = store();
        let since = Utc::now() - chrono::Duration::seconds(1);
        cache.get(&id("acme.io"), DataCategory::Live, false).await.unwrap();
        cache
            .put(&id("acme.io"), DataCategory::Live, "Acme", json!({}), "coingecko", 0.25)
            .await
            .unwrap();
        cache.get(&id("acme.io"), DataCategory::Live, false).await.unwrap();
        seed_aged(&backend, "stale", DataCategory::Live, chrono::Duration::hours(1)).await;
        cache.get(&id("stale"), DataCategory::Live, true).await.unwrap();

        let analytics = cache.analytics(since).await.unwrap();
        let live = analytics.by_category[&DataCategory::Live];
        assert_eq!(live.hits, 1);
        assert_eq!(live.misses, 1);
        assert_eq!(live.stale_hits, 1);
        assert!((live.hit_rate() - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(analytics.total().hits, 1);
    }

    #[tokio::test]
    async fn test_prune_events_before_cutoff() {
        let (cache, backend) = store();
        cache.get(&id("acme.io"), DataCategory::Static, false).await.unwrap();
        assert_eq!(backend.cache_events().len(), 1);

        let removed = cache
            .prune_events(Utc::now() - chrono::Duration::days(1))
            .await
            .unwrap();
        assert_eq!(removed, 0);

        let removed = cache
            .prune_events(Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(backend.cache_events().is_empty());
    }

    #[tokio::test]
    async fn test_prune_events_without_log() {
        let cache = CacheStore::new(Arc::new(InMemoryStore::new()), TtlConfig::default());
        assert_eq!(cache.prune_events(Utc::now()).await.unwrap(), 0);
    }
}
