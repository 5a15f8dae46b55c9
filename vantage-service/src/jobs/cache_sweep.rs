//! Cache Retention Sweep
//!
//! Rows are never deleted on read. A stale row stays available as a fallback
//! until its expiry plus the grace period has passed; this task removes rows
//! past that point on a fixed interval. The same pass prunes usage records
//! and cache events older than the log retention window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use vantage_core::{to_chrono, RetentionConfig};
use vantage_storage::{BudgetLedger, CacheStore};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the retention sweep task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSweepConfig {
    /// How often to sweep (default: 1 hour)
    pub interval: Duration,

    /// How long a row survives past its TTL (default: 7 days)
    pub grace: Duration,

    /// How long usage records and cache events are kept (default: 90 days)
    pub log_retention: Duration,
}

impl Default for CacheSweepConfig {
    fn default() -> Self {
        Self::from(&RetentionConfig::default())
    }
}

/// Environment overrides are applied by
/// [`load_config_from_env`](crate::load_config_from_env); build the sweep
/// config from its `retention` section.
impl From<&RetentionConfig> for CacheSweepConfig {
    fn from(retention: &RetentionConfig) -> Self {
        Self {
            interval: retention.sweep_interval,
            grace: retention.grace(),
            log_retention: retention.log_retention(),
        }
    }
}

impl CacheSweepConfig {
    /// Frequent sweeps, a one-hour grace period and a week of logs.
    pub fn development() -> Self {
        Self {
            interval: Duration::from_secs(60),
            grace: Duration::from_secs(3600),
            log_retention: Duration::from_secs(7 * 24 * 3600),
        }
    }

    pub fn production() -> Self {
        Self::default()
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for sweep activity since startup.
#[derive(Debug, Default)]
pub struct SweepMetrics {
    pub sweep_cycles: AtomicU64,
    pub rows_scanned: AtomicU64,
    pub rows_removed: AtomicU64,
    pub events_pruned: AtomicU64,
    pub usage_pruned: AtomicU64,
    pub sweep_errors: AtomicU64,
}

impl SweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> SweepSnapshot {
        SweepSnapshot {
            sweep_cycles: self.sweep_cycles.load(Ordering::Relaxed),
            rows_scanned: self.rows_scanned.load(Ordering::Relaxed),
            rows_removed: self.rows_removed.load(Ordering::Relaxed),
            events_pruned: self.events_pruned.load(Ordering::Relaxed),
            usage_pruned: self.usage_pruned.load(Ordering::Relaxed),
            sweep_errors: self.sweep_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`SweepMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepSnapshot {
    pub sweep_cycles: u64,
    pub rows_scanned: u64,
    pub rows_removed: u64,
    pub events_pruned: u64,
    pub usage_pruned: u64,
    pub sweep_errors: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Sweep `store` and prune `ledger` every `config.interval` until
/// `shutdown_rx` turns true.
///
/// The first sweep runs immediately. A failed step is counted and logged;
/// the task keeps running.
pub async fn cache_sweep_task(
    store: CacheStore,
    ledger: BudgetLedger,
    config: CacheSweepConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<SweepMetrics> {
    let metrics = Arc::new(SweepMetrics::new());

    let mut sweep_interval = interval(config.interval);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        grace_secs = config.grace.as_secs(),
        log_retention_secs = config.log_retention.as_secs(),
        "Cache sweep task started"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Cache sweep task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                sweep_once(&store, &ledger, &config, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweep_cycles = snapshot.sweep_cycles,
        rows_scanned = snapshot.rows_scanned,
        rows_removed = snapshot.rows_removed,
        events_pruned = snapshot.events_pruned,
        usage_pruned = snapshot.usage_pruned,
        sweep_errors = snapshot.sweep_errors,
        "Cache sweep task completed"
    );

    metrics
}

async fn sweep_once(
    store: &CacheStore,
    ledger: &BudgetLedger,
    config: &CacheSweepConfig,
    metrics: &SweepMetrics,
) {
    metrics.sweep_cycles.fetch_add(1, Ordering::Relaxed);

    match store.sweep(config.grace).await {
        Ok(report) => {
            metrics.rows_scanned.fetch_add(report.scanned, Ordering::Relaxed);
            metrics.rows_removed.fetch_add(report.removed, Ordering::Relaxed);
            if report.removed > 0 {
                tracing::info!(
                    scanned = report.scanned,
                    removed = report.removed,
                    "Cache sweep cycle completed"
                );
            } else {
                tracing::trace!(scanned = report.scanned, "Cache sweep found nothing to remove");
            }
        }
        Err(e) => {
            tracing::error!(error = %e, "Cache sweep failed");
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    let cutoff = Utc::now() - to_chrono(config.log_retention);
    match store.prune_events(cutoff).await {
        Ok(removed) => {
            metrics.events_pruned.fetch_add(removed, Ordering::Relaxed);
        }
        Err(e) => {
            tracing::error!(error = %e, "Cache event pruning failed");
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
    match ledger.prune_usage(cutoff).await {
        Ok(removed) => {
            metrics.usage_pruned.fetch_add(removed, Ordering::Relaxed);
        }
        Err(e) => {
            tracing::error!(error = %e, "Usage record pruning failed");
            metrics.sweep_errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use vantage_core::{
        CompanyIdentifier, DataCategory, ExternalService, TtlConfig, UsageRecord, VantageConfig,
    };
    use vantage_storage::InMemoryStore;

    fn stores(backend: &InMemoryStore) -> (CacheStore, BudgetLedger) {
        let shared = Arc::new(backend.clone());
        let cache =
            CacheStore::new(shared.clone(), TtlConfig::default()).with_event_log(shared.clone());
        let ledger = BudgetLedger::new(shared, &VantageConfig::default());
        (cache, ledger)
    }

    #[test]
    fn test_config_default() {
        let config = CacheSweepConfig::default();
        assert_eq!(config.interval, Duration::from_secs(3600));
        assert_eq!(config.grace, Duration::from_secs(7 * 86400));
        assert_eq!(config.log_retention, Duration::from_secs(90 * 86400));
    }

    #[test]
    fn test_config_development() {
        let config = CacheSweepConfig::development();
        assert!(config.interval < CacheSweepConfig::production().interval);
        assert!(config.grace < CacheSweepConfig::production().grace);
        assert!(config.log_retention < CacheSweepConfig::production().log_retention);
    }

    #[test]
    fn test_config_from_retention() {
        let retention = RetentionConfig {
            grace_days: 2,
            sweep_interval: Duration::from_secs(120),
            log_retention_days: 30,
        };
        let config = CacheSweepConfig::from(&retention);
        assert_eq!(config.interval, Duration::from_secs(120));
        assert_eq!(config.grace, Duration::from_secs(2 * 86400));
        assert_eq!(config.log_retention, Duration::from_secs(30 * 86400));
    }

    #[test]
    fn test_config_from_huge_grace_saturates() {
        let retention = RetentionConfig {
            grace_days: u32::MAX,
            ..RetentionConfig::default()
        };
        let config = CacheSweepConfig::from(&retention);
        assert!(config.grace >= Duration::from_secs(u64::from(u32::MAX)));
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = SweepMetrics::new();
        metrics.sweep_cycles.fetch_add(3, Ordering::Relaxed);
        metrics.rows_removed.fetch_add(5, Ordering::Relaxed);
        metrics.usage_pruned.fetch_add(2, Ordering::Relaxed);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.sweep_cycles, 3);
        assert_eq!(snapshot.rows_removed, 5);
        assert_eq!(snapshot.usage_pruned, 2);
        assert_eq!(snapshot.sweep_errors, 0);
    }

    #[tokio::test]
    async fn test_sweep_once_prunes_old_logs() {
        let backend = InMemoryStore::new();
        let (cache, ledger) = stores(&backend);
        let now = Utc::now();
        for at in [now - chrono::Duration::days(200), now] {
            ledger
                .log_usage(UsageRecord::new(None, ExternalService::Tavily, "search", 0.01, at))
                .await
                .unwrap();
        }
        cache
            .get(&CompanyIdentifier::from_assigned("acme.io"), DataCategory::Static, false)
            .await
            .unwrap();

        let metrics = SweepMetrics::new();
        sweep_once(&cache, &ledger, &CacheSweepConfig::default(), &metrics).await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.usage_pruned, 1);
        assert_eq!(snapshot.events_pruned, 0);
        assert_eq!(snapshot.sweep_errors, 0);
        assert_eq!(backend.usage_records().len(), 1);
        assert_eq!(backend.cache_events().len(), 1);
    }

    #[tokio::test]
    async fn test_task_stops_on_shutdown() {
        let (cache, ledger) = stores(&InMemoryStore::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = CacheSweepConfig {
            interval: Duration::from_millis(10),
            grace: Duration::ZERO,
            log_retention: Duration::from_secs(86400),
        };

        let handle = tokio::spawn(cache_sweep_task(cache, ledger, config, shutdown_rx));
        tokio::time::sleep(Duration::from_millis(35)).await;
        shutdown_tx.send(true).unwrap();

        let metrics = handle.await.unwrap();
        let snapshot = metrics.snapshot();
        assert!(snapshot.sweep_cycles >= 1);
        assert_eq!(snapshot.sweep_errors, 0);
    }
}
