//! VANTAGE maintenance worker
//!
//! Opens the LMDB store and runs the retention sweep until Ctrl-C.

use std::sync::Arc;

use tokio::sync::watch;
use vantage_core::{StorageError, VantageResult};
use vantage_service::{
    cache_sweep_task, load_config_from_env, CacheSweepConfig, StorageSettings, TelemetryConfig,
};
use vantage_storage::{BudgetLedger, CacheStore, LmdbStore};

#[tokio::main]
async fn main() -> VantageResult<()> {
    let telemetry_config = TelemetryConfig::default();
    vantage_service::init_tracing(&telemetry_config)?;

    let config = load_config_from_env()?;
    let storage = StorageSettings::from_env();
    let store = Arc::new(
        LmdbStore::open(&storage.cache_path, storage.map_size_mb).map_err(StorageError::from)?,
    );
    tracing::info!(
        path = %storage.cache_path,
        map_size_mb = storage.map_size_mb,
        "Cache store opened"
    );

    let cache = CacheStore::new(store.clone(), config.ttl).with_event_log(store.clone());
    let ledger = BudgetLedger::new(store, &config);
    let sweep_config = CacheSweepConfig::from(&config.retention);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut sweep = tokio::spawn(cache_sweep_task(cache, ledger, sweep_config, shutdown_rx));

    tokio::select! {
        result = &mut sweep => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Cache sweep task ended unexpectedly");
            }
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    match sweep.await {
        Ok(metrics) => {
            let snapshot = metrics.snapshot();
            tracing::info!(
                sweep_cycles = snapshot.sweep_cycles,
                rows_removed = snapshot.rows_removed,
                events_pruned = snapshot.events_pruned,
                usage_pruned = snapshot.usage_pruned,
                "Maintenance worker stopped"
            );
        }
        Err(e) => tracing::error!(error = %e, "Cache sweep task failed to join"),
    }
    Ok(())
}
