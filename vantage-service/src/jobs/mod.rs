//! Background Jobs for VANTAGE
//!
//! - `cache_sweep`: Deletes cache rows that outlived their TTL plus the
//!   retention grace period, and prunes old usage records and cache events
//!
//! # Usage
//!
//! ```ignore
//! use vantage_service::jobs::{cache_sweep_task, CacheSweepConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let sweep_config = CacheSweepConfig::from(&config.retention);
//! let handle = tokio::spawn(cache_sweep_task(cache_store, ledger, sweep_config, shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! let metrics = handle.await?;
//! ```

pub mod cache_sweep;

pub use cache_sweep::{cache_sweep_task, CacheSweepConfig, SweepMetrics, SweepSnapshot};
