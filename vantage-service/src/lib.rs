//! VANTAGE Service - Fetch orchestration and cost-optimized access
//!
//! Ties the cache store, budget ledger and provider registry together:
//!
//! - [`CompanyDataService`] fans requests for several data types out to every
//!   relevant provider at once and merges the results.
//! - [`CostOptimizedDataService`] serves single sections and bounded batches,
//!   spending provider calls only when the cache cannot answer.
//!
//! Both are plain values built once at startup and shared by cloning.

mod cache_io;

pub mod config;
pub mod jobs;
pub mod lock;
pub mod orchestrator;
pub mod request;
pub mod telemetry;

pub use config::{load_config_from_env, ProviderCredentials, StorageSettings};
pub use jobs::{cache_sweep_task, CacheSweepConfig, SweepMetrics, SweepSnapshot};
pub use lock::CompanyLockRegistry;
pub use orchestrator::{
    plan_calls, CallFailure, CallKind, CompanyDataService, FetchMetadata, FetchOptions,
    FetchResult, PlannedCall,
};
pub use request::{BatchItem, BatchResponse, BatchSummary, CacheResponse, CostOptimizedDataService};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
