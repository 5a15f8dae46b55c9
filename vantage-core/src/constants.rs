//! Constants for VANTAGE
//!
//! Default values for cache lifetimes, budgets, provider timeouts and batch
//! behaviour. Every value here can be overridden through [`crate::VantageConfig`].

// ============================================================================
// CACHE TTL
// ============================================================================

/// Static data (profile, funding, team) stays fresh for 30 days
pub const DEFAULT_TTL_STATIC_SECS: u64 = 30 * 24 * 60 * 60;

/// Live data (price, metrics, news) stays fresh for 15 minutes
pub const DEFAULT_TTL_LIVE_SECS: u64 = 15 * 60;

/// Mixed requests stay fresh for 6 hours
pub const DEFAULT_TTL_MIXED_SECS: u64 = 6 * 60 * 60;

// ============================================================================
// DAILY BUDGETS
// ============================================================================

/// Tavily daily call limit
pub const DEFAULT_TAVILY_DAILY_CALLS: u32 = 100;

/// Tavily daily spend limit (USD)
pub const DEFAULT_TAVILY_DAILY_COST: f64 = 5.0;

/// OpenBB daily call limit
pub const DEFAULT_OPENBB_DAILY_CALLS: u32 = 500;

/// OpenBB daily spend limit (USD). Zero means the service is free and only
/// the call count is enforced.
pub const DEFAULT_OPENBB_DAILY_COST: f64 = 0.0;

/// CoinGecko daily call limit
pub const DEFAULT_COINGECKO_DAILY_CALLS: u32 = 200;

/// CoinGecko daily spend limit (USD)
pub const DEFAULT_COINGECKO_DAILY_COST: f64 = 2.0;

// ============================================================================
// CALL PRICING
// ============================================================================

/// Estimated cost of one Tavily search (USD)
pub const DEFAULT_TAVILY_COST_PER_CALL: f64 = 0.01;

/// Estimated cost of one OpenBB call (USD)
pub const DEFAULT_OPENBB_COST_PER_CALL: f64 = 0.0;

/// Estimated cost of one CoinGecko call (USD)
pub const DEFAULT_COINGECKO_COST_PER_CALL: f64 = 0.002;

// ============================================================================
// PROVIDER TIMEOUTS
// ============================================================================

/// Company-research call timeout in seconds
pub const DEFAULT_RESEARCH_TIMEOUT_SECS: u64 = 30;

/// Crypto market-data call timeout in seconds
pub const DEFAULT_CRYPTO_TIMEOUT_SECS: u64 = 10;

/// Equity market-data call timeout in seconds
pub const DEFAULT_EQUITY_TIMEOUT_SECS: u64 = 15;

// ============================================================================
// BATCH OPERATIONS
// ============================================================================

/// Hard cap on real provider calls made by a single batch
pub const DEFAULT_BATCH_MAX_API_CALLS: usize = 20;

/// Pause between sequential batch calls in milliseconds
pub const DEFAULT_BATCH_CALL_PAUSE_MS: u64 = 300;

// ============================================================================
// ADVISORY LOCK
// ============================================================================

/// A `parallel_fetch_lock` younger than this is treated as "fetch in progress"
pub const DEFAULT_ADVISORY_LOCK_WINDOW_SECS: u64 = 5 * 60;

/// How long to wait on a held advisory lock before re-checking the cache
pub const DEFAULT_ADVISORY_LOCK_WAIT_MS: u64 = 2000;

// ============================================================================
// RETENTION
// ============================================================================

/// Days a row survives past its TTL before the sweep deletes it
pub const DEFAULT_RETENTION_GRACE_DAYS: u32 = 7;

/// Interval between retention sweeps in seconds
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Days usage records and cache events are kept
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 90;

// ============================================================================
// CONFIDENCE
// ============================================================================

/// Confidence contributed by each successful source in a parallel fetch
pub const CONFIDENCE_PER_SOURCE: f64 = 0.25;

/// Confidence multiplier for stale data served because of the budget
pub const CACHE_EXPIRED_CONFIDENCE_FACTOR: f64 = 0.8;

/// Confidence multiplier for stale data served because a provider failed
pub const CACHE_FALLBACK_CONFIDENCE_FACTOR: f64 = 0.6;

/// Confidence of a single market quote that carries a current price
pub const MARKET_QUOTE_CONFIDENCE: f64 = 0.9;

/// Confidence of a single market response without a current price
pub const PARTIAL_QUOTE_CONFIDENCE: f64 = 0.5;

// ============================================================================
// STORAGE
// ============================================================================

/// Default LMDB map size (1 GiB)
pub const DEFAULT_CACHE_MAP_SIZE: usize = 1024 * 1024 * 1024;

/// Default on-disk location of the cache environment
pub const DEFAULT_CACHE_PATH: &str = "./data/vantage-cache";

/// User id recorded for calls not attributed to a person
pub const SYSTEM_USER_ID: &str = "system";
