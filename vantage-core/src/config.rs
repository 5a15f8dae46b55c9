//! Configuration types

use crate::constants::*;
use crate::*;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const SECS_PER_DAY: u64 = 24 * 60 * 60;

// ============================================================================
// TTL POLICY
// ============================================================================

/// Freshness lifetime per data category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct TtlConfig {
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub static_ttl: Duration,
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub live_ttl: Duration,
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub mixed_ttl: Duration,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            static_ttl: Duration::from_secs(DEFAULT_TTL_STATIC_SECS),
            live_ttl: Duration::from_secs(DEFAULT_TTL_LIVE_SECS),
            mixed_ttl: Duration::from_secs(DEFAULT_TTL_MIXED_SECS),
        }
    }
}

impl TtlConfig {
    pub fn ttl_for(&self, category: DataCategory) -> Duration {
        match category {
            DataCategory::Static => self.static_ttl,
            DataCategory::Live => self.live_ttl,
            DataCategory::Mixed => self.mixed_ttl,
        }
    }

    /// Whether data fetched at `fetched_at` is still fresh at `now`.
    ///
    /// The boundary is inclusive: an age of exactly the TTL is fresh.
    pub fn is_fresh(&self, category: DataCategory, fetched_at: Timestamp, now: Timestamp) -> bool {
        now - fetched_at <= to_chrono(self.ttl_for(category))
    }
}

// ============================================================================
// BUDGETS
// ============================================================================

/// Daily limit and per-call price for one external service.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BudgetLimit {
    pub daily_calls: u32,
    /// Daily spend cap in USD. Zero disables the cost check.
    pub daily_cost: f64,
    pub cost_per_call: f64,
}

impl BudgetLimit {
    pub fn new(daily_calls: u32, daily_cost: f64, cost_per_call: f64) -> Self {
        Self {
            daily_calls,
            daily_cost,
            cost_per_call,
        }
    }

    pub fn default_for(service: ExternalService) -> Self {
        match service {
            ExternalService::Tavily => Self::new(
                DEFAULT_TAVILY_DAILY_CALLS,
                DEFAULT_TAVILY_DAILY_COST,
                DEFAULT_TAVILY_COST_PER_CALL,
            ),
            ExternalService::OpenBb => Self::new(
                DEFAULT_OPENBB_DAILY_CALLS,
                DEFAULT_OPENBB_DAILY_COST,
                DEFAULT_OPENBB_COST_PER_CALL,
            ),
            ExternalService::CoinGecko => Self::new(
                DEFAULT_COINGECKO_DAILY_CALLS,
                DEFAULT_COINGECKO_DAILY_COST,
                DEFAULT_COINGECKO_COST_PER_CALL,
            ),
        }
    }
}

// ============================================================================
// PROVIDER TIMEOUTS
// ============================================================================

/// Per-call timeouts for each provider family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ProviderTimeouts {
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub research: Duration,
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub crypto: Duration,
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub equity: Duration,
}

impl Default for ProviderTimeouts {
    fn default() -> Self {
        Self {
            research: Duration::from_secs(DEFAULT_RESEARCH_TIMEOUT_SECS),
            crypto: Duration::from_secs(DEFAULT_CRYPTO_TIMEOUT_SECS),
            equity: Duration::from_secs(DEFAULT_EQUITY_TIMEOUT_SECS),
        }
    }
}

impl ProviderTimeouts {
    pub fn for_service(&self, service: ExternalService) -> Duration {
        match service {
            ExternalService::Tavily => self.research,
            ExternalService::CoinGecko => self.crypto,
            ExternalService::OpenBb => self.equity,
        }
    }
}

// ============================================================================
// BATCH
// ============================================================================

/// Batch request behaviour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BatchConfig {
    /// Hard cap on provider calls per batch, regardless of remaining budget
    pub max_api_calls: usize,
    /// Pause between sequential batch calls
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub call_pause: Duration,
    /// Data types in descending priority; unlisted types sort last
    pub priority: Vec<DataType>,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_api_calls: DEFAULT_BATCH_MAX_API_CALLS,
            call_pause: Duration::from_millis(DEFAULT_BATCH_CALL_PAUSE_MS),
            priority: vec![DataType::Profile, DataType::Funding, DataType::Team],
        }
    }
}

impl BatchConfig {
    /// Sort rank of a data type; lower runs first.
    pub fn rank(&self, data_type: DataType) -> usize {
        self.priority
            .iter()
            .position(|t| *t == data_type)
            .unwrap_or(self.priority.len())
    }
}

// ============================================================================
// ADVISORY LOCK AND RETENTION
// ============================================================================

/// Cross-process advisory lock behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct AdvisoryLockConfig {
    /// Lock timestamps younger than this count as held
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub window: Duration,
    /// Wait before re-checking the cache when the lock looks held
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub wait: Duration,
}

impl Default for AdvisoryLockConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(DEFAULT_ADVISORY_LOCK_WINDOW_SECS),
            wait: Duration::from_millis(DEFAULT_ADVISORY_LOCK_WAIT_MS),
        }
    }
}

/// Retention sweep behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct RetentionConfig {
    pub grace_days: u32,
    #[cfg_attr(feature = "openapi", schema(value_type = u64))]
    pub sweep_interval: Duration,
    /// Usage records and cache events older than this are pruned
    pub log_retention_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            grace_days: DEFAULT_RETENTION_GRACE_DAYS,
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            log_retention_days: DEFAULT_LOG_RETENTION_DAYS,
        }
    }
}

impl RetentionConfig {
    pub fn grace(&self) -> Duration {
        days(self.grace_days)
    }

    pub fn log_retention(&self) -> Duration {
        days(self.log_retention_days)
    }
}

fn days(count: u32) -> Duration {
    Duration::from_secs(u64::from(count).saturating_mul(SECS_PER_DAY))
}

// ============================================================================
// VANTAGE CONFIG
// ============================================================================

/// Aggregate configuration for the cache, ledger and fetch services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct VantageConfig {
    pub ttl: TtlConfig,
    pub tavily_budget: BudgetLimit,
    pub openbb_budget: BudgetLimit,
    pub coingecko_budget: BudgetLimit,
    pub timeouts: ProviderTimeouts,
    pub batch: BatchConfig,
    pub advisory_lock: AdvisoryLockConfig,
    pub retention: RetentionConfig,
}

impl Default for VantageConfig {
    fn default() -> Self {
        Self {
            ttl: TtlConfig::default(),
            tavily_budget: BudgetLimit::default_for(ExternalService::Tavily),
            openbb_budget: BudgetLimit::default_for(ExternalService::OpenBb),
            coingecko_budget: BudgetLimit::default_for(ExternalService::CoinGecko),
            timeouts: ProviderTimeouts::default(),
            batch: BatchConfig::default(),
            advisory_lock: AdvisoryLockConfig::default(),
            retention: RetentionConfig::default(),
        }
    }
}

impl VantageConfig {
    pub fn budget_for(&self, service: ExternalService) -> BudgetLimit {
        match service {
            ExternalService::Tavily => self.tavily_budget,
            ExternalService::OpenBb => self.openbb_budget,
            ExternalService::CoinGecko => self.coingecko_budget,
        }
    }

    pub fn with_ttl(mut self, ttl: TtlConfig) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_budget(mut self, service: ExternalService, limit: BudgetLimit) -> Self {
        match service {
            ExternalService::Tavily => self.tavily_budget = limit,
            ExternalService::OpenBb => self.openbb_budget = limit,
            ExternalService::CoinGecko => self.coingecko_budget = limit,
        }
        self
    }

    pub fn with_timeouts(mut self, timeouts: ProviderTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_batch(mut self, batch: BatchConfig) -> Self {
        self.batch = batch;
        self
    }

    pub fn with_advisory_lock(mut self, advisory_lock: AdvisoryLockConfig) -> Self {
        self.advisory_lock = advisory_lock;
        self
    }

    pub fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - every TTL is positive
    /// - budget costs are finite and non-negative
    /// - the batch cap is positive
    /// - provider timeouts are positive
    pub fn validate(&self) -> VantageResult<()> {
        for category in DataCategory::ALL {
            let ttl = self.ttl.ttl_for(category);
            if ttl.is_zero() {
                return Err(invalid(
                    format!("ttl.{}", category),
                    format!("{:?}", ttl),
                    "ttl must be positive",
                ));
            }
        }

        for service in ExternalService::ALL {
            let limit = self.budget_for(service);
            if !limit.daily_cost.is_finite() || limit.daily_cost < 0.0 {
                return Err(invalid(
                    format!("budget.{}.daily_cost", service),
                    limit.daily_cost.to_string(),
                    "daily_cost must be a non-negative number",
                ));
            }
            if !limit.cost_per_call.is_finite() || limit.cost_per_call < 0.0 {
                return Err(invalid(
                    format!("budget.{}.cost_per_call", service),
                    limit.cost_per_call.to_string(),
                    "cost_per_call must be a non-negative number",
                ));
            }
            if self.timeouts.for_service(service).is_zero() {
                return Err(invalid(
                    format!("timeouts.{}", service),
                    format!("{:?}", self.timeouts.for_service(service)),
                    "timeout must be positive",
                ));
            }
        }

        if self.batch.max_api_calls == 0 {
            return Err(invalid(
                "batch.max_api_calls".to_string(),
                "0".to_string(),
                "max_api_calls must be greater than 0",
            ));
        }

        if self.retention.log_retention_days == 0 {
            return Err(invalid(
                "retention.log_retention_days".to_string(),
                "0".to_string(),
                "log_retention_days must be at least 1 to keep today's usage",
            ));
        }

        if self.retention.sweep_interval.is_zero() {
            return Err(invalid(
                "retention.sweep_interval".to_string(),
                format!("{:?}", self.retention.sweep_interval),
                "sweep_interval must be positive",
            ));
        }

        Ok(())
    }
}

fn invalid(field: String, value: String, reason: &str) -> VantageError {
    VantageError::Config(ConfigError::InvalidValue {
        field,
        value,
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_default_ttls() {
        let ttl = TtlConfig::default();
        assert_eq!(ttl.ttl_for(DataCategory::Static), Duration::from_secs(2_592_000));
        assert_eq!(ttl.ttl_for(DataCategory::Live), Duration::from_secs(900));
        assert_eq!(ttl.ttl_for(DataCategory::Mixed), Duration::from_secs(21_600));
    }

    #[test]
    fn test_live_freshness_boundaries() {
        let ttl = TtlConfig::default();
        let now = Utc::now();
        let minutes = chrono::Duration::minutes;
        assert!(ttl.is_fresh(DataCategory::Live, now - minutes(10), now));
        assert!(ttl.is_fresh(DataCategory::Live, now - minutes(15), now));
        assert!(!ttl.is_fresh(DataCategory::Live, now - minutes(16), now));
        assert!(!ttl.is_fresh(
            DataCategory::Live,
            now - minutes(15) - chrono::Duration::milliseconds(1),
            now
        ));
    }

    #[test]
    fn test_default_budgets() {
        let config = VantageConfig::default();
        let tavily = config.budget_for(ExternalService::Tavily);
        assert_eq!(tavily.daily_calls, 100);
        assert_eq!(tavily.daily_cost, 5.0);
        assert_eq!(config.budget_for(ExternalService::OpenBb).daily_calls, 500);
        assert_eq!(config.budget_for(ExternalService::CoinGecko).daily_cost, 2.0);
    }

    #[test]
    fn test_batch_rank() {
        let batch = BatchConfig::default();
        assert!(batch.rank(DataType::Profile) < batch.rank(DataType::Funding));
        assert!(batch.rank(DataType::Funding) < batch.rank(DataType::Team));
        assert_eq!(batch.rank(DataType::News), 3);
    }

    #[test]
    fn test_validate_defaults_ok() {
        assert!(VantageConfig::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let config = VantageConfig::default().with_ttl(TtlConfig {
            live_ttl: Duration::ZERO,
            ..TtlConfig::default()
        });
        let err = config.validate().unwrap_err();
        assert!(format!("{}", err).contains("ttl.live"));
    }

    #[test]
    fn test_validate_rejects_negative_cost() {
        let config = VantageConfig::default()
            .with_budget(ExternalService::Tavily, BudgetLimit::new(10, -1.0, 0.01));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_batch_cap() {
        let config = VantageConfig::default().with_batch(BatchConfig {
            max_api_calls: 0,
            ..BatchConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_log_retention() {
        let config = VantageConfig::default().with_retention(RetentionConfig {
            log_retention_days: 0,
            ..RetentionConfig::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retention_durations() {
        let retention = RetentionConfig {
            grace_days: u32::MAX,
            ..RetentionConfig::default()
        };
        assert_eq!(retention.grace(), Duration::from_secs(u64::from(u32::MAX) * 86400));
        assert_eq!(RetentionConfig::default().log_retention(), Duration::from_secs(90 * 86400));
    }
}
