//! VANTAGE Core - Entity Types
//!
//! Pure data structures for the company-data cache. All other crates depend
//! on this. This crate contains no I/O: identifiers, categories, payload
//! sections, cache and usage records, configuration and the error taxonomy.

use chrono::{DateTime, Utc};

pub mod company;
pub mod config;
pub mod constants;
pub mod entities;
pub mod enums;
pub mod error;
pub mod identifier;
pub mod payload;

pub use company::{lookup_ticker, CompanyRef, CompanyType};
pub use config::{
    AdvisoryLockConfig, BatchConfig, BudgetLimit, ProviderTimeouts, RetentionConfig, TtlConfig,
    VantageConfig,
};
pub use entities::{
    BudgetStatus, CacheEntry, CacheEvent, CacheEventKind, ServiceUsage, UsageRecord, UsageSummary,
    SYSTEM_USER,
};
pub use enums::{DataCategory, DataSource, DataType, ExternalService};
pub use error::{
    BudgetError, ConfigError, LogError, ProviderError, StorageError, ValidationError, VantageError,
    VantageResult,
};
pub use identifier::{normalize, CompanyIdentifier};
pub use payload::{CompanyData, FundingData, NewsArticle, NewsData, PriceData, ProfileData, TeamData};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Convert a std duration into a chrono delta, saturating on overflow.
pub fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::TimeDelta::MAX)
}

/// Seconds elapsed between `earlier` and `later`, clamped at zero.
pub fn seconds_between(earlier: Timestamp, later: Timestamp) -> f64 {
    let millis = (later - earlier).num_milliseconds().max(0);
    millis as f64 / 1000.0
}
