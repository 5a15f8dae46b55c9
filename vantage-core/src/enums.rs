//! Enum types for VANTAGE entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// DATA TYPES AND CATEGORIES
// ============================================================================

/// A kind of company data a caller can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum DataType {
    Profile,
    Funding,
    Team,
    Price,
    Metrics,
    News,
}

impl DataType {
    pub const ALL: [DataType; 6] = [
        DataType::Profile,
        DataType::Funding,
        DataType::Team,
        DataType::Price,
        DataType::Metrics,
        DataType::News,
    ];

    /// The freshness category this data type belongs to.
    pub fn category(&self) -> DataCategory {
        match self {
            DataType::Profile | DataType::Funding | DataType::Team => DataCategory::Static,
            DataType::Price | DataType::Metrics | DataType::News => DataCategory::Live,
        }
    }

    /// Served by the company-research provider.
    pub fn is_research(&self) -> bool {
        matches!(
            self,
            DataType::Profile | DataType::Funding | DataType::Team | DataType::News
        )
    }

    /// Served by a market-data provider.
    pub fn is_market(&self) -> bool {
        matches!(self, DataType::Price | DataType::Metrics)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Profile => "profile",
            DataType::Funding => "funding",
            DataType::Team => "team",
            DataType::Price => "price",
            DataType::Metrics => "metrics",
            DataType::News => "news",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "profile" => Ok(DataType::Profile),
            "funding" => Ok(DataType::Funding),
            "team" => Ok(DataType::Team),
            "price" => Ok(DataType::Price),
            "metrics" => Ok(DataType::Metrics),
            "news" => Ok(DataType::News),
            _ => Err(format!("Invalid DataType: {}", s)),
        }
    }
}

/// Freshness class of a cache row, selecting its TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum DataCategory {
    /// Profile, funding and team data (slow-moving).
    Static,
    /// Price, metrics and news (fast-moving).
    Live,
    /// A request spanning both.
    Mixed,
}

impl DataCategory {
    pub const ALL: [DataCategory; 3] = [DataCategory::Static, DataCategory::Live, DataCategory::Mixed];

    /// Classify a set of requested data types.
    ///
    /// Only static types gives `Static`, only live types gives `Live`, both
    /// gives `Mixed`. An empty request is treated as a profile request.
    pub fn from_data_types(types: &[DataType]) -> Self {
        let has_static = types.iter().any(|t| t.category() == DataCategory::Static);
        let has_live = types.iter().any(|t| t.category() == DataCategory::Live);
        match (has_static, has_live) {
            (true, true) => DataCategory::Mixed,
            (false, true) => DataCategory::Live,
            _ => DataCategory::Static,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DataCategory::Static => "static",
            DataCategory::Live => "live",
            DataCategory::Mixed => "mixed",
        }
    }

    /// Single-byte discriminant used in storage keys.
    pub fn as_byte(&self) -> u8 {
        match self {
            DataCategory::Static => 0,
            DataCategory::Live => 1,
            DataCategory::Mixed => 2,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(DataCategory::Static),
            1 => Some(DataCategory::Live),
            2 => Some(DataCategory::Mixed),
            _ => None,
        }
    }
}

impl fmt::Display for DataCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "static" => Ok(DataCategory::Static),
            "live" => Ok(DataCategory::Live),
            "mixed" => Ok(DataCategory::Mixed),
            _ => Err(format!("Invalid DataCategory: {}", s)),
        }
    }
}

// ============================================================================
// SERVICES AND SOURCES
// ============================================================================

/// Paid or rate-limited external service that budgets are tracked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum ExternalService {
    /// Company-research text search.
    Tavily,
    /// Equity market data.
    OpenBb,
    /// Crypto market data.
    CoinGecko,
}

impl ExternalService {
    pub const ALL: [ExternalService; 3] = [
        ExternalService::Tavily,
        ExternalService::OpenBb,
        ExternalService::CoinGecko,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExternalService::Tavily => "tavily",
            ExternalService::OpenBb => "openbb",
            ExternalService::CoinGecko => "coingecko",
        }
    }

    pub fn as_byte(&self) -> u8 {
        match self {
            ExternalService::Tavily => 0,
            ExternalService::OpenBb => 1,
            ExternalService::CoinGecko => 2,
        }
    }
}

impl fmt::Display for ExternalService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExternalService {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tavily" => Ok(ExternalService::Tavily),
            "openbb" => Ok(ExternalService::OpenBb),
            "coingecko" => Ok(ExternalService::CoinGecko),
            _ => Err(format!("Invalid ExternalService: {}", s)),
        }
    }
}

/// Where the data in a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum DataSource {
    /// Fresh cache hit.
    Cache,
    /// Stale cache served because the budget was exhausted.
    CacheExpired,
    /// Stale cache served because the provider call failed.
    CacheFallback,
    /// Single provider call.
    Api,
    /// Parallel fan-out across providers.
    ApiParallel,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Cache => "cache",
            DataSource::CacheExpired => "cache_expired",
            DataSource::CacheFallback => "cache_fallback",
            DataSource::Api => "api",
            DataSource::ApiParallel => "api_parallel",
        }
    }

    /// True when the data was served from the cache, fresh or not.
    pub fn is_cached(&self) -> bool {
        matches!(
            self,
            DataSource::Cache | DataSource::CacheExpired | DataSource::CacheFallback
        )
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
