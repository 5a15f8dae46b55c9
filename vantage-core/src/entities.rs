//! Persisted records: cache rows, usage records and cache analytics events.

use crate::{
    to_chrono, CompanyIdentifier, DataCategory, ExternalService, Timestamp, TtlConfig,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// User id recorded for calls made without an attributed user.
pub const SYSTEM_USER: &str = crate::constants::SYSTEM_USER_ID;

// ============================================================================
// CACHE ENTRY
// ============================================================================

/// One cached row per (identifier, category).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CacheEntry {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub identifier: CompanyIdentifier,
    pub category: DataCategory,
    pub company_name: String,
    /// Opaque JSON payload
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub payload: serde_json::Value,
    /// Provider(s) that produced the payload
    pub source: String,
    pub confidence_score: f64,
    pub cache_hit_count: u64,
    pub last_fetched: Timestamp,
    pub last_fetched_static: Option<Timestamp>,
    pub last_fetched_live: Option<Timestamp>,
    /// Informational only. Freshness is always computed from `last_fetched`.
    pub expires_at: Timestamp,
    /// Advisory marker that a fetch is in progress somewhere
    pub parallel_fetch_lock: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl CacheEntry {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identifier: CompanyIdentifier,
        category: DataCategory,
        company_name: impl Into<String>,
        payload: serde_json::Value,
        source: impl Into<String>,
        confidence_score: f64,
        ttl: Duration,
        now: Timestamp,
    ) -> Self {
        let mut entry = Self {
            identifier,
            category,
            company_name: company_name.into(),
            payload,
            source: source.into(),
            confidence_score: confidence_score.clamp(0.0, 1.0),
            cache_hit_count: 0,
            last_fetched: now,
            last_fetched_static: None,
            last_fetched_live: None,
            expires_at: now + to_chrono(ttl),
            parallel_fetch_lock: None,
            created_at: now,
            updated_at: now,
        };
        entry.bump_fetched(now);
        entry
    }

    /// Bump the freshness timestamps owned by this row's category.
    pub fn bump_fetched(&mut self, now: Timestamp) {
        self.last_fetched = now;
        match self.category {
            DataCategory::Static => self.last_fetched_static = Some(now),
            DataCategory::Live => self.last_fetched_live = Some(now),
            DataCategory::Mixed => {
                self.last_fetched_static = Some(now);
                self.last_fetched_live = Some(now);
            }
        }
        self.updated_at = now;
    }

    /// Overwrite the payload in place, as an upsert does.
    pub fn overwrite(
        &mut self,
        company_name: impl Into<String>,
        payload: serde_json::Value,
        source: impl Into<String>,
        confidence_score: f64,
        ttl: Duration,
        now: Timestamp,
    ) {
        self.company_name = company_name.into();
        self.payload = payload;
        self.source = source.into();
        self.confidence_score = confidence_score.clamp(0.0, 1.0);
        self.expires_at = now + to_chrono(ttl);
        self.bump_fetched(now);
    }

    /// The timestamp freshness is measured from for this row's category.
    ///
    /// A mixed row is only as fresh as its older half.
    pub fn freshness_anchor(&self) -> Timestamp {
        match self.category {
            DataCategory::Static => self.last_fetched_static.unwrap_or(self.last_fetched),
            DataCategory::Live => self.last_fetched_live.unwrap_or(self.last_fetched),
            DataCategory::Mixed => match (self.last_fetched_static, self.last_fetched_live) {
                (Some(s), Some(l)) => s.min(l),
                (Some(t), None) | (None, Some(t)) => t,
                (None, None) => self.last_fetched,
            },
        }
    }

    pub fn is_fresh(&self, ttl: &TtlConfig, now: Timestamp) -> bool {
        ttl.is_fresh(self.category, self.freshness_anchor(), now)
    }

    pub fn age(&self, now: Timestamp) -> Duration {
        (now - self.freshness_anchor())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// When this row stops being fresh.
    pub fn computed_expiry(&self, ttl: &TtlConfig) -> Timestamp {
        self.freshness_anchor() + to_chrono(ttl.ttl_for(self.category))
    }

    /// Whether another fetch marked this row within `window` of `now`.
    pub fn lock_held(&self, now: Timestamp, window: Duration) -> bool {
        match self.parallel_fetch_lock {
            Some(locked_at) => now - locked_at < to_chrono(window),
            None => false,
        }
    }
}

// ============================================================================
// CACHE ANALYTICS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub enum CacheEventKind {
    Hit,
    /// An expired row was returned to a caller that asked for expired data
    StaleHit,
    Miss,
}

/// One cache read outcome, appended for hit-rate analytics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CacheEvent {
    #[cfg_attr(feature = "openapi", schema(value_type = String))]
    pub identifier: CompanyIdentifier,
    pub category: DataCategory,
    pub kind: CacheEventKind,
    pub at: Timestamp,
}

// ============================================================================
// USAGE AND BUDGET
// ============================================================================

/// One external call attempt. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UsageRecord {
    pub id: Uuid,
    pub user_id: String,
    pub service: ExternalService,
    pub endpoint: String,
    pub was_cached: bool,
    pub cost_estimate: f64,
    pub latency_ms: u64,
    #[cfg_attr(feature = "openapi", schema(value_type = Object))]
    pub params: Option<serde_json::Value>,
    pub created_at: Timestamp,
}

impl UsageRecord {
    pub fn new(
        user_id: Option<&str>,
        service: ExternalService,
        endpoint: impl Into<String>,
        cost_estimate: f64,
        now: Timestamp,
    ) -> Self {
        Self {
            id: Uuid::now_v7(),
            user_id: user_id
                .filter(|u| !u.trim().is_empty())
                .unwrap_or(SYSTEM_USER)
                .to_string(),
            service,
            endpoint: endpoint.into(),
            was_cached: false,
            cost_estimate,
            latency_ms: 0,
            params: None,
            created_at: now,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = Some(params);
        self
    }

    pub fn cached(mut self, was_cached: bool) -> Self {
        self.was_cached = was_cached;
        self
    }
}

/// Budget position of one (user, service) pair for the current UTC day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct BudgetStatus {
    pub service: ExternalService,
    pub user_id: String,
    pub calls_used: u32,
    pub calls_limit: u32,
    pub cost_used: f64,
    pub cost_limit: f64,
    pub cost_per_call: f64,
    pub within_budget: bool,
}

impl BudgetStatus {
    pub fn new(
        service: ExternalService,
        user_id: impl Into<String>,
        calls_used: u32,
        cost_used: f64,
        limit: &crate::BudgetLimit,
    ) -> Self {
        let cost_ok = limit.daily_cost <= 0.0 || cost_used < limit.daily_cost;
        Self {
            service,
            user_id: user_id.into(),
            calls_used,
            calls_limit: limit.daily_calls,
            cost_used,
            cost_limit: limit.daily_cost,
            cost_per_call: limit.cost_per_call,
            within_budget: calls_used < limit.daily_calls && cost_ok,
        }
    }

    /// Calls still affordable today under both the call and cost caps.
    pub fn remaining_calls(&self) -> u32 {
        if !self.within_budget {
            return 0;
        }
        let by_calls = self.calls_limit.saturating_sub(self.calls_used);
        if self.cost_limit <= 0.0 || self.cost_per_call <= 0.0 {
            return by_calls;
        }
        let by_cost = ((self.cost_limit - self.cost_used) / self.cost_per_call).floor();
        let by_cost = if by_cost <= 0.0 {
            0
        } else if by_cost >= f64::from(u32::MAX) {
            u32::MAX
        } else {
            by_cost as u32
        };
        by_calls.min(by_cost)
    }
}

/// Aggregate usage of one service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ServiceUsage {
    pub service: ExternalService,
    pub calls: u64,
    pub cached_calls: u64,
    pub total_cost: f64,
    pub avg_latency_ms: f64,
}

/// Usage for a user over a trailing window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct UsageSummary {
    pub user_id: String,
    pub since: Timestamp,
    pub services: Vec<ServiceUsage>,
    pub total_calls: u64,
    pub total_cost: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BudgetLimit;
    use chrono::Utc;

    fn entry(category: DataCategory, now: Timestamp) -> CacheEntry {
        CacheEntry::new(
            CompanyIdentifier::from_assigned("chainlink"),
            category,
            "Chainlink",
            serde_json::json!({}),
            "tavily",
            0.5,
            TtlConfig::default().ttl_for(category),
            now,
        )
    }

    #[test]
    fn test_new_entry_bumps_category_timestamps() {
        let now = Utc::now();
        let s = entry(DataCategory::Static, now);
        assert_eq!(s.last_fetched_static, Some(now));
        assert_eq!(s.last_fetched_live, None);

        let m = entry(DataCategory::Mixed, now);
        assert_eq!(m.last_fetched_static, Some(now));
        assert_eq!(m.last_fetched_live, Some(now));
    }

    #[test]
    fn test_live_staleness_boundary() {
        let ttl = TtlConfig::default();
        let now = Utc::now();
        let e = entry(DataCategory::Live, now - chrono::Duration::minutes(16));
        assert!(!e.is_fresh(&ttl, now));
        let e = entry(DataCategory::Live, now - chrono::Duration::minutes(10));
        assert!(e.is_fresh(&ttl, now));
        let e = entry(DataCategory::Live, now - chrono::Duration::minutes(15));
        assert!(e.is_fresh(&ttl, now));
    }

    #[test]
    fn test_stored_expiry_is_not_authoritative() {
        let ttl = TtlConfig::default();
        let now = Utc::now();
        let mut e = entry(DataCategory::Live, now - chrono::Duration::hours(1));
        e.expires_at = now + chrono::Duration::days(365);
        assert!(!e.is_fresh(&ttl, now));
    }

    #[test]
    fn test_mixed_anchor_is_older_half() {
        let now = Utc::now();
        let mut e = entry(DataCategory::Mixed, now);
        let older = now - chrono::Duration::hours(7);
        e.last_fetched_live = Some(older);
        assert_eq!(e.freshness_anchor(), older);
        assert!(!e.is_fresh(&TtlConfig::default(), now));
    }

    #[test]
    fn test_lock_window() {
        let now = Utc::now();
        let mut e = entry(DataCategory::Static, now);
        assert!(!e.lock_held(now, Duration::from_secs(300)));
        e.parallel_fetch_lock = Some(now - chrono::Duration::minutes(4));
        assert!(e.lock_held(now, Duration::from_secs(300)));
        e.parallel_fetch_lock = Some(now - chrono::Duration::minutes(6));
        assert!(!e.lock_held(now, Duration::from_secs(300)));
    }

    #[test]
    fn test_usage_record_defaults_to_system_user() {
        let r = UsageRecord::new(None, ExternalService::Tavily, "search", 0.01, Utc::now());
        assert_eq!(r.user_id, SYSTEM_USER);
        let r = UsageRecord::new(Some("  "), ExternalService::Tavily, "search", 0.01, Utc::now());
        assert_eq!(r.user_id, SYSTEM_USER);
        let r = UsageRecord::new(Some("u1"), ExternalService::Tavily, "search", 0.01, Utc::now())
            .with_latency(Duration::from_millis(250));
        assert_eq!(r.user_id, "u1");
        assert_eq!(r.latency_ms, 250);
    }

    #[test]
    fn test_budget_status_limits() {
        let limit = BudgetLimit::new(100, 5.0, 0.01);
        let status = BudgetStatus::new(ExternalService::Tavily, "u", 99, 0.99, &limit);
        assert!(status.within_budget);
        assert_eq!(status.remaining_calls(), 1);

        let status = BudgetStatus::new(ExternalService::Tavily, "u", 100, 1.0, &limit);
        assert!(!status.within_budget);
        assert_eq!(status.remaining_calls(), 0);

        let status = BudgetStatus::new(ExternalService::Tavily, "u", 10, 5.0, &limit);
        assert!(!status.within_budget);
    }

    #[test]
    fn test_budget_remaining_bounded_by_cost() {
        let limit = BudgetLimit::new(1000, 1.0, 0.1);
        let status = BudgetStatus::new(ExternalService::Tavily, "u", 0, 0.55, &limit);
        assert_eq!(status.remaining_calls(), 4);
    }

    #[test]
    fn test_free_service_ignores_cost() {
        let limit = BudgetLimit::new(500, 0.0, 0.0);
        let status = BudgetStatus::new(ExternalService::OpenBb, "u", 3, 0.0, &limit);
        assert!(status.within_budget);
        assert_eq!(status.remaining_calls(), 497);
    }
}
