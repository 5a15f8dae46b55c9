//! Budget ledger: daily per-user, per-service call and cost accounting.
//!
//! Budget status is never stored. It is recomputed on every check from the
//! append-only usage log, summed over the current UTC calendar day.
//!
//! The check is approximate (read-committed): two concurrent requests can
//! both pass it and jointly overshoot the limit by a call or two. There is
//! no global lock around paid calls.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use vantage_core::{
    BudgetLimit, BudgetStatus, ExternalService, LogError, ServiceUsage, StorageError, Timestamp,
    UsageRecord, UsageSummary, VantageConfig, SYSTEM_USER,
};

/// Append-only usage record storage.
#[async_trait]
pub trait UsageLedger: Send + Sync {
    /// Append one record. Failures are returned for the caller to log.
    async fn append(&self, record: &UsageRecord) -> Result<(), LogError>;

    /// Records for `user_id` created at or after `since`.
    async fn records_since(
        &self,
        user_id: &str,
        since: Timestamp,
    ) -> Result<Vec<UsageRecord>, StorageError>;

    /// Delete every record created before `cutoff`. Returns the number removed.
    async fn prune_records_before(&self, cutoff: Timestamp) -> Result<u64, StorageError>;
}

/// Start of the UTC calendar day containing `now`.
pub fn utc_day_start(now: Timestamp) -> Timestamp {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn user_or_system(user_id: Option<&str>) -> &str {
    user_id.filter(|u| !u.trim().is_empty()).unwrap_or(SYSTEM_USER)
}

/// Budget checks and usage logging over a [`UsageLedger`].
#[derive(Clone)]
pub struct BudgetLedger {
    ledger: Arc<dyn UsageLedger>,
    limits: BTreeMap<ExternalService, BudgetLimit>,
}

impl BudgetLedger {
    pub fn new(ledger: Arc<dyn UsageLedger>, config: &VantageConfig) -> Self {
        let limits = ExternalService::ALL
            .iter()
            .map(|service| (*service, config.budget_for(*service)))
            .collect();
        Self { ledger, limits }
    }

    pub fn limit_for(&self, service: ExternalService) -> BudgetLimit {
        self.limits
            .get(&service)
            .copied()
            .unwrap_or_else(|| BudgetLimit::default_for(service))
    }

    /// Estimated cost of one call to `service`.
    pub fn cost_per_call(&self, service: ExternalService) -> f64 {
        self.limit_for(service).cost_per_call
    }

    /// Budget position of (user, service) for the current UTC day.
    ///
    /// Records served from cache do not count toward the limits.
    pub async fn check_budget(
        &self,
        user_id: Option<&str>,
        service: ExternalService,
    ) -> Result<BudgetStatus, StorageError> {
        self.check_budget_at(user_id, service, Utc::now()).await
    }

    pub async fn check_budget_at(
        &self,
        user_id: Option<&str>,
        service: ExternalService,
        now: Timestamp,
    ) -> Result<BudgetStatus, StorageError> {
        let user = user_or_system(user_id);
        let records = self.ledger.records_since(user, utc_day_start(now)).await?;

        let (calls_used, cost_used) = records
            .iter()
            .filter(|r| r.service == service && !r.was_cached && r.created_at <= now)
            .fold((0u32, 0.0f64), |(calls, cost), r| {
                (calls.saturating_add(1), cost + r.cost_estimate)
            });

        let status = BudgetStatus::new(service, user, calls_used, cost_used, &self.limit_for(service));
        tracing::debug!(
            user_id = %user,
            service = %service,
            calls_used = status.calls_used,
            calls_limit = status.calls_limit,
            cost_used = status.cost_used,
            within_budget = status.within_budget,
            "Budget checked"
        );
        Ok(status)
    }

    /// Append one usage record.
    ///
    /// The result is for the caller to inspect and log; it must never abort
    /// the caller's primary operation.
    pub async fn log_usage(&self, record: UsageRecord) -> Result<(), LogError> {
        self.ledger.append(&record).await
    }

    /// Append one usage record, logging and discarding any failure.
    pub async fn log_usage_quietly(&self, record: UsageRecord) {
        let service = record.service;
        let endpoint = record.endpoint.clone();
        if let Err(e) = self.log_usage(record).await {
            tracing::warn!(
                service = %service,
                endpoint = %endpoint,
                error = %e,
                "Failed to log API usage"
            );
        }
    }

    /// Delete usage records created before `cutoff`, for every user.
    pub async fn prune_usage(&self, cutoff: Timestamp) -> Result<u64, StorageError> {
        let removed = self.ledger.prune_records_before(cutoff).await?;
        if removed > 0 {
            tracing::info!(removed, cutoff = %cutoff, "Usage records pruned");
        }
        Ok(removed)
    }

    /// Per-service usage for `user_id` over the trailing `days` days.
    pub async fn usage_summary(
        &self,
        user_id: Option<&str>,
        days: u32,
    ) -> Result<UsageSummary, StorageError> {
        let user = user_or_system(user_id);
        let since = Utc::now() - chrono::Duration::days(i64::from(days));
        let records = self.ledger.records_since(user, since).await?;

        let mut per_service: BTreeMap<ExternalService, (u64, u64, f64, u64)> = BTreeMap::new();
        for record in &records {
            let slot = per_service.entry(record.service).or_default();
            slot.0 += 1;
            if record.was_cached {
                slot.1 += 1;
            }
            slot.2 += record.cost_estimate;
            slot.3 += record.latency_ms;
        }

        let services: Vec<ServiceUsage> = per_service
            .into_iter()
            .map(|(service, (calls, cached_calls, total_cost, latency_total))| ServiceUsage {
                service,
                calls,
                cached_calls,
                total_cost,
                avg_latency_ms: if calls == 0 {
                    0.0
                } else {
                    latency_total as f64 / calls as f64
                },
            })
            .collect();

        Ok(UsageSummary {
            user_id: user.to_string(),
            since,
            total_calls: services.iter().map(|s| s.calls).sum(),
            total_cost: services.iter().map(|s| s.total_cost).sum(),
            services,
        })
    }
}
