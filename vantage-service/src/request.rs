//! Cost-Optimized Request Service
//!
//! Single-section requests and batches. Every item walks the same ladder:
//! fresh cache, budget check, one provider call, stale cache, error.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use vantage_core::constants::{
    CACHE_EXPIRED_CONFIDENCE_FACTOR, CACHE_FALLBACK_CONFIDENCE_FACTOR, MARKET_QUOTE_CONFIDENCE,
    PARTIAL_QUOTE_CONFIDENCE,
};
use vantage_core::{
    BudgetError, BudgetStatus, CompanyData, CompanyIdentifier, CompanyRef, CompanyType,
    DataCategory, DataSource, DataType, ExternalService, FundingData, PriceData, ProfileData,
    ProviderError, Timestamp, UsageRecord, UsageSummary, ValidationError, VantageConfig,
    VantageResult,
};
use vantage_providers::ProviderRegistry;
use vantage_storage::{
    BudgetLedger, CacheAnalytics, CacheBackend, CacheEventLog, CacheStore, SweepReport,
    UsageLedger,
};

use crate::cache_io::{read_cached, write_through, CachedCompany};

/// One section served by the request service.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheResponse<T> {
    pub identifier: CompanyIdentifier,
    pub data: T,
    pub source: DataSource,
    pub cached: bool,
    /// Estimated USD spent producing this response
    pub cost: f64,
    /// Time until the underlying row goes stale; zero once stale
    #[serde(serialize_with = "duration_secs")]
    pub expires_in: Duration,
    pub confidence_score: f64,
}

fn duration_secs<S: serde::Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_secs())
}

/// One (company, data type) result of a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub company: String,
    pub identifier: CompanyIdentifier,
    pub data_type: DataType,
    pub source: DataSource,
    pub data: CompanyData,
    pub confidence_score: f64,
}

/// Tallies for one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total_requested: usize,
    pub cache_hits: usize,
    /// Provider calls attempted
    pub api_calls: usize,
    /// Items past the call cap; served stale or omitted
    pub budget_limited: usize,
    /// Attempted calls that produced nothing
    pub failed: usize,
    /// Items answered with stale data
    pub stale_served: usize,
    pub cache_hit_rate: f64,
    pub total_cost: f64,
    pub processing_time_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItem>,
    pub summary: BatchSummary,
}

/// How one kind of section is read from and written to a [`CompanyData`].
struct SectionRoute<T> {
    data_type: DataType,
    service: ExternalService,
    endpoint: &'static str,
    extract: fn(&CompanyData) -> Option<T>,
    insert: fn(&mut CompanyData, T),
    confidence: fn(&T) -> f64,
}

fn profile_route() -> SectionRoute<ProfileData> {
    SectionRoute {
        data_type: DataType::Profile,
        service: ExternalService::Tavily,
        endpoint: "search/profile",
        extract: |data| data.profile.clone(),
        insert: |data, profile| data.profile = Some(profile),
        confidence: |profile| profile.confidence_score,
    }
}

fn funding_route() -> SectionRoute<FundingData> {
    SectionRoute {
        data_type: DataType::Funding,
        service: ExternalService::Tavily,
        endpoint: "search/funding",
        extract: |data| data.funding.clone(),
        insert: |data, funding| data.funding = Some(funding),
        confidence: |funding| funding.confidence_score,
    }
}

fn price_route(service: ExternalService) -> SectionRoute<PriceData> {
    SectionRoute {
        data_type: DataType::Price,
        service,
        endpoint: match service {
            ExternalService::CoinGecko => "coins/markets",
            _ => "equity/price/quote",
        },
        extract: |data| data.price.clone(),
        insert: |data, price| data.price = Some(price),
        confidence: quote_confidence,
    }
}

fn quote_confidence(quote: &PriceData) -> f64 {
    if quote.has_quote() {
        MARKET_QUOTE_CONFIDENCE
    } else {
        PARTIAL_QUOTE_CONFIDENCE
    }
}

/// Cost-minimizing single-item and batch access.
#[derive(Clone)]
pub struct CostOptimizedDataService {
    cache: CacheStore,
    budget: BudgetLedger,
    providers: ProviderRegistry,
    config: Arc<VantageConfig>,
}

impl CostOptimizedDataService {
    pub fn new(
        cache: CacheStore,
        budget: BudgetLedger,
        providers: ProviderRegistry,
        config: VantageConfig,
    ) -> Self {
        Self {
            cache,
            budget,
            providers,
            config: Arc::new(config),
        }
    }

    pub fn from_store<S>(store: Arc<S>, providers: ProviderRegistry, config: VantageConfig) -> Self
    where
        S: CacheBackend + CacheEventLog + UsageLedger + 'static,
    {
        let cache = CacheStore::new(store.clone(), config.ttl).with_event_log(store.clone());
        let budget = BudgetLedger::new(store, &config);
        Self::new(cache, budget, providers, config)
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn budget(&self) -> &BudgetLedger {
        &self.budget
    }

    pub fn config(&self) -> &VantageConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Single items
    // ------------------------------------------------------------------------

    pub async fn get_company_profile(
        &self,
        company: &CompanyRef,
        user_id: Option<&str>,
        force_refresh: bool,
    ) -> VantageResult<CacheResponse<ProfileData>> {
        let providers = self.providers.clone();
        let name = company.name.clone();
        let website = company.website.clone();
        self.serve_section(company, profile_route(), user_id, force_refresh, || async move {
            providers
                .research()?
                .fetch_profile(&name, website.as_deref())
                .await
        })
        .await
    }

    pub async fn get_company_funding(
        &self,
        company: &CompanyRef,
        user_id: Option<&str>,
        force_refresh: bool,
    ) -> VantageResult<CacheResponse<FundingData>> {
        let providers = self.providers.clone();
        let name = company.name.clone();
        let website = company.website.clone();
        self.serve_section(company, funding_route(), user_id, force_refresh, || async move {
            providers
                .research()?
                .fetch_funding(&name, website.as_deref())
                .await
        })
        .await
    }

    /// Latest quote: CoinGecko for crypto companies, OpenBB for public ones.
    ///
    /// Private companies have no market data. Public companies need a ticker,
    /// either set on the reference or known to the lookup table.
    pub async fn get_real_time_price(
        &self,
        company: &CompanyRef,
        user_id: Option<&str>,
        force_refresh: bool,
    ) -> VantageResult<CacheResponse<PriceData>> {
        let providers = self.providers.clone();
        match company.company_type {
            CompanyType::Private => Err(ValidationError::UnsupportedDataType {
                data_type: DataType::Price.to_string(),
                operation: "real-time price for a private company".to_string(),
            }
            .into()),
            CompanyType::Crypto => {
                let name = company.name.clone();
                let website = company.website.clone();
                let route = price_route(ExternalService::CoinGecko);
                self.serve_section(company, route, user_id, force_refresh, || async move {
                    let provider = providers.crypto()?;
                    provider
                        .lookup_token(&name, website.as_deref())
                        .await?
                        .ok_or_else(|| ProviderError::NotFound {
                            service: provider.service(),
                            subject: name.clone(),
                        })
                })
                .await
            }
            CompanyType::Public => {
                let ticker = company.resolved_ticker().ok_or_else(|| {
                    ValidationError::InvalidValue {
                        field: "ticker".to_string(),
                        reason: format!("no ticker known for '{}'", company.name),
                    }
                })?;
                let route = price_route(ExternalService::OpenBb);
                self.serve_section(company, route, user_id, force_refresh, || async move {
                    providers.equity()?.get_price(&ticker).await
                })
                .await
            }
        }
    }

    async fn serve_section<T, F, Fut>(
        &self,
        company: &CompanyRef,
        route: SectionRoute<T>,
        user_id: Option<&str>,
        force_refresh: bool,
        call: F,
    ) -> VantageResult<CacheResponse<T>>
    where
        T: Clone,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let identifier = company.checked_identifier()?;
        let category = route.data_type.category();

        if !force_refresh {
            if let Some((cached, section)) = self.cached_section(&identifier, &route, false).await {
                let record = UsageRecord::new(user_id, route.service, route.endpoint, 0.0, Utc::now())
                    .cached(true);
                self.budget.log_usage_quietly(record).await;
                let confidence = (route.confidence)(&section);
                return Ok(respond(
                    identifier,
                    section,
                    route.data_type,
                    DataSource::Cache,
                    &cached,
                    confidence,
                ));
            }
        }

        match self.budget.check_budget(user_id, route.service).await {
            Ok(status) if !status.within_budget => {
                return match self.cached_section(&identifier, &route, true).await {
                    Some((cached, section)) => {
                        tracing::info!(
                            identifier = %identifier,
                            service = %route.service,
                            "Over budget, serving stale data"
                        );
                        let confidence =
                            (route.confidence)(&section) * CACHE_EXPIRED_CONFIDENCE_FACTOR;
                        Ok(respond(
                            identifier,
                            section,
                            route.data_type,
                            DataSource::CacheExpired,
                            &cached,
                            confidence,
                        ))
                    }
                    None => Err(exceeded(status).into()),
                };
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(
                service = %route.service,
                error = %e,
                "Budget check failed, proceeding"
            ),
        }

        let limit = self.config.timeouts.for_service(route.service);
        let cost = self.budget.cost_per_call(route.service);
        let started = Instant::now();
        let result = match tokio::time::timeout(limit, call()).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                service: route.service,
                timeout: limit,
            }),
        };
        let record = UsageRecord::new(user_id, route.service, route.endpoint, cost, Utc::now())
            .with_latency(started.elapsed())
            .with_params(serde_json::json!({
                "company": company.name,
                "data_type": route.data_type,
                "succeeded": result.is_ok(),
            }));
        self.budget.log_usage_quietly(record).await;

        match result {
            Ok(section) => {
                let confidence = (route.confidence)(&section);
                let data = section_payload(company, &identifier, &route, section.clone(), confidence, Utc::now());
                write_through(&self.cache, company, &identifier, category, data, route.service.as_str())
                    .await;
                Ok(CacheResponse {
                    identifier,
                    data: section,
                    source: DataSource::Api,
                    cached: false,
                    cost,
                    expires_in: self.cache.ttl_for(category),
                    confidence_score: confidence,
                })
            }
            Err(error) => {
                tracing::warn!(
                    identifier = %identifier,
                    service = %route.service,
                    error = %error,
                    "Provider call failed"
                );
                match self.cached_section(&identifier, &route, true).await {
                    Some((cached, section)) => {
                        let confidence =
                            (route.confidence)(&section) * CACHE_FALLBACK_CONFIDENCE_FACTOR;
                        Ok(respond(
                            identifier,
                            section,
                            route.data_type,
                            DataSource::CacheFallback,
                            &cached,
                            confidence,
                        ))
                    }
                    None => Err(error.into()),
                }
            }
        }
    }

    async fn cached_section<T>(
        &self,
        identifier: &CompanyIdentifier,
        route: &SectionRoute<T>,
        include_expired: bool,
    ) -> Option<(CachedCompany, T)> {
        let cached = read_cached(&self.cache, identifier, route.data_type.category(), include_expired)
            .await?;
        if !include_expired && !cached.has_fresh(route.data_type) {
            return None;
        }
        let section = (route.extract)(&cached.data)?;
        Some((cached, section))
    }

    // ------------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------------

    /// Research sections for many companies at bounded cost.
    ///
    /// Fresh rows are served first. Misses are ordered by data-type priority
    /// and fetched one at a time with a pause between calls, up to
    /// `min(pending, remaining budget, cap)` calls. Misses past that point are
    /// answered from stale rows or left out.
    pub async fn get_batch_company_data(
        &self,
        companies: &[CompanyRef],
        user_id: Option<&str>,
        data_types: &[DataType],
    ) -> VantageResult<BatchResponse> {
        let started = Instant::now();
        if data_types.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "data_types".to_string(),
            }
            .into());
        }
        if let Some(unsupported) = data_types.iter().find(|t| !t.is_research() || **t == DataType::News) {
            return Err(ValidationError::UnsupportedDataType {
                data_type: unsupported.to_string(),
                operation: "batch".to_string(),
            }
            .into());
        }

        let mut summary = BatchSummary::default();
        let mut results = Vec::new();
        let mut pending = Vec::new();

        for company in companies {
            let identifier = company.checked_identifier()?;
            for data_type in data_types {
                summary.total_requested += 1;
                match read_cached(&self.cache, &identifier, data_type.category(), false).await {
                    Some(cached) if cached.has_fresh(*data_type) => {
                        summary.cache_hits += 1;
                        let confidence = cached.entry.confidence_score;
                        results.push(batch_item(company, &identifier, *data_type, DataSource::Cache, cached.data, confidence));
                    }
                    _ => pending.push((company, identifier.clone(), *data_type)),
                }
            }
        }

        let batch = &self.config.batch;
        pending.sort_by_key(|(_, _, data_type)| batch.rank(*data_type));

        let remaining = match self.budget.check_budget(user_id, ExternalService::Tavily).await {
            Ok(status) => status.remaining_calls() as usize,
            Err(e) => {
                tracing::warn!(error = %e, "Budget check failed, using batch cap");
                batch.max_api_calls
            }
        };
        let max_calls = pending.len().min(remaining).min(batch.max_api_calls);
        tracing::info!(
            requested = summary.total_requested,
            cache_hits = summary.cache_hits,
            pending = pending.len(),
            max_calls,
            "Batch planned"
        );

        let mut pending = pending.into_iter();
        for (index, (company, identifier, data_type)) in pending.by_ref().take(max_calls).enumerate() {
            if index > 0 && !batch.call_pause.is_zero() {
                tokio::time::sleep(batch.call_pause).await;
            }
            summary.api_calls += 1;
            summary.total_cost += self.budget.cost_per_call(ExternalService::Tavily);

            match self.fetch_research(company, &identifier, data_type, user_id).await {
                Ok(data) => {
                    let confidence = data.confidence_score;
                    results.push(batch_item(company, &identifier, data_type, DataSource::Api, data, confidence));
                }
                Err(error) => {
                    summary.failed += 1;
                    tracing::warn!(
                        identifier = %identifier,
                        data_type = %data_type,
                        error = %error,
                        "Batch call failed"
                    );
                    if let Some(item) = self
                        .stale_item(company, &identifier, data_type, DataSource::CacheFallback)
                        .await
                    {
                        summary.stale_served += 1;
                        results.push(item);
                    }
                }
            }
        }

        for (company, identifier, data_type) in pending {
            summary.budget_limited += 1;
            if let Some(item) = self
                .stale_item(company, &identifier, data_type, DataSource::CacheExpired)
                .await
            {
                summary.stale_served += 1;
                results.push(item);
            }
        }

        let answered = summary.cache_hits + summary.api_calls;
        summary.cache_hit_rate = if answered == 0 {
            0.0
        } else {
            summary.cache_hits as f64 / answered as f64
        };
        summary.processing_time_seconds = started.elapsed().as_secs_f64();
        tracing::info!(
            cache_hits = summary.cache_hits,
            api_calls = summary.api_calls,
            budget_limited = summary.budget_limited,
            failed = summary.failed,
            total_cost = summary.total_cost,
            "Batch complete"
        );
        Ok(BatchResponse { results, summary })
    }

    async fn fetch_research(
        &self,
        company: &CompanyRef,
        identifier: &CompanyIdentifier,
        data_type: DataType,
        user_id: Option<&str>,
    ) -> Result<CompanyData, ProviderError> {
        let service = ExternalService::Tavily;
        let limit = self.config.timeouts.for_service(service);
        let started = Instant::now();
        let website = company.website.as_deref();
        let now = Utc::now();
        let mut data = CompanyData::new(identifier.clone(), &company.name, company.company_type);

        let fetched = async {
            let research = self.providers.research()?;
            match data_type {
                DataType::Profile => {
                    let profile = research.fetch_profile(&company.name, website).await?;
                    data.confidence_score = profile.confidence_score;
                    data.profile = Some(profile);
                }
                DataType::Funding => {
                    let funding = research.fetch_funding(&company.name, website).await?;
                    data.confidence_score = funding.confidence_score;
                    data.funding = Some(funding);
                }
                _ => {
                    let team = research.fetch_team(&company.name).await?;
                    data.confidence_score = team.confidence_score;
                    data.team = Some(team);
                }
            }
            Ok::<_, ProviderError>(())
        };
        let result = match tokio::time::timeout(limit, fetched).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout {
                service,
                timeout: limit,
            }),
        };

        let record = UsageRecord::new(
            user_id,
            service,
            format!("search/{}", data_type),
            self.budget.cost_per_call(service),
            Utc::now(),
        )
        .with_latency(started.elapsed())
        .with_params(serde_json::json!({
            "company": company.name,
            "batch": true,
            "succeeded": result.is_ok(),
        }));
        self.budget.log_usage_quietly(record).await;
        result?;

        data.sources.insert(service);
        data.mark_fetched(data_type, now);
        write_through(
            &self.cache,
            company,
            identifier,
            data_type.category(),
            data.clone(),
            service.as_str(),
        )
        .await;
        Ok(data)
    }

    async fn stale_item(
        &self,
        company: &CompanyRef,
        identifier: &CompanyIdentifier,
        data_type: DataType,
        source: DataSource,
    ) -> Option<BatchItem> {
        let cached = read_cached(&self.cache, identifier, data_type.category(), true).await?;
        if !cached.data.has(data_type) {
            return None;
        }
        let factor = match source {
            DataSource::CacheExpired => CACHE_EXPIRED_CONFIDENCE_FACTOR,
            _ => CACHE_FALLBACK_CONFIDENCE_FACTOR,
        };
        let confidence = cached.entry.confidence_score * factor;
        Some(batch_item(company, identifier, data_type, source, cached.data, confidence))
    }

    // ------------------------------------------------------------------------
    // Budget and cache management
    // ------------------------------------------------------------------------

    pub async fn check_api_budget(
        &self,
        user_id: Option<&str>,
        service: ExternalService,
    ) -> VantageResult<BudgetStatus> {
        Ok(self.budget.check_budget(user_id, service).await?)
    }

    /// Per-service usage over the trailing `days` days.
    pub async fn usage_summary(&self, user_id: Option<&str>, days: u32) -> VantageResult<UsageSummary> {
        Ok(self.budget.usage_summary(user_id, days).await?)
    }

    /// Delete a company's rows.
    ///
    /// With data types, only the rows that could hold them go: each type's own
    /// category plus `mixed`. Without, every row for the company goes.
    pub async fn invalidate_company_cache(
        &self,
        identifier: &CompanyIdentifier,
        data_types: Option<&[DataType]>,
    ) -> VantageResult<u64> {
        let categories: Vec<DataCategory> = match data_types {
            Some(types) if !types.is_empty() => {
                let mut categories: Vec<DataCategory> = types
                    .iter()
                    .map(DataType::category)
                    .chain(std::iter::once(DataCategory::Mixed))
                    .collect();
                categories.sort();
                categories.dedup();
                categories
            }
            _ => Vec::new(),
        };
        let removed = self
            .cache
            .invalidate(identifier, Some(categories.as_slice()))
            .await?;
        Ok(removed)
    }

    /// Remove rows past their TTL plus the retention grace period.
    pub async fn cleanup_expired_cache(&self) -> VantageResult<SweepReport> {
        let report = self.cache.sweep(self.config.retention.grace()).await?;
        tracing::info!(
            scanned = report.scanned,
            removed = report.removed,
            "Expired cache cleanup complete"
        );
        Ok(report)
    }

    pub async fn cache_analytics(&self, since: Timestamp) -> VantageResult<CacheAnalytics> {
        Ok(self.cache.analytics(since).await?)
    }
}

impl std::fmt::Debug for CostOptimizedDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostOptimizedDataService")
            .field("providers", &self.providers)
            .finish()
    }
}

fn exceeded(status: BudgetStatus) -> BudgetError {
    BudgetError::Exceeded {
        service: status.service,
        user_id: status.user_id,
        calls_used: status.calls_used,
        calls_limit: status.calls_limit,
        cost_used: status.cost_used,
        cost_limit: status.cost_limit,
    }
}

fn respond<T>(
    identifier: CompanyIdentifier,
    data: T,
    data_type: DataType,
    source: DataSource,
    cached: &CachedCompany,
    confidence: f64,
) -> CacheResponse<T> {
    CacheResponse {
        identifier,
        data,
        source,
        cached: true,
        cost: 0.0,
        expires_in: cached.expires_in_for(data_type),
        confidence_score: confidence.clamp(0.0, 1.0),
    }
}

fn section_payload<T>(
    company: &CompanyRef,
    identifier: &CompanyIdentifier,
    route: &SectionRoute<T>,
    section: T,
    confidence: f64,
    now: Timestamp,
) -> CompanyData {
    let mut data = CompanyData::new(identifier.clone(), &company.name, company.company_type);
    (route.insert)(&mut data, section);
    data.mark_fetched(route.data_type, now);
    data.sources.insert(route.service);
    data.confidence_score = confidence;
    data
}

fn batch_item(
    company: &CompanyRef,
    identifier: &CompanyIdentifier,
    data_type: DataType,
    source: DataSource,
    data: CompanyData,
    confidence: f64,
) -> BatchItem {
    BatchItem {
        company: company.name.clone(),
        identifier: identifier.clone(),
        data_type,
        source,
        data,
        confidence_score: confidence.clamp(0.0, 1.0),
    }
}
