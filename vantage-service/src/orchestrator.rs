//! Fetch Orchestrator
//!
//! Produces merged company data for a set of requested data types while
//! keeping external calls to a minimum:
//!
//! 1. Fresh cache rows are served without any provider call.
//! 2. At most one fetch per company runs at a time in this process
//!    ([`CompanyLockRegistry`]); across processes the row's advisory
//!    `parallel_fetch_lock` marker is consulted as a hint only.
//! 3. All provider calls for one request run concurrently, each under its own
//!    timeout. A failed or timed-out call only removes its own section.
//! 4. Successful sections are merged in a fixed order, so completion order
//!    never changes the result, and written back to the cache.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures_util::future::{join_all, FutureExt};
use serde::{Serialize, Serializer};
use vantage_core::constants::{
    CACHE_EXPIRED_CONFIDENCE_FACTOR, CACHE_FALLBACK_CONFIDENCE_FACTOR, CONFIDENCE_PER_SOURCE,
};
use vantage_core::{
    CompanyData, CompanyIdentifier, CompanyRef, CompanyType, DataCategory, DataSource, DataType,
    ExternalService, FundingData, NewsData, PriceData, ProfileData, ProviderError, TeamData,
    Timestamp, UsageRecord, ValidationError, VantageConfig, VantageError, VantageResult,
};
use vantage_providers::ProviderRegistry;
use vantage_storage::{
    AdvisoryLock, BudgetLedger, CacheBackend, CacheEventLog, CacheStore, UsageLedger,
};

use crate::cache_io::{read_cached, write_through, CachedCompany};
use crate::lock::CompanyLockRegistry;

// ============================================================================
// CALLS
// ============================================================================

/// One kind of provider call the orchestrator can make.
///
/// The declaration order is the merge order: when several market-data calls
/// succeed, the earliest kind supplies the quote and later kinds only fill
/// its gaps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallKind {
    ResearchProfile,
    ResearchFunding,
    ResearchTeam,
    ResearchNews,
    /// Token lookup by project name
    CryptoToken,
    /// Secondary quote for a known token symbol
    CryptoQuote,
    EquityPrice,
    EquityFundamentals,
}

impl CallKind {
    /// Service billed for this call.
    pub fn service(&self) -> ExternalService {
        match self {
            CallKind::ResearchProfile
            | CallKind::ResearchFunding
            | CallKind::ResearchTeam
            | CallKind::ResearchNews => ExternalService::Tavily,
            CallKind::CryptoToken => ExternalService::CoinGecko,
            CallKind::CryptoQuote | CallKind::EquityPrice | CallKind::EquityFundamentals => {
                ExternalService::OpenBb
            }
        }
    }

    /// Endpoint name recorded in the usage log.
    pub fn endpoint(&self) -> &'static str {
        match self {
            CallKind::ResearchProfile => "search/profile",
            CallKind::ResearchFunding => "search/funding",
            CallKind::ResearchTeam => "search/team",
            CallKind::ResearchNews => "search/news",
            CallKind::CryptoToken => "coins/markets",
            CallKind::CryptoQuote => "crypto/price/quote",
            CallKind::EquityPrice => "equity/price/quote",
            CallKind::EquityFundamentals => "equity/fundamental/metrics",
        }
    }

    /// Section this call fills.
    pub fn data_type(&self) -> DataType {
        match self {
            CallKind::ResearchProfile => DataType::Profile,
            CallKind::ResearchFunding => DataType::Funding,
            CallKind::ResearchTeam => DataType::Team,
            CallKind::ResearchNews => DataType::News,
            CallKind::CryptoToken | CallKind::CryptoQuote | CallKind::EquityPrice => {
                DataType::Price
            }
            CallKind::EquityFundamentals => DataType::Metrics,
        }
    }
}

/// A call to make, with the name, symbol or ticker it is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedCall {
    pub kind: CallKind,
    pub subject: String,
}

impl PlannedCall {
    fn new(kind: CallKind, subject: impl Into<String>) -> Self {
        Self {
            kind,
            subject: subject.into(),
        }
    }
}

/// Why one planned call produced nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum CallFailure {
    Timeout {
        call: CallKind,
        service: ExternalService,
        #[serde(serialize_with = "duration_millis")]
        after: Duration,
    },
    Provider {
        call: CallKind,
        #[serde(serialize_with = "display_string")]
        error: ProviderError,
    },
    /// Skipped because the service's daily budget is spent
    OverBudget {
        call: CallKind,
        service: ExternalService,
    },
}

impl CallFailure {
    pub fn call(&self) -> CallKind {
        match self {
            CallFailure::Timeout { call, .. }
            | CallFailure::Provider { call, .. }
            | CallFailure::OverBudget { call, .. } => *call,
        }
    }
}

fn duration_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

fn display_string<S: Serializer>(error: &ProviderError, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

enum CallOutput {
    Profile(ProfileData),
    Funding(FundingData),
    Team(TeamData),
    News(NewsData),
    Price(PriceData),
}

struct CallOutcome {
    kind: CallKind,
    result: Result<CallOutput, CallFailure>,
}

// ============================================================================
// REQUEST AND RESPONSE
// ============================================================================

/// Per-request switches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// Skip the fresh-cache check and always call providers
    pub force_refresh: bool,
    /// Serve a stale row immediately and refresh it in the background
    pub use_background: bool,
    /// User billed for the calls; `system` when absent
    pub user_id: Option<String>,
}

impl FetchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn in_background(mut self, background: bool) -> Self {
        self.use_background = background;
        self
    }

    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }
}

/// How a [`FetchResult`] was produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchMetadata {
    pub source: DataSource,
    pub identifier: CompanyIdentifier,
    pub category: DataCategory,
    pub api_calls_made: usize,
    pub execution_time_seconds: f64,
    pub cached: bool,
    /// A refresh was spawned after serving stale data
    pub background_refresh: bool,
    pub failures: Vec<CallFailure>,
    /// Estimated USD spent on provider calls by this request
    pub cost: f64,
    pub confidence_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResult {
    pub data: CompanyData,
    pub metadata: FetchMetadata,
}

// ============================================================================
// SERVICE
// ============================================================================

/// The fetch orchestrator.
///
/// Cheap to clone; clones share the cache, ledger, providers and lock
/// registry.
#[derive(Clone)]
pub struct CompanyDataService {
    cache: CacheStore,
    budget: BudgetLedger,
    providers: ProviderRegistry,
    locks: CompanyLockRegistry,
    config: Arc<VantageConfig>,
}

impl CompanyDataService {
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
            locks: CompanyLockRegistry::new(),
            config: Arc::new(config),
        }
    }

    /// Build the cache store, event log and ledger over one backend.
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

    pub fn locks(&self) -> &CompanyLockRegistry {
        &self.locks
    }

    pub fn config(&self) -> &VantageConfig {
        &self.config
    }

    /// Fetch `data_types` for `company`, from cache when possible.
    ///
    /// Provider failures never fail the call while at least one section was
    /// fetched. When nothing could be fetched a stale row is served
    /// (`cache_fallback`); with no row at all the result is
    /// [`VantageError::NoDataAvailable`].
    pub async fn fetch_company_data_parallel(
        &self,
        company: &CompanyRef,
        data_types: &[DataType],
        options: FetchOptions,
    ) -> VantageResult<FetchResult> {
        let started = Instant::now();
        if data_types.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "data_types".to_string(),
            }
            .into());
        }
        let identifier = company.checked_identifier()?;
        let category = DataCategory::from_data_types(data_types);

        if options.use_background && !options.force_refresh {
            let plan = plan_calls(company, data_types, &self.providers);
            if let Some(cached) = read_cached(&self.cache, &identifier, category, true).await {
                if covers(&cached.data, &plan) {
                    if covers_fresh(&cached, &plan) {
                        return Ok(cached_result(cached, category, DataSource::Cache, started));
                    }
                    self.spawn_refresh(company.clone(), data_types.to_vec(), options.user_id);
                    let mut result =
                        cached_result(cached, category, DataSource::CacheExpired, started);
                    result.metadata.background_refresh = true;
                    return Ok(result);
                }
            }
        }

        self.fetch_locked(company, &identifier, category, data_types, &options, started)
            .await
    }

    fn spawn_refresh(&self, company: CompanyRef, data_types: Vec<DataType>, user_id: Option<String>) {
        let service = self.clone();
        tokio::spawn(async move {
            let identifier = company.identifier();
            let category = DataCategory::from_data_types(&data_types);
            let options = FetchOptions {
                force_refresh: false,
                use_background: false,
                user_id,
            };
            let outcome = service
                .fetch_locked(&company, &identifier, category, &data_types, &options, Instant::now())
                .await;
            match outcome {
                Ok(result) => tracing::debug!(
                    identifier = %identifier,
                    source = %result.metadata.source,
                    "Background refresh finished"
                ),
                Err(e) => tracing::warn!(
                    identifier = %identifier,
                    error = %e,
                    "Background refresh failed"
                ),
            }
        });
    }

    async fn fetch_locked(
        &self,
        company: &CompanyRef,
        identifier: &CompanyIdentifier,
        category: DataCategory,
        data_types: &[DataType],
        options: &FetchOptions,
        started: Instant,
    ) -> VantageResult<FetchResult> {
        let plan = plan_calls(company, data_types, &self.providers);
        let _guard = self.locks.lock(identifier).await;

        if !options.force_refresh {
            if let Some(hit) = self.fresh_hit(identifier, category, &plan).await {
                return Ok(cached_result(hit, category, DataSource::Cache, started));
            }
        }

        let lock_config = self.config.advisory_lock;
        let mut marker = None;
        match self
            .cache
            .try_mark_fetching(identifier, category, lock_config.window)
            .await
        {
            Ok(AdvisoryLock::Acquired) => {
                marker = Some(AdvisoryMarker::new(&self.cache, identifier, category))
            }
            Ok(AdvisoryLock::HeldElsewhere { since }) => {
                tracing::info!(
                    identifier = %identifier,
                    category = %category,
                    since = %since,
                    "Fetch may be running elsewhere, waiting once"
                );
                tokio::time::sleep(lock_config.wait).await;
                if !options.force_refresh {
                    if let Some(hit) = self.fresh_hit(identifier, category, &plan).await {
                        return Ok(cached_result(hit, category, DataSource::Cache, started));
                    }
                }
                tracing::debug!(identifier = %identifier, "Proceeding despite advisory lock");
            }
            Ok(AdvisoryLock::NoRow) => {}
            Err(e) => tracing::warn!(
                identifier = %identifier,
                error = %e,
                "Advisory lock unavailable, proceeding"
            ),
        }

        let result = self
            .fetch_from_providers(company, identifier, category, plan, options, started)
            .await;

        if let Some(marker) = marker {
            marker.release().await;
        }
        result
    }

    async fn fresh_hit(
        &self,
        identifier: &CompanyIdentifier,
        category: DataCategory,
        plan: &[PlannedCall],
    ) -> Option<CachedCompany> {
        read_cached(&self.cache, identifier, category, false)
            .await
            .filter(|cached| covers_fresh(cached, plan))
    }

    async fn fetch_from_providers(
        &self,
        company: &CompanyRef,
        identifier: &CompanyIdentifier,
        category: DataCategory,
        plan: Vec<PlannedCall>,
        options: &FetchOptions,
        started: Instant,
    ) -> VantageResult<FetchResult> {
        let user = options.user_id.as_deref();
        let planned = plan.len();
        let (runnable, mut failures) = self.apply_budgets(user, plan).await;
        let attempted = runnable.len();
        let cost: f64 = runnable
            .iter()
            .map(|call| self.budget.cost_per_call(call.kind.service()))
            .sum();

        let calls = runnable
            .into_iter()
            .map(|call| self.timed_call(call, company, user).boxed());
        let mut successes = Vec::new();
        for outcome in join_all(calls).await {
            match outcome.result {
                Ok(output) => successes.push((outcome.kind, output)),
                Err(failure) => failures.push(failure),
            }
        }
        failures.sort_by_key(CallFailure::call);

        if successes.is_empty() {
            tracing::warn!(
                identifier = %identifier,
                planned,
                attempted,
                "No provider call succeeded"
            );
            let Some(stale) = read_cached(&self.cache, identifier, category, true).await else {
                let reason = if planned == 0 {
                    "no configured provider serves the requested data types".to_string()
                } else {
                    format!("{} of {} planned provider calls failed", failures.len(), planned)
                };
                return Err(VantageError::NoDataAvailable {
                    identifier: identifier.to_string(),
                    reason,
                });
            };
            let mut result = cached_result(stale, category, DataSource::CacheFallback, started);
            result.metadata.api_calls_made = attempted;
            result.metadata.cost = cost;
            result.metadata.failures = failures;
            return Ok(result);
        }

        let merged = merge_outcomes(company, identifier, successes, Utc::now());
        let source = source_label(&merged.sources);
        write_through(&self.cache, company, identifier, category, merged.clone(), &source).await;

        let metadata = FetchMetadata {
            source: DataSource::ApiParallel,
            identifier: identifier.clone(),
            category,
            api_calls_made: attempted,
            execution_time_seconds: started.elapsed().as_secs_f64(),
            cached: false,
            background_refresh: false,
            failures,
            cost,
            confidence_score: merged.confidence_score,
        };
        tracing::info!(
            identifier = %identifier,
            category = %category,
            api_calls = metadata.api_calls_made,
            failed = metadata.failures.len(),
            confidence = metadata.confidence_score,
            elapsed_secs = metadata.execution_time_seconds,
            "Parallel fetch complete"
        );
        Ok(FetchResult {
            data: merged,
            metadata,
        })
    }

    /// Split the plan into calls within budget and calls skipped for budget.
    ///
    /// A budget check that cannot be completed lets the calls through.
    async fn apply_budgets(
        &self,
        user: Option<&str>,
        plan: Vec<PlannedCall>,
    ) -> (Vec<PlannedCall>, Vec<CallFailure>) {
        let services: BTreeSet<ExternalService> = plan.iter().map(|c| c.kind.service()).collect();
        let mut blocked = BTreeSet::new();
        for service in services {
            match self.budget.check_budget(user, service).await {
                Ok(status) if !status.within_budget => {
                    tracing::info!(
                        service = %service,
                        user_id = %status.user_id,
                        calls_used = status.calls_used,
                        calls_limit = status.calls_limit,
                        "Service over budget, skipping its calls"
                    );
                    blocked.insert(service);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(
                    service = %service,
                    error = %e,
                    "Budget check failed, proceeding"
                ),
            }
        }

        let mut runnable = Vec::with_capacity(plan.len());
        let mut skipped = Vec::new();
        for call in plan {
            let service = call.kind.service();
            if blocked.contains(&service) {
                skipped.push(CallFailure::OverBudget {
                    call: call.kind,
                    service,
                });
            } else {
                runnable.push(call);
            }
        }
        (runnable, skipped)
    }

    /// Run one call under its service's timeout and log the attempt.
    async fn timed_call(
        &self,
        call: PlannedCall,
        company: &CompanyRef,
        user: Option<&str>,
    ) -> CallOutcome {
        let service = call.kind.service();
        let limit = self.config.timeouts.for_service(service);
        let started = Instant::now();

        let result = match tokio::time::timeout(limit, self.run_call(&call, company)).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(error)) => {
                tracing::warn!(call = ?call.kind, subject = %call.subject, error = %error, "Provider call failed");
                Err(CallFailure::Provider {
                    call: call.kind,
                    error,
                })
            }
            Err(_) => {
                tracing::warn!(call = ?call.kind, subject = %call.subject, timeout_ms = limit.as_millis() as u64, "Provider call timed out");
                Err(CallFailure::Timeout {
                    call: call.kind,
                    service,
                    after: limit,
                })
            }
        };

        let record = UsageRecord::new(
            user,
            service,
            call.kind.endpoint(),
            self.budget.cost_per_call(service),
            Utc::now(),
        )
        .with_latency(started.elapsed())
        .with_params(serde_json::json!({
            "company": company.name,
            "subject": call.subject,
            "succeeded": result.is_ok(),
        }));
        self.budget.log_usage_quietly(record).await;

        CallOutcome {
            kind: call.kind,
            result,
        }
    }

    async fn run_call(
        &self,
        call: &PlannedCall,
        company: &CompanyRef,
    ) -> Result<CallOutput, ProviderError> {
        let website = company.website.as_deref();
        let subject = call.subject.as_str();
        match call.kind {
            CallKind::ResearchProfile => self
                .providers
                .research()?
                .fetch_profile(subject, website)
                .await
                .map(CallOutput::Profile),
            CallKind::ResearchFunding => self
                .providers
                .research()?
                .fetch_funding(subject, website)
                .await
                .map(CallOutput::Funding),
            CallKind::ResearchTeam => self
                .providers
                .research()?
                .fetch_team(subject)
                .await
                .map(CallOutput::Team),
            CallKind::ResearchNews => self
                .providers
                .research()?
                .fetch_news(subject)
                .await
                .map(CallOutput::News),
            CallKind::CryptoToken => {
                let provider = self.providers.crypto()?;
                match provider.lookup_token(subject, website).await? {
                    Some(quote) => Ok(CallOutput::Price(quote)),
                    None => Err(ProviderError::NotFound {
                        service: provider.service(),
                        subject: subject.to_string(),
                    }),
                }
            }
            CallKind::CryptoQuote | CallKind::EquityPrice => self
                .providers
                .equity()?
                .get_price(subject)
                .await
                .map(CallOutput::Price),
            CallKind::EquityFundamentals => self
                .providers
                .equity()?
                .get_fundamentals(subject)
                .await
                .map(CallOutput::Price),
        }
    }
}

impl std::fmt::Debug for CompanyDataService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompanyDataService")
            .field("providers", &self.providers)
            .field("locks", &self.locks.len())
            .finish()
    }
}

// ============================================================================
// ADVISORY MARKER
// ============================================================================

/// Ownership of a row's advisory `parallel_fetch_lock` marker.
///
/// [`release`](Self::release) clears it on the normal path. If the fetch
/// future is dropped first, `Drop` hands the clear to the runtime so other
/// processes stop waiting on a fetch that no longer exists.
struct AdvisoryMarker {
    cache: CacheStore,
    identifier: CompanyIdentifier,
    category: DataCategory,
    armed: bool,
}

impl AdvisoryMarker {
    fn new(cache: &CacheStore, identifier: &CompanyIdentifier, category: DataCategory) -> Self {
        Self {
            cache: cache.clone(),
            identifier: identifier.clone(),
            category,
            armed: true,
        }
    }

    async fn release(mut self) {
        clear_marker(&self.cache, &self.identifier, self.category).await;
        self.armed = false;
    }
}

impl Drop for AdvisoryMarker {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let cache = self.cache.clone();
        let identifier = self.identifier.clone();
        let category = self.category;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { clear_marker(&cache, &identifier, category).await });
            }
            Err(_) => tracing::warn!(
                identifier = %identifier,
                "No runtime to clear advisory lock, it expires with the window"
            ),
        }
    }
}

async fn clear_marker(cache: &CacheStore, identifier: &CompanyIdentifier, category: DataCategory) {
    if let Err(e) = cache.clear_fetch_lock(identifier, category).await {
        tracing::warn!(identifier = %identifier, error = %e, "Failed to clear advisory lock");
    }
}

// ============================================================================
// PLANNING AND MERGING
// ============================================================================

/// Calls needed for `data_types`, given the company type and the providers
/// that are configured.
///
/// Research sections map one-to-one onto research calls. Market data goes to
/// the crypto provider (plus an equity-style quote when the token symbol is
/// known) for crypto companies, and to the equity provider for public
/// companies with a resolvable ticker. Nothing else is planned.
pub fn plan_calls(
    company: &CompanyRef,
    data_types: &[DataType],
    providers: &ProviderRegistry,
) -> Vec<PlannedCall> {
    let requested: BTreeSet<DataType> = data_types.iter().copied().collect();
    let mut plan = Vec::new();

    if providers.has_research() {
        for data_type in &requested {
            let kind = match data_type {
                DataType::Profile => CallKind::ResearchProfile,
                DataType::Funding => CallKind::ResearchFunding,
                DataType::Team => CallKind::ResearchTeam,
                DataType::News => CallKind::ResearchNews,
                DataType::Price | DataType::Metrics => continue,
            };
            plan.push(PlannedCall::new(kind, &company.name));
        }
    }

    if requested.iter().any(DataType::is_market) {
        match company.company_type {
            CompanyType::Crypto => {
                if providers.has_crypto() {
                    plan.push(PlannedCall::new(CallKind::CryptoToken, &company.name));
                }
                let symbol = company
                    .token_symbol
                    .as_deref()
                    .map(|s| s.trim().to_uppercase())
                    .filter(|s| !s.is_empty());
                if let (Some(symbol), true) = (symbol, providers.has_equity()) {
                    plan.push(PlannedCall::new(
                        CallKind::CryptoQuote,
                        format!("{}-USD", symbol),
                    ));
                }
            }
            CompanyType::Public => {
                if let (Some(ticker), true) = (company.resolved_ticker(), providers.has_equity()) {
                    plan.push(PlannedCall::new(CallKind::EquityPrice, ticker.clone()));
                    plan.push(PlannedCall::new(CallKind::EquityFundamentals, ticker));
                }
            }
            CompanyType::Private => {}
        }
    }
    plan
}

/// Whether `data` holds every section the plan would fetch.
fn covers(data: &CompanyData, plan: &[PlannedCall]) -> bool {
    plan.iter().all(|call| data.has(call.kind.data_type()))
}

/// Whether every planned section is present and still within its TTL.
fn covers_fresh(cached: &CachedCompany, plan: &[PlannedCall]) -> bool {
    plan.iter().all(|call| cached.has_fresh(call.kind.data_type()))
}

/// Merge successful call outputs into one payload.
///
/// Outputs are applied in [`CallKind`] order, so the same set of successes
/// always yields the same payload.
fn merge_outcomes(
    company: &CompanyRef,
    identifier: &CompanyIdentifier,
    successes: Vec<(CallKind, CallOutput)>,
    now: Timestamp,
) -> CompanyData {
    let ordered: BTreeMap<CallKind, CallOutput> = successes.into_iter().collect();
    let mut data = CompanyData::new(identifier.clone(), &company.name, company.company_type);
    let count = ordered.len();

    for (kind, output) in ordered {
        data.sources.insert(kind.service());
        match output {
            CallOutput::Profile(profile) => data.profile = Some(profile),
            CallOutput::Funding(funding) => data.funding = Some(funding),
            CallOutput::Team(team) => data.team = Some(team),
            CallOutput::News(news) => data.news = Some(news),
            CallOutput::Price(quote) => match data.price.as_mut() {
                Some(primary) => primary.fill_gaps(&quote),
                None => data.price = Some(quote),
            },
        }
        data.mark_fetched(kind.data_type(), now);
    }

    data.confidence_score = (CONFIDENCE_PER_SOURCE * count as f64).min(1.0);
    data
}

/// `tavily+coingecko` style label for the services that contributed.
fn source_label(sources: &BTreeSet<ExternalService>) -> String {
    sources
        .iter()
        .map(ExternalService::as_str)
        .collect::<Vec<_>>()
        .join("+")
}

fn cached_result(
    cached: CachedCompany,
    category: DataCategory,
    source: DataSource,
    started: Instant,
) -> FetchResult {
    let factor = match source {
        DataSource::CacheExpired => CACHE_EXPIRED_CONFIDENCE_FACTOR,
        DataSource::CacheFallback => CACHE_FALLBACK_CONFIDENCE_FACTOR,
        _ => 1.0,
    };
    let metadata = FetchMetadata {
        source,
        identifier: cached.entry.identifier.clone(),
        category,
        api_calls_made: 0,
        execution_time_seconds: started.elapsed().as_secs_f64(),
        cached: true,
        background_refresh: false,
        failures: Vec::new(),
        cost: 0.0,
        confidence_score: (cached.entry.confidence_score * factor).clamp(0.0, 1.0),
    };
    tracing::debug!(
        identifier = %metadata.identifier,
        category = %category,
        source = %source,
        "Served from cache"
    );
    FetchResult {
        data: cached.data,
        metadata,
    }
}
