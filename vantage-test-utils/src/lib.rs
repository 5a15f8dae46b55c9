//! VANTAGE Test Utilities
//!
//! Centralized test infrastructure for the vantage workspace:
//! - Scriptable mock providers (call logs, artificial latency, injected failures)
//! - A fault-injecting storage backend
//! - Proptest generators for core types
//! - Test fixtures for common scenarios
//! - Custom assertions for vantage-specific results

// Re-export the in-memory store from its source crate
pub use vantage_storage::InMemoryStore;

// Re-export core types for convenience
pub use vantage_core::{
    AdvisoryLockConfig, BatchConfig, BudgetError, BudgetLimit, CacheEntry, CacheEvent,
    CompanyData, CompanyIdentifier, CompanyRef, CompanyType, DataCategory, DataSource, DataType,
    ExternalService, FundingData, LogError, NewsArticle, NewsData, PriceData, ProfileData,
    ProviderError, ProviderTimeouts, StorageError, TeamData, Timestamp, TtlConfig, UsageRecord,
    VantageConfig, VantageError, VantageResult,
};
pub use vantage_providers::{
    CompanyResearchProvider, CryptoMarketProvider, EquityMarketProvider, ProviderRegistry,
};

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use vantage_storage::{CacheBackend, CacheEventLog, CacheKey, CacheStats, EntryUpdate, UsageLedger};

// ============================================================================
// MOCK PROVIDERS
// ============================================================================

/// How a mock answers one kind of call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockBehavior {
    #[default]
    Succeed,
    /// Return a provider error immediately
    Fail,
    /// Never answer; only a caller-side timeout ends the call
    Hang,
}

/// Shared record of the calls a mock received, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    fn push(&self, call: String) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);
    }

    /// Every call as `"<operation>:<subject>"`.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Calls whose operation is `operation`.
    pub fn count_of(&self, operation: &str) -> usize {
        let prefix = format!("{}:", operation);
        self.calls()
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }
}

async fn behave(
    behavior: MockBehavior,
    delay: Duration,
    service: ExternalService,
) -> Result<(), ProviderError> {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    match behavior {
        MockBehavior::Succeed => Ok(()),
        MockBehavior::Fail => Err(ProviderError::RequestFailed {
            service,
            status: 503,
            message: "mock failure".to_string(),
        }),
        MockBehavior::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProviderError::Timeout {
                service,
                timeout: Duration::from_secs(3600),
            })
        }
    }
}

/// Mock company-research provider with per-section behaviour.
///
/// Cloning shares the call log, so a test can keep a handle after moving a
/// clone into a registry.
#[derive(Debug, Clone, Default)]
pub struct MockResearchProvider {
    behavior: BTreeMap<DataType, MockBehavior>,
    delay: Duration,
    log: CallLog,
}

impl MockResearchProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_behavior(mut self, data_type: DataType, behavior: MockBehavior) -> Self {
        self.behavior.insert(data_type, behavior);
        self
    }

    /// Every section fails.
    pub fn failing() -> Self {
        [DataType::Profile, DataType::Funding, DataType::Team, DataType::News]
            .into_iter()
            .fold(Self::new(), |mock, dt| mock.with_behavior(dt, MockBehavior::Fail))
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    pub fn call_count(&self) -> usize {
        self.log.count()
    }

    async fn answer(&self, data_type: DataType, subject: &str) -> Result<(), ProviderError> {
        self.log.push(format!("{}:{}", data_type, subject));
        let behavior = self.behavior.get(&data_type).copied().unwrap_or_default();
        behave(behavior, self.delay, ExternalService::Tavily).await
    }
}

#[async_trait]
impl CompanyResearchProvider for MockResearchProvider {
    async fn fetch_profile(
        &self,
        name: &str,
        _website: Option<&str>,
    ) -> Result<ProfileData, ProviderError> {
        self.answer(DataType::Profile, name).await?;
        Ok(fixtures::profile(name))
    }

    async fn fetch_funding(
        &self,
        name: &str,
        _website: Option<&str>,
    ) -> Result<FundingData, ProviderError> {
        self.answer(DataType::Funding, name).await?;
        Ok(fixtures::funding())
    }

    async fn fetch_team(&self, name: &str) -> Result<TeamData, ProviderError> {
        self.answer(DataType::Team, name).await?;
        Ok(fixtures::team())
    }

    async fn fetch_news(&self, name: &str) -> Result<NewsData, ProviderError> {
        self.answer(DataType::News, name).await?;
        Ok(fixtures::news(name))
    }
}

/// Mock crypto market provider.
#[derive(Debug, Clone, Default)]
pub struct MockCryptoProvider {
    behavior: MockBehavior,
    delay: Duration,
    no_match: bool,
    log: CallLog,
}

impl MockCryptoProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_behavior(mut self, behavior: MockBehavior) -> Self {
        self.behavior = behavior;
        self
    }

    /// Answer every lookup with "no such token".
    pub fn without_match(mut self) -> Self {
        self.no_match = true;
        self
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    pub fn call_count(&self) -> usize {
        self.log.count()
    }
}

#[async_trait]
impl CryptoMarketProvider for MockCryptoProvider {
    async fn lookup_token(
        &self,
        name: &str,
        _website: Option<&str>,
    ) -> Result<Option<PriceData>, ProviderError> {
        self.log.push(format!("lookup_token:{}", name));
        behave(self.behavior, self.delay, ExternalService::CoinGecko).await?;
        if self.no_match {
            return Ok(None);
        }
        Ok(Some(fixtures::token_quote(name)))
    }
}

/// Mock equity market provider with separate quote and fundamentals
/// behaviour.
#[derive(Debug, Clone, Default)]
pub struct MockEquityProvider {
    price_behavior: MockBehavior,
    fundamentals_behavior: MockBehavior,
    delay: Duration,
    log: CallLog,
}

impl MockEquityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_price_behavior(mut self, behavior: MockBehavior) -> Self {
        self.price_behavior = behavior;
        self
    }

    pub fn with_fundamentals_behavior(mut self, behavior: MockBehavior) -> Self {
        self.fundamentals_behavior = behavior;
        self
    }

    pub fn log(&self) -> &CallLog {
        &self.log
    }

    pub fn call_count(&self) -> usize {
        self.log.count()
    }
}

#[async_trait]
impl EquityMarketProvider for MockEquityProvider {
    async fn get_price(&self, ticker: &str) -> Result<PriceData, ProviderError> {
        self.log.push(format!("get_price:{}", ticker));
        behave(self.price_behavior, self.delay, ExternalService::OpenBb).await?;
        Ok(fixtures::equity_quote(ticker))
    }

    async fn get_fundamentals(&self, ticker: &str) -> Result<PriceData, ProviderError> {
        self.log.push(format!("get_fundamentals:{}", ticker));
        behave(self.fundamentals_behavior, self.delay, ExternalService::OpenBb).await?;
        Ok(fixtures::equity_fundamentals(ticker))
    }
}

// ============================================================================
// FAULTY STORAGE
// ============================================================================

/// In-memory store whose reads, writes and log appends can be switched to
/// fail, for exercising the "cache unavailable" and "logging failed" paths.
#[derive(Debug, Clone, Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    fail_logs: Arc<AtomicBool>,
}

impl FaultyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that fails every operation from the start.
    pub fn broken() -> Self {
        let store = Self::new();
        store.set_fail_reads(true);
        store.set_fail_writes(true);
        store.set_fail_logs(true);
        store
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_logs(&self, fail: bool) {
        self.fail_logs.store(fail, Ordering::SeqCst);
    }

    /// The healthy store underneath.
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    fn check_read(&self) -> Result<(), StorageError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "injected read fault".to_string(),
            });
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Unavailable {
                reason: "injected write fault".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for FaultyStore {
    async fn load(&self, key: &CacheKey) -> Result<Option<CacheEntry>, StorageError> {
        self.check_read()?;
        self.inner.load(key).await
    }

    async fn store(&self, entry: &CacheEntry) -> Result<(), StorageError> {
        self.check_write()?;
        self.inner.store(entry).await
    }

    async fn modify(
        &self,
        key: &CacheKey,
        update: EntryUpdate,
    ) -> Result<Option<CacheEntry>, StorageError> {
        self.check_write()?;
        self.inner.modify(key, update).await
    }

    async fn remove(&self, key: &CacheKey) -> Result<bool, StorageError> {
        self.check_write()?;
        self.inner.remove(key).await
    }

    async fn remove_company(
        &self,
        identifier: &CompanyIdentifier,
        categories: &[DataCategory],
    ) -> Result<u64, StorageError> {
        self.check_write()?;
        self.inner.remove_company(identifier, categories).await
    }

    async fn scan(&self) -> Result<Vec<CacheEntry>, StorageError> {
        self.check_read()?;
        self.inner.scan().await
    }

    async fn stats(&self) -> Result<CacheStats, StorageError> {
        self.check_read()?;
        self.inner.stats().await
    }
}

#[async_trait]
impl CacheEventLog for FaultyStore {
    async fn record(&self, event: &CacheEvent) -> Result<(), LogError> {
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(LogError::EventAppend {
                reason: "injected log fault".to_string(),
            });
        }
        self.inner.record(event).await
    }

    async fn events_since(&self, since: Timestamp) -> Result<Vec<CacheEvent>, StorageError> {
        self.check_read()?;
        self.inner.events_since(since).await
    }

    async fn prune_events_before(&self, cutoff: Timestamp) -> Result<u64, StorageError> {
        self.check_write()?;
        self.inner.prune_events_before(cutoff).await
    }
}

#[async_trait]
impl UsageLedger for FaultyStore {
    async fn append(&self, record: &UsageRecord) -> Result<(), LogError> {
        if self.fail_logs.load(Ordering::SeqCst) {
            return Err(LogError::UsageAppend {
                reason: "injected log fault".to_string(),
            });
        }
        self.inner.append(record).await
    }

    async fn records_since(
        &self,
        user_id: &str,
        since: Timestamp,
    ) -> Result<Vec<UsageRecord>, StorageError> {
        self.check_read()?;
        self.inner.records_since(user_id, since).await
    }

    async fn prune_records_before(&self, cutoff: Timestamp) -> Result<u64, StorageError> {
        self.check_write()?;
        self.inner.prune_records_before(cutoff).await
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating vantage types.

    use super::*;
    use proptest::prelude::*;

    /// Company names with mixed case, punctuation and corporate suffixes.
    pub fn arb_company_name() -> impl Strategy<Value = String> {
        (
            "[A-Z][a-z]{2,10}",
            prop::option::of("[A-Z][a-z]{2,8}"),
            prop::sample::select(vec!["", " Inc", " Inc.", " Labs", " Corp", ", LLC", " Technologies"]),
        )
            .prop_map(|(first, second, suffix)| match second {
                Some(second) => format!("{} {}{}", first, second, suffix),
                None => format!("{}{}", first, suffix),
            })
    }

    /// Bare domains such as `acme.io`.
    pub fn arb_domain() -> impl Strategy<Value = String> {
        (
            "[a-v][a-z0-9]{1,12}",
            prop::sample::select(vec!["com", "io", "xyz", "org", "network"]),
        )
            .prop_map(|(label, tld)| format!("{}.{}", label, tld))
    }

    /// Website strings for a domain, with assorted protocol, `www.`, casing
    /// and path decorations.
    pub fn arb_website_for(domain: String) -> impl Strategy<Value = String> {
        (
            prop::sample::select(vec!["", "http://", "https://"]),
            any::<bool>(),
            any::<bool>(),
            prop::sample::select(vec!["", "/", "/about", "/en/team?x=1"]),
        )
            .prop_map(move |(scheme, www, upper, path)| {
                let host = if upper {
                    domain.to_uppercase()
                } else {
                    domain.clone()
                };
                format!("{}{}{}{}", scheme, if www { "www." } else { "" }, host, path)
            })
    }

    pub fn arb_data_type() -> impl Strategy<Value = DataType> {
        prop::sample::select(DataType::ALL.to_vec())
    }

    /// Non-empty, duplicate-free data type sets.
    pub fn arb_data_types() -> impl Strategy<Value = Vec<DataType>> {
        prop::sample::subsequence(DataType::ALL.to_vec(), 1..=DataType::ALL.len())
    }

    pub fn arb_research_types() -> impl Strategy<Value = Vec<DataType>> {
        prop::sample::subsequence(
            vec![DataType::Profile, DataType::Funding, DataType::Team],
            1..=3,
        )
    }

    pub fn arb_category() -> impl Strategy<Value = DataCategory> {
        prop::sample::select(DataCategory::ALL.to_vec())
    }

    pub fn arb_company_type() -> impl Strategy<Value = CompanyType> {
        prop_oneof![
            Just(CompanyType::Crypto),
            Just(CompanyType::Public),
            Just(CompanyType::Private),
        ]
    }

    pub fn arb_company_ref() -> impl Strategy<Value = CompanyRef> {
        (
            arb_company_name(),
            prop::option::of(arb_domain()),
            arb_company_type(),
        )
            .prop_map(|(name, website, company_type)| {
                let company = CompanyRef::new(name).with_type(company_type);
                match website {
                    Some(site) => company.with_website(site),
                    None => company,
                }
            })
    }

    pub fn arb_confidence() -> impl Strategy<Value = f64> {
        (0u32..=100).prop_map(|n| f64::from(n) / 100.0)
    }

    pub fn arb_price_data() -> impl Strategy<Value = PriceData> {
        (
            "[A-Z]{2,5}",
            prop::option::of(0.01f64..100_000.0),
            prop::option::of(1e6f64..1e12),
            prop::option::of(-50.0f64..50.0),
            prop::sample::select(ExternalService::ALL.to_vec()),
        )
            .prop_map(|(symbol, price, cap, change, provider)| {
                let mut quote = PriceData::new(symbol, provider);
                quote.current_price = price;
                quote.market_cap = cap;
                quote.price_change_24h = change;
                quote
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;

    /// Config with short timeouts and pauses so tests run fast.
    pub fn fast_config() -> VantageConfig {
        VantageConfig::default()
            .with_timeouts(ProviderTimeouts {
                research: Duration::from_millis(200),
                crypto: Duration::from_millis(200),
                equity: Duration::from_millis(200),
            })
            .with_batch(BatchConfig {
                call_pause: Duration::from_millis(1),
                ..BatchConfig::default()
            })
            .with_advisory_lock(AdvisoryLockConfig {
                window: Duration::from_secs(300),
                wait: Duration::from_millis(20),
            })
    }

    pub fn chainlink() -> CompanyRef {
        CompanyRef::new("Chainlink").with_type(CompanyType::Crypto)
    }

    pub fn apple() -> CompanyRef {
        CompanyRef::new("Apple Inc.")
            .with_website("https://www.apple.com")
            .with_type(CompanyType::Public)
    }

    pub fn private_company(name: &str) -> CompanyRef {
        CompanyRef::new(name).with_type(CompanyType::Private)
    }

    /// `count` distinct private companies.
    pub fn many_companies(count: usize) -> Vec<CompanyRef> {
        (0..count)
            .map(|i| private_company(&format!("Startup {}", i)))
            .collect()
    }

    pub fn profile(name: &str) -> ProfileData {
        ProfileData {
            description: Some(format!("{} builds decentralized infrastructure.", name)),
            founded_year: Some(2017),
            headquarters: Some("Cayman Islands".to_string()),
            employee_count: Some(400),
            confidence_score: 0.8,
        }
    }

    pub fn funding() -> FundingData {
        FundingData {
            total_funding: Some(32_000_000.0),
            last_round: Some("ICO".to_string()),
            investors: vec!["Framework Ventures".to_string()],
            confidence_score: 0.7,
        }
    }

    pub fn team() -> TeamData {
        TeamData {
            founders: vec!["Sergey Nazarov".to_string(), "Steve Ellis".to_string()],
            executives: vec!["Sergey Nazarov (CEO)".to_string()],
            confidence_score: 0.6,
        }
    }

    pub fn news(name: &str) -> NewsData {
        NewsData {
            articles: vec![NewsArticle {
                title: format!("{} announces partnership", name),
                url: "https://example.com/news/1".to_string(),
                published_at: Some("2026-01-15".to_string()),
                snippet: None,
            }],
            confidence_score: 0.5,
        }
    }

    pub fn token_quote(name: &str) -> PriceData {
        let symbol: String = name.chars().filter(|c| c.is_alphanumeric()).take(4).collect();
        let mut quote = PriceData::new(symbol.to_uppercase(), ExternalService::CoinGecko);
        quote.current_price = Some(14.2);
        quote.market_cap = Some(8.9e9);
        quote.volume_24h = Some(5.1e8);
        quote.price_change_24h = Some(-1.5);
        quote.currency = Some("USD".to_string());
        quote
    }

    pub fn equity_quote(ticker: &str) -> PriceData {
        let mut quote = PriceData::new(ticker, ExternalService::OpenBb);
        quote.current_price = Some(227.5);
        quote.volume_24h = Some(5.12e7);
        quote.price_change_24h = Some(0.8);
        quote.currency = Some("USD".to_string());
        quote
    }

    pub fn equity_fundamentals(ticker: &str) -> PriceData {
        let mut quote = PriceData::new(ticker, ExternalService::OpenBb);
        quote.market_cap = Some(3.4e12);
        quote.pe_ratio = Some(34.1);
        quote.eps = Some(6.6);
        quote
    }

    /// Company data carrying every section in `data_types`.
    pub fn company_data(company: &CompanyRef, data_types: &[DataType]) -> CompanyData {
        company_data_at(company, data_types, Utc::now())
    }

    /// Like [`company_data`], with every section fetched at `now`.
    pub fn company_data_at(
        company: &CompanyRef,
        data_types: &[DataType],
        now: Timestamp,
    ) -> CompanyData {
        let mut data = CompanyData::new(company.identifier(), &company.name, company.company_type);
        for data_type in data_types {
            match data_type {
                DataType::Profile => data.profile = Some(profile(&company.name)),
                DataType::Funding => data.funding = Some(funding()),
                DataType::Team => data.team = Some(team()),
                DataType::News => data.news = Some(news(&company.name)),
                DataType::Price | DataType::Metrics => {
                    data.price = Some(token_quote(&company.name))
                }
            }
            data.mark_fetched(*data_type, now);
        }
        data.confidence_score = 0.5;
        data
    }

    /// Write a cache row for `company` whose freshness anchor is `age` in
    /// the past.
    pub async fn seed_cache(
        backend: &dyn CacheBackend,
        company: &CompanyRef,
        category: DataCategory,
        data_types: &[DataType],
        age: chrono::Duration,
    ) -> CacheEntry {
        let at = Utc::now() - age;
        let data = company_data_at(company, data_types, at);
        let entry = CacheEntry::new(
            company.identifier(),
            category,
            &company.name,
            data.to_payload(),
            "tavily",
            data.confidence_score,
            TtlConfig::default().ttl_for(category),
            at,
        );
        if let Err(e) = backend.store(&entry).await {
            panic!("seeding cache failed: {}", e);
        }
        entry
    }

    /// Registry with every provider mocked, plus handles to the mocks.
    pub fn mock_registry() -> (
        ProviderRegistry,
        MockResearchProvider,
        MockCryptoProvider,
        MockEquityProvider,
    ) {
        registry_with(
            MockResearchProvider::new(),
            MockCryptoProvider::new(),
            MockEquityProvider::new(),
        )
    }

    pub fn registry_with(
        research: MockResearchProvider,
        crypto: MockCryptoProvider,
        equity: MockEquityProvider,
    ) -> (
        ProviderRegistry,
        MockResearchProvider,
        MockCryptoProvider,
        MockEquityProvider,
    ) {
        let registry = ProviderRegistry::new()
            .with_research(Arc::new(research.clone()))
            .with_crypto(Arc::new(crypto.clone()))
            .with_equity(Arc::new(equity.clone()));
        (registry, research, crypto, equity)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for vantage results.

    use super::*;

    #[track_caller]
    pub fn assert_ok<T: std::fmt::Debug>(result: &VantageResult<T>) {
        assert!(result.is_ok(), "Expected Ok, got Err: {:?}", result);
    }

    #[track_caller]
    pub fn assert_budget_exceeded<T: std::fmt::Debug>(
        result: &VantageResult<T>,
        service: ExternalService,
    ) {
        match result {
            Err(VantageError::Budget(BudgetError::Exceeded { service: s, .. })) => {
                assert_eq!(*s, service, "Wrong service in BudgetExceeded");
            }
            other => panic!("Expected BudgetExceeded for {}, got: {:?}", service, other),
        }
    }

    #[track_caller]
    pub fn assert_no_data<T: std::fmt::Debug>(result: &VantageResult<T>) {
        match result {
            Err(VantageError::NoDataAvailable { .. }) => {}
            other => panic!("Expected NoDataAvailable, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_provider_error<T: std::fmt::Debug>(result: &VantageResult<T>) {
        match result {
            Err(VantageError::Provider(_)) => {}
            other => panic!("Expected Provider error, got: {:?}", other),
        }
    }

    /// Assert a confidence score is within [0, 1].
    #[track_caller]
    pub fn assert_confidence_valid(score: f64) {
        assert!(
            (0.0..=1.0).contains(&score),
            "Confidence {} outside [0, 1]",
            score
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_mock_research_logs_and_fails_on_demand() {
        let mock = MockResearchProvider::new().with_behavior(DataType::Funding, MockBehavior::Fail);
        let handle = mock.clone();

        assert!(mock.fetch_profile("Acme", None).await.is_ok());
        assert!(mock.fetch_funding("Acme", None).await.is_err());
        assert_eq!(handle.call_count(), 2);
        assert_eq!(handle.log().count_of("funding"), 1);
        assert_eq!(handle.log().calls()[0], "profile:Acme");
    }

    #[tokio::test]
    async fn test_faulty_store_switches() {
        let store = FaultyStore::new();
        let key = CacheKey::new(CompanyIdentifier::from_assigned("acme"), DataCategory::Static);
        assert!(store.load(&key).await.unwrap().is_none());

        store.set_fail_reads(true);
        assert!(matches!(
            store.load(&key).await,
            Err(StorageError::Unavailable { .. })
        ));

        store.set_fail_logs(true);
        let record = UsageRecord::new(None, ExternalService::Tavily, "search", 0.01, Utc::now());
        assert!(store.append(&record).await.is_err());
        assert!(store.inner().usage_records().is_empty());
    }

    #[tokio::test]
    async fn test_seed_cache_ages_row() {
        let store = InMemoryStore::new();
        let company = fixtures::chainlink();
        let entry = fixtures::seed_cache(
            &store,
            &company,
            DataCategory::Live,
            &[DataType::Price],
            chrono::Duration::minutes(16),
        )
        .await;
        assert!(!entry.is_fresh(&TtlConfig::default(), Utc::now()));
        let data = CompanyData::from_payload(&entry.payload).unwrap();
        assert!(data.has(DataType::Price));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_types_are_non_empty(types in generators::arb_data_types()) {
            prop_assert!(!types.is_empty());
        }

        #[test]
        fn prop_generated_confidence_valid(score in generators::arb_confidence()) {
            assertions::assert_confidence_valid(score);
        }
    }
}
