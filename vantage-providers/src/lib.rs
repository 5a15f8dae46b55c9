//! VANTAGE Providers - External Data Sources
//!
//! Async contracts for the three external data sources the fetch services
//! consult, a registry holding whichever of them are configured, and HTTP
//! clients for Tavily (company research), CoinGecko (crypto market data)
//! and an OpenBB Platform REST server (equity market data).
//!
//! Every provider call may fail or time out. Callers wrap each call in their
//! own timeout and treat a failure as affecting that call only.

use async_trait::async_trait;
use std::sync::Arc;
use vantage_core::{
    ExternalService, FundingData, NewsData, PriceData, ProfileData, ProviderError, TeamData,
};

pub mod extract;
pub mod http;

pub use http::{
    parse_retry_after_ms, CoinGeckoClient, OpenBbClient, RateLimitedClient, TavilyClient,
    DEFAULT_OPENBB_BASE_URL,
};

// ============================================================================
// PROVIDER TRAITS
// ============================================================================

/// Text-search company research: profile, funding, team and news sections.
#[async_trait]
pub trait CompanyResearchProvider: Send + Sync {
    async fn fetch_profile(
        &self,
        name: &str,
        website: Option<&str>,
    ) -> Result<ProfileData, ProviderError>;

    async fn fetch_funding(
        &self,
        name: &str,
        website: Option<&str>,
    ) -> Result<FundingData, ProviderError>;

    async fn fetch_team(&self, name: &str) -> Result<TeamData, ProviderError>;

    async fn fetch_news(&self, name: &str) -> Result<NewsData, ProviderError>;

    /// Service billed for calls made through this provider.
    fn service(&self) -> ExternalService {
        ExternalService::Tavily
    }
}

/// Crypto market data keyed by project name.
#[async_trait]
pub trait CryptoMarketProvider: Send + Sync {
    /// Quote for the project's token, or `None` when no token matches.
    async fn lookup_token(
        &self,
        name: &str,
        website: Option<&str>,
    ) -> Result<Option<PriceData>, ProviderError>;

    fn service(&self) -> ExternalService {
        ExternalService::CoinGecko
    }
}

/// Equity market data keyed by ticker.
#[async_trait]
pub trait EquityMarketProvider: Send + Sync {
    /// Latest quote.
    async fn get_price(&self, ticker: &str) -> Result<PriceData, ProviderError>;

    /// Valuation metrics. Quote fields may be absent.
    async fn get_fundamentals(&self, ticker: &str) -> Result<PriceData, ProviderError>;

    fn service(&self) -> ExternalService {
        ExternalService::OpenBb
    }
}

// ============================================================================
// PROVIDER REGISTRY
// ============================================================================

/// Registry of the configured providers.
///
/// A provider left unregistered is simply skipped by the fetch services.
///
/// # Example
/// ```ignore
/// let mut registry = ProviderRegistry::new();
/// registry.register_research(Box::new(TavilyClient::new(api_key)));
///
/// let profile = registry.research()?.fetch_profile("Acme", None).await?;
/// ```
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    research: Option<Arc<dyn CompanyResearchProvider>>,
    crypto: Option<Arc<dyn CryptoMarketProvider>>,
    equity: Option<Arc<dyn EquityMarketProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the company-research provider, replacing any previous one.
    pub fn register_research(&mut self, provider: Box<dyn CompanyResearchProvider>) {
        self.research = Some(Arc::from(provider));
    }

    pub fn register_crypto(&mut self, provider: Box<dyn CryptoMarketProvider>) {
        self.crypto = Some(Arc::from(provider));
    }

    pub fn register_equity(&mut self, provider: Box<dyn EquityMarketProvider>) {
        self.equity = Some(Arc::from(provider));
    }

    /// Builder form of the `register_*` methods for shared providers.
    pub fn with_research(mut self, provider: Arc<dyn CompanyResearchProvider>) -> Self {
        self.research = Some(provider);
        self
    }

    pub fn with_crypto(mut self, provider: Arc<dyn CryptoMarketProvider>) -> Self {
        self.crypto = Some(provider);
        self
    }

    pub fn with_equity(mut self, provider: Arc<dyn EquityMarketProvider>) -> Self {
        self.equity = Some(provider);
        self
    }

    /// The research provider, or `ProviderNotConfigured`.
    pub fn research(&self) -> Result<Arc<dyn CompanyResearchProvider>, ProviderError> {
        self.research
            .clone()
            .ok_or(ProviderError::ProviderNotConfigured {
                service: ExternalService::Tavily,
            })
    }

    pub fn crypto(&self) -> Result<Arc<dyn CryptoMarketProvider>, ProviderError> {
        self.crypto.clone().ok_or(ProviderError::ProviderNotConfigured {
            service: ExternalService::CoinGecko,
        })
    }

    pub fn equity(&self) -> Result<Arc<dyn EquityMarketProvider>, ProviderError> {
        self.equity.clone().ok_or(ProviderError::ProviderNotConfigured {
            service: ExternalService::OpenBb,
        })
    }

    pub fn has_research(&self) -> bool {
        self.research.is_some()
    }

    pub fn has_crypto(&self) -> bool {
        self.crypto.is_some()
    }

    pub fn has_equity(&self) -> bool {
        self.equity.is_some()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("research", &self.research.is_some())
            .field("crypto", &self.crypto.is_some())
            .field("equity", &self.equity.is_some())
            .finish()
    }
}
