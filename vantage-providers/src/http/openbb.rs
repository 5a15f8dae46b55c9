//! OpenBB Platform REST client: the equity market-data provider.

use super::client::RateLimitedClient;
use crate::EquityMarketProvider;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use vantage_core::{ExternalService, PriceData, ProviderError};

pub const DEFAULT_OPENBB_BASE_URL: &str = "http://127.0.0.1:6900";
const DEFAULT_DATA_PROVIDER: &str = "yfinance";

/// OpenBB wraps every response in an `OBBject` with a `results` list.
#[derive(Debug, Clone, Deserialize)]
struct ObbResponse<T> {
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
struct QuoteRow {
    symbol: String,
    #[serde(default, alias = "price")]
    last_price: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
    #[serde(default)]
    change_percent: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct MetricsRow {
    #[serde(default)]
    symbol: Option<String>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    pe_ratio: Option<f64>,
    #[serde(default, alias = "eps_ttm")]
    eps: Option<f64>,
    #[serde(default, alias = "revenue")]
    revenue_ttm: Option<f64>,
    #[serde(default)]
    currency: Option<String>,
}

/// Equity quotes and fundamentals from a self-hosted OpenBB Platform API.
pub struct OpenBbClient {
    http: RateLimitedClient,
    data_provider: String,
}

impl OpenBbClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: RateLimitedClient::new(
                ExternalService::OpenBb,
                base_url,
                120,
                Duration::from_secs(15),
            ),
            data_provider: DEFAULT_DATA_PROVIDER.to_string(),
        }
    }

    /// Upstream data vendor OpenBB should query (`yfinance`, `fmp`, ...).
    pub fn with_data_provider(mut self, provider: impl Into<String>) -> Self {
        self.data_provider = provider.into();
        self
    }

    /// Personal access token for a secured OpenBB server.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.http = self
            .http
            .with_header("Authorization", format!("Bearer {}", token.into()));
        self
    }

    async fn first_row<T: serde::de::DeserializeOwned>(
        &self,
        endpoint: &str,
        ticker: &str,
    ) -> Result<T, ProviderError> {
        let response: ObbResponse<T> = self
            .http
            .get_json(
                endpoint,
                &[("symbol", ticker), ("provider", self.data_provider.as_str())],
            )
            .await?;
        response
            .results
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::NotFound {
                service: ExternalService::OpenBb,
                subject: ticker.to_string(),
            })
    }
}

#[async_trait]
impl EquityMarketProvider for OpenBbClient {
    async fn get_price(&self, ticker: &str) -> Result<PriceData, ProviderError> {
        let row: QuoteRow = self.first_row("api/v1/equity/price/quote", ticker).await?;
        Ok(quote_to_price(row))
    }

    async fn get_fundamentals(&self, ticker: &str) -> Result<PriceData, ProviderError> {
        let row: MetricsRow = self
            .first_row("api/v1/equity/fundamental/metrics", ticker)
            .await?;
        Ok(metrics_to_price(row, ticker))
    }
}

fn quote_to_price(row: QuoteRow) -> PriceData {
    let mut price = PriceData::new(row.symbol, ExternalService::OpenBb);
    price.current_price = row.last_price;
    price.market_cap = row.market_cap;
    price.volume_24h = row.volume;
    price.price_change_24h = row.change_percent;
    price.currency = row.currency;
    price
}

fn metrics_to_price(row: MetricsRow, ticker: &str) -> PriceData {
    let symbol = row.symbol.unwrap_or_else(|| ticker.to_uppercase());
    let mut price = PriceData::new(symbol, ExternalService::OpenBb);
    price.market_cap = row.market_cap;
    price.pe_ratio = row.pe_ratio;
    price.eps = row.eps;
    price.revenue_ttm = row.revenue_ttm;
    price.currency = row.currency;
    price
}

impl std::fmt::Debug for OpenBbClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenBbClient")
            .field("http", &self.http)
            .field("data_provider", &self.data_provider)
            .finish()
    }
}
