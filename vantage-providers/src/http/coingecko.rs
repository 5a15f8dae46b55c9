//! CoinGecko client: the crypto market-data provider.

use super::client::RateLimitedClient;
use crate::CryptoMarketProvider;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use vantage_core::{normalize, ExternalService, PriceData, ProviderError};

const COINGECKO_BASE_URL: &str = "https://api.coingecko.com/api/v3";
const DEMO_KEY_HEADER: &str = "x-cg-demo-api-key";

#[derive(Debug, Clone, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    coins: Vec<CoinMatch>,
}

#[derive(Debug, Clone, Deserialize)]
struct CoinMatch {
    id: String,
    name: String,
    symbol: String,
    #[serde(default)]
    market_cap_rank: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct MarketRow {
    symbol: String,
    current_price: Option<f64>,
    market_cap: Option<f64>,
    total_volume: Option<f64>,
    price_change_percentage_24h: Option<f64>,
}

/// Crypto quotes from the CoinGecko public API.
///
/// Without a key the public tier applies (roughly 10 to 30 calls a minute).
pub struct CoinGeckoClient {
    http: RateLimitedClient,
}

impl CoinGeckoClient {
    /// Client for the public tier, or the demo tier when `api_key` is set.
    pub fn new(api_key: Option<String>) -> Self {
        Self::with_base_url(api_key, COINGECKO_BASE_URL)
    }

    pub fn with_base_url(api_key: Option<String>, base_url: impl Into<String>) -> Self {
        let rpm = if api_key.is_some() { 30 } else { 10 };
        let http = RateLimitedClient::new(
            ExternalService::CoinGecko,
            base_url,
            rpm,
            Duration::from_secs(10),
        );
        let http = match api_key.filter(|k| !k.trim().is_empty()) {
            Some(key) => http.with_header(DEMO_KEY_HEADER, key),
            None => http,
        };
        Self { http }
    }
}

/// Pick the coin that best matches the project.
///
/// Exact name or website-slug matches win; otherwise the best-ranked
/// candidate whose name contains the query.
fn best_match<'a>(coins: &'a [CoinMatch], name: &str, website: Option<&str>) -> Option<&'a CoinMatch> {
    let wanted = normalize(name, None);
    let site_slug = website
        .map(|w| normalize("", Some(w)))
        .and_then(|id| id.as_str().split('.').next().map(str::to_string));

    let exact = coins.iter().find(|c| {
        let candidate = normalize(&c.name, None);
        candidate == wanted
            || c.id == wanted.as_str()
            || site_slug.as_deref().is_some_and(|slug| c.id == slug)
    });
    if exact.is_some() {
        return exact;
    }

    coins
        .iter()
        .filter(|c| normalize(&c.name, None).as_str().contains(wanted.as_str()))
        .min_by_key(|c| c.market_cap_rank.unwrap_or(u32::MAX))
}

#[async_trait]
impl CryptoMarketProvider for CoinGeckoClient {
    async fn lookup_token(
        &self,
        name: &str,
        website: Option<&str>,
    ) -> Result<Option<PriceData>, ProviderError> {
        let search: SearchResponse = self.http.get_json("search", &[("query", name)]).await?;
        let Some(coin) = best_match(&search.coins, name, website) else {
            tracing::debug!(name = %name, candidates = search.coins.len(), "No matching token");
            return Ok(None);
        };

        let rows: Vec<MarketRow> = self
            .http
            .get_json(
                "coins/markets",
                &[("vs_currency", "usd"), ("ids", coin.id.as_str())],
            )
            .await?;
        let Some(row) = rows.into_iter().next() else {
            return Ok(None);
        };

        let mut quote = PriceData::new(row.symbol.to_uppercase(), ExternalService::CoinGecko);
        quote.current_price = row.current_price;
        quote.market_cap = row.market_cap;
        quote.volume_24h = row.total_volume;
        quote.price_change_24h = row.price_change_percentage_24h;
        quote.currency = Some("USD".to_string());
        Ok(Some(quote))
    }
}

impl std::fmt::Debug for CoinGeckoClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoinGeckoClient")
            .field("http", &self.http)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coin(id: &str, name: &str, symbol: &str, rank: Option<u32>) -> CoinMatch {
        CoinMatch {
            id: id.to_string(),
            name: name.to_string(),
            symbol: symbol.to_string(),
            market_cap_rank: rank,
        }
    }

    #[test]
    fn test_exact_name_wins_over_rank() {
        let coins = vec![
            coin("chainlink-wrapped", "Wrapped Chainlink", "wlink", Some(3)),
            coin("chainlink", "Chainlink", "link", Some(15)),
        ];
        let found = best_match(&coins, "Chainlink Labs", None).unwrap();
        assert_eq!(found.symbol, "link");
    }

    #[test]
    fn test_website_slug_match() {
        let coins = vec![
            coin("uniswap", "Uniswap", "uni", Some(20)),
            coin("aave", "Aave", "aave", Some(40)),
        ];
        let found = best_match(&coins, "Aave Companies", Some("https://aave.com")).unwrap();
        assert_eq!(found.id, "aave");
    }

    #[test]
    fn test_partial_match_prefers_best_rank() {
        let coins = vec![
            coin("solana-bridged", "Solana Bridged", "sol-b", None),
            coin("solana-old", "Solana Classic", "solc", Some(900)),
        ];
        let found = best_match(&coins, "Solana", None).unwrap();
        assert_eq!(found.id, "solana-old");
        assert!(best_match(&coins, "Polkadot", None).is_none());
    }

    #[test]
    fn test_market_row_decodes_nulls() {
        let body = serde_json::json!([{
            "id": "chainlink",
            "symbol": "link",
            "name": "Chainlink",
            "current_price": 14.2,
            "market_cap": null,
            "total_volume": 512000000.0,
            "price_change_percentage_24h": -1.5
        }]);
        let rows: Vec<MarketRow> = serde_json::from_value(body).unwrap();
        assert_eq!(rows[0].current_price, Some(14.2));
        assert!(rows[0].market_cap.is_none());
    }
}
