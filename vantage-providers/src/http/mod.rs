//! HTTP provider implementations
//!
//! Concrete implementations of the provider traits over each service's
//! public REST API, sharing one rate-limited JSON client.

pub mod client;
pub mod coingecko;
pub mod openbb;
pub mod tavily;

pub use client::{parse_retry_after_ms, RateLimitedClient};
pub use coingecko::CoinGeckoClient;
pub use openbb::{OpenBbClient, DEFAULT_OPENBB_BASE_URL};
pub use tavily::TavilyClient;
