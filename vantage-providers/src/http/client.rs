//! Shared HTTP client with request spacing

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use vantage_core::{ExternalService, ProviderError};

/// JSON-over-HTTP client for one external service.
///
/// Concurrency is bounded by a semaphore and consecutive requests are spaced
/// at least `60_000 / requests_per_minute` milliseconds apart.
pub struct RateLimitedClient {
    client: Client,
    service: ExternalService,
    base_url: String,
    /// Extra header sent on every request, typically an API key
    auth_header: Option<(String, String)>,
    timeout: Duration,
    rate_limiter: Arc<Semaphore>,
    last_request: Arc<AtomicU64>,
    min_request_interval_ms: u64,
    start_time: Instant,
}

impl RateLimitedClient {
    /// Create a client.
    ///
    /// # Arguments
    /// * `service` - Service this client talks to, used in errors and logs
    /// * `base_url` - URL prefix every endpoint is appended to
    /// * `requests_per_minute` - Upper bound on request rate
    /// * `timeout` - Per-request transport timeout
    pub fn new(
        service: ExternalService,
        base_url: impl Into<String>,
        requests_per_minute: u32,
        timeout: Duration,
    ) -> Self {
        let rpm = requests_per_minute.max(1);
        let min_interval_ms = (60_000 / u64::from(rpm)).max(10);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            service,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_header: None,
            timeout,
            rate_limiter: Arc::new(Semaphore::new((rpm as usize).min(16))),
            last_request: Arc::new(AtomicU64::new(0)),
            min_request_interval_ms: min_interval_ms,
            start_time: Instant::now(),
        }
    }

    /// Send `name: value` on every request.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.auth_header = Some((name.into(), value.into()));
        self
    }

    pub fn service(&self) -> ExternalService {
        self.service
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    /// POST a JSON body and decode a JSON response.
    pub async fn post_json<Req: Serialize, Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &Req,
    ) -> Result<Res, ProviderError> {
        let request = self.client.post(self.url(endpoint)).json(body);
        self.execute(endpoint, request).await
    }

    /// GET with query parameters and decode a JSON response.
    pub async fn get_json<Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<Res, ProviderError> {
        let request = self.client.get(self.url(endpoint)).query(query);
        self.execute(endpoint, request).await
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    async fn execute<Res: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: RequestBuilder,
    ) -> Result<Res, ProviderError> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                service: self.service,
                status: 0,
                message: format!("Rate limiter error: {}", e),
            })?;

        self.pace().await;

        let request = match &self.auth_header {
            Some((name, value)) => request.header(name.as_str(), value.as_str()),
            None => request,
        };

        let started = Instant::now();
        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout {
                    service: self.service,
                    timeout: self.timeout,
                }
            } else {
                ProviderError::RequestFailed {
                    service: self.service,
                    status: 0,
                    message: format!("HTTP request failed: {}", e),
                }
            }
        })?;

        let status = response.status();
        let retry_after_ms = parse_retry_after_ms(response.headers()).unwrap_or(0);
        tracing::debug!(
            service = %self.service,
            endpoint = %endpoint,
            status = status.as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "Provider request completed"
        );

        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    service: self.service,
                    reason: format!("Failed to parse response: {}", e),
                });
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited {
                service: self.service,
                retry_after_ms,
            },
            StatusCode::NOT_FOUND => ProviderError::NotFound {
                service: self.service,
                subject: endpoint.to_string(),
            },
            _ => ProviderError::RequestFailed {
                service: self.service,
                status: status.as_u16(),
                message: truncate(&error_text, 300),
            },
        })
    }

    /// Wait until this request's slot, reserving it before sleeping so that
    /// concurrent callers queue behind each other.
    async fn pace(&self) {
        let now_ms = self.start_time.elapsed().as_millis() as u64;
        let mut last = self.last_request.load(Ordering::Relaxed);
        let slot = loop {
            // 0 means no request has been sent yet.
            let slot = if last == 0 {
                now_ms.max(1)
            } else {
                now_ms.max(last.saturating_add(self.min_request_interval_ms))
            };
            match self.last_request.compare_exchange_weak(
                last,
                slot,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break slot,
                Err(current) => last = current,
            }
        };

        if slot > now_ms {
            tokio::time::sleep(Duration::from_millis(slot - now_ms)).await;
        }
    }
}

/// `Retry-After` in milliseconds, when given as delta-seconds.
pub fn parse_retry_after_ms(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|seconds| seconds.is_finite() && *seconds >= 0.0)
        .map(|seconds| (seconds * 1000.0) as u64)
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

impl std::fmt::Debug for RateLimitedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitedClient")
            .field("service", &self.service)
            .field("base_url", &self.base_url)
            .field(
                "auth_header",
                &self.auth_header.as_ref().map(|(name, _)| (name, "[REDACTED]")),
            )
            .field("min_request_interval_ms", &self.min_request_interval_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER};

    #[test]
    fn test_parse_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("2.5"));
        assert_eq!(parse_retry_after_ms(&headers), Some(2500));
    }

    #[test]
    fn test_parse_retry_after_rejects_dates_and_negatives() {
        let mut headers = HeaderMap::new();
        assert_eq!(parse_retry_after_ms(&headers), None);
        headers.insert(
            RETRY_AFTER,
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(parse_retry_after_ms(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("-3"));
        assert_eq!(parse_retry_after_ms(&headers), None);
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let client = RateLimitedClient::new(
            ExternalService::CoinGecko,
            "https://api.coingecko.com/api/v3/",
            30,
            Duration::from_secs(10),
        )
        .with_header("x-cg-demo-api-key", "secret-key");
        let debug = format!("{:?}", client);
        assert!(!debug.contains("secret-key"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(client.base_url(), "https://api.coingecko.com/api/v3");
        assert_eq!(client.min_request_interval(), Duration::from_millis(2000));
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("short", 10), "short");
    }

    #[tokio::test]
    async fn test_pace_spaces_consecutive_requests() {
        let client = RateLimitedClient::new(
            ExternalService::OpenBb,
            "http://localhost:6900",
            600,
            Duration::from_secs(1),
        );
        let started = Instant::now();
        client.pace().await;
        client.pace().await;
        client.pace().await;
        assert!(started.elapsed() >= Duration::from_millis(190));
    }
}
