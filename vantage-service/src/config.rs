//! Environment Configuration
//!
//! Overlays `VANTAGE_*` environment variables on the defaults in
//! [`VantageConfig`]. Absent or unparsable values keep the default; the
//! merged result is validated before it is returned.
//!
//! Environment variables:
//! - `VANTAGE_TTL_STATIC_SECS`, `VANTAGE_TTL_LIVE_SECS`, `VANTAGE_TTL_MIXED_SECS`
//! - `VANTAGE_BUDGET_{TAVILY,OPENBB,COINGECKO}_CALLS`: daily call limit
//! - `VANTAGE_BUDGET_{TAVILY,OPENBB,COINGECKO}_COST`: daily spend limit (USD)
//! - `VANTAGE_COST_PER_CALL_{TAVILY,OPENBB,COINGECKO}`: estimated USD per call
//! - `VANTAGE_TIMEOUT_{RESEARCH,CRYPTO,EQUITY}_SECS`
//! - `VANTAGE_BATCH_MAX_API_CALLS`, `VANTAGE_BATCH_PAUSE_MS`
//! - `VANTAGE_ADVISORY_LOCK_WINDOW_SECS`, `VANTAGE_ADVISORY_LOCK_WAIT_MS`
//! - `VANTAGE_RETENTION_GRACE_DAYS`, `VANTAGE_SWEEP_INTERVAL_SECS`
//! - `VANTAGE_LOG_RETENTION_DAYS`: days of usage records and cache events kept
//! - `VANTAGE_CACHE_PATH`, `VANTAGE_CACHE_MAP_SIZE_MB`
//!
//! Provider credentials use the providers' own names: `TAVILY_API_KEY`,
//! `COINGECKO_API_KEY`, `OPENBB_BASE_URL` and `OPENBB_PAT`.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use vantage_core::constants::{DEFAULT_CACHE_MAP_SIZE, DEFAULT_CACHE_PATH};
use vantage_core::{BudgetLimit, ExternalService, VantageConfig, VantageResult};
use vantage_providers::{CoinGeckoClient, OpenBbClient, ProviderRegistry, TavilyClient};

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env_parse::<u64>(key).map(Duration::from_secs).unwrap_or(default)
}

fn env_millis(key: &str, default: Duration) -> Duration {
    env_parse::<u64>(key).map(Duration::from_millis).unwrap_or(default)
}

/// Load [`VantageConfig`] from the environment.
pub fn load_config_from_env() -> VantageResult<VantageConfig> {
    let mut config = VantageConfig::default();

    config.ttl.static_ttl = env_secs("VANTAGE_TTL_STATIC_SECS", config.ttl.static_ttl);
    config.ttl.live_ttl = env_secs("VANTAGE_TTL_LIVE_SECS", config.ttl.live_ttl);
    config.ttl.mixed_ttl = env_secs("VANTAGE_TTL_MIXED_SECS", config.ttl.mixed_ttl);

    for service in ExternalService::ALL {
        let current = config.budget_for(service);
        let key = service.as_str().to_uppercase();
        let limit = BudgetLimit::new(
            env_parse(&format!("VANTAGE_BUDGET_{}_CALLS", key)).unwrap_or(current.daily_calls),
            env_parse(&format!("VANTAGE_BUDGET_{}_COST", key)).unwrap_or(current.daily_cost),
            env_parse(&format!("VANTAGE_COST_PER_CALL_{}", key)).unwrap_or(current.cost_per_call),
        );
        config = config.with_budget(service, limit);
    }

    config.timeouts.research = env_secs("VANTAGE_TIMEOUT_RESEARCH_SECS", config.timeouts.research);
    config.timeouts.crypto = env_secs("VANTAGE_TIMEOUT_CRYPTO_SECS", config.timeouts.crypto);
    config.timeouts.equity = env_secs("VANTAGE_TIMEOUT_EQUITY_SECS", config.timeouts.equity);

    config.batch.max_api_calls =
        env_parse("VANTAGE_BATCH_MAX_API_CALLS").unwrap_or(config.batch.max_api_calls);
    config.batch.call_pause = env_millis("VANTAGE_BATCH_PAUSE_MS", config.batch.call_pause);

    config.advisory_lock.window =
        env_secs("VANTAGE_ADVISORY_LOCK_WINDOW_SECS", config.advisory_lock.window);
    config.advisory_lock.wait = env_millis("VANTAGE_ADVISORY_LOCK_WAIT_MS", config.advisory_lock.wait);

    config.retention.grace_days =
        env_parse("VANTAGE_RETENTION_GRACE_DAYS").unwrap_or(config.retention.grace_days);
    config.retention.sweep_interval =
        env_secs("VANTAGE_SWEEP_INTERVAL_SECS", config.retention.sweep_interval);
    config.retention.log_retention_days = env_parse("VANTAGE_LOG_RETENTION_DAYS")
        .unwrap_or(config.retention.log_retention_days);

    config.validate()?;
    Ok(config)
}

/// Where the LMDB cache lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageSettings {
    pub cache_path: String,
    pub map_size_mb: usize,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            cache_path: DEFAULT_CACHE_PATH.to_string(),
            map_size_mb: DEFAULT_CACHE_MAP_SIZE / (1024 * 1024),
        }
    }
}

impl StorageSettings {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            cache_path: env_string("VANTAGE_CACHE_PATH").unwrap_or(defaults.cache_path),
            map_size_mb: env_parse::<usize>("VANTAGE_CACHE_MAP_SIZE_MB")
                .filter(|mb| *mb > 0)
                .unwrap_or(defaults.map_size_mb),
        }
    }
}

/// Provider credentials read from the environment.
#[derive(Clone, Default)]
pub struct ProviderCredentials {
    pub tavily_api_key: Option<String>,
    pub coingecko_api_key: Option<String>,
    pub openbb_base_url: Option<String>,
    pub openbb_token: Option<String>,
}

impl ProviderCredentials {
    pub fn from_env() -> Self {
        Self {
            tavily_api_key: env_string("TAVILY_API_KEY"),
            coingecko_api_key: env_string("COINGECKO_API_KEY"),
            openbb_base_url: env_string("OPENBB_BASE_URL"),
            openbb_token: env_string("OPENBB_PAT"),
        }
    }

    /// Register an HTTP client for every provider that can be reached.
    ///
    /// Tavily needs a key and OpenBB needs a server URL; without them those
    /// providers stay unregistered. CoinGecko's public tier needs no key.
    pub fn build_registry(&self) -> ProviderRegistry {
        let mut registry = ProviderRegistry::new();

        match &self.tavily_api_key {
            Some(key) => registry = registry.with_research(Arc::new(TavilyClient::new(key.clone()))),
            None => tracing::warn!("TAVILY_API_KEY not set, company research disabled"),
        }

        registry = registry.with_crypto(Arc::new(CoinGeckoClient::new(self.coingecko_api_key.clone())));

        match &self.openbb_base_url {
            Some(url) => {
                let client = OpenBbClient::new(url.clone());
                let client = match &self.openbb_token {
                    Some(token) => client.with_token(token.clone()),
                    None => client,
                };
                registry = registry.with_equity(Arc::new(client));
            }
            None => tracing::warn!("OPENBB_BASE_URL not set, equity data disabled"),
        }

        tracing::info!(
            research = registry.has_research(),
            crypto = registry.has_crypto(),
            equity = registry.has_equity(),
            "Provider registry built"
        );
        registry
    }
}

impl std::fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn redact(value: &Option<String>) -> &'static str {
            if value.is_some() {
                "[REDACTED]"
            } else {
                "None"
            }
        }
        f.debug_struct("ProviderCredentials")
            .field("tavily_api_key", &redact(&self.tavily_api_key))
            .field("coingecko_api_key", &redact(&self.coingecko_api_key))
            .field("openbb_base_url", &self.openbb_base_url)
            .field("openbb_token", &redact(&self.openbb_token))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_defaults_without_overrides() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _a = EnvVarGuard::set("VANTAGE_TTL_LIVE_SECS", None);
        let _b = EnvVarGuard::set("VANTAGE_BATCH_MAX_API_CALLS", None);
        let config = load_config_from_env().unwrap();
        assert_eq!(config.ttl.live_ttl, Duration::from_secs(15 * 60));
        assert_eq!(config.batch.max_api_calls, 20);
    }

    #[test]
    fn test_overrides_apply() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _a = EnvVarGuard::set("VANTAGE_TTL_LIVE_SECS", Some("60"));
        let _b = EnvVarGuard::set("VANTAGE_BUDGET_TAVILY_CALLS", Some("3"));
        let _c = EnvVarGuard::set("VANTAGE_BATCH_PAUSE_MS", Some("10"));
        let config = load_config_from_env().unwrap();
        assert_eq!(config.ttl.live_ttl, Duration::from_secs(60));
        assert_eq!(config.budget_for(ExternalService::Tavily).daily_calls, 3);
        assert_eq!(config.batch.call_pause, Duration::from_millis(10));
    }

    #[test]
    fn test_unparsable_value_keeps_default() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _a = EnvVarGuard::set("VANTAGE_TTL_STATIC_SECS", Some("thirty days"));
        let config = load_config_from_env().unwrap();
        assert_eq!(config.ttl.static_ttl, Duration::from_secs(30 * 24 * 60 * 60));
    }

    #[test]
    fn test_retention_overrides_apply() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _a = EnvVarGuard::set("VANTAGE_RETENTION_GRACE_DAYS", Some("4294967295"));
        let _b = EnvVarGuard::set("VANTAGE_LOG_RETENTION_DAYS", Some("30"));
        let config = load_config_from_env().unwrap();
        assert_eq!(config.retention.grace_days, u32::MAX);
        assert_eq!(config.retention.log_retention(), Duration::from_secs(30 * 86400));
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _a = EnvVarGuard::set("VANTAGE_BATCH_MAX_API_CALLS", Some("0"));
        assert!(load_config_from_env().is_err());
    }

    #[test]
    fn test_storage_settings_from_env() {
        let _lock = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        let _a = EnvVarGuard::set("VANTAGE_CACHE_PATH", Some("/tmp/vantage-test"));
        let _b = EnvVarGuard::set("VANTAGE_CACHE_MAP_SIZE_MB", Some("0"));
        let settings = StorageSettings::from_env();
        assert_eq!(settings.cache_path, "/tmp/vantage-test");
        assert_eq!(settings.map_size_mb, 1024);
    }

    #[test]
    fn test_registry_skips_missing_credentials() {
        let registry = ProviderCredentials::default().build_registry();
        assert!(!registry.has_research());
        assert!(registry.has_crypto());
        assert!(!registry.has_equity());

        let credentials = ProviderCredentials {
            tavily_api_key: Some("tvly-test".to_string()),
            openbb_base_url: Some("http://127.0.0.1:6900".to_string()),
            ..Default::default()
        };
        let registry = credentials.build_registry();
        assert!(registry.has_research());
        assert!(registry.has_equity());
    }

    #[test]
    fn test_credentials_debug_redacts_keys() {
        let credentials = ProviderCredentials {
            tavily_api_key: Some("tvly-secret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", credentials);
        assert!(!rendered.contains("tvly-secret"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
