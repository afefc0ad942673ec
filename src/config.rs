use std::env;
use std::str::FromStr;
use std::time::Duration;

/// TTLs and sweep cadence for the two logical caches.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Staleness bound for cached quotes.
    pub quote_ttl: Duration,
    /// Staleness bound for cached portfolio forecasts.
    pub forecast_ttl: Duration,
    /// Staleness bound for cached historical series.
    pub history_ttl: Duration,
    /// How often expired local-tier entries are purged.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            quote_ttl: Duration::from_secs(3600),
            forecast_ttl: Duration::from_secs(3600),
            history_ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

/// Market data acquisition limits.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Size of the quote permit pool.
    pub max_concurrent_fetches: usize,
    /// Per-provider deadline for a single quote.
    pub quote_timeout: Duration,
    /// Deadline for a single historical series.
    pub history_timeout: Duration,
    /// Number of daily closes requested per symbol.
    pub history_window_days: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 10,
            quote_timeout: Duration::from_secs(5),
            history_timeout: Duration::from_secs(10),
            history_window_days: 30,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Deployment environment label.
    pub environment: String,
    /// Base URL of the forecasting engine (required).
    pub forecast_engine_url: Option<String>,
    /// Alpha Vantage API key. Without it only Yahoo serves live quotes.
    pub alpha_vantage_api_key: Option<String>,
    /// Redis URL for the durable cache tier.
    pub redis_url: Option<String>,
    pub cache: CacheConfig,
    pub fetch: FetchConfig,
    /// Deadline for the forecasting engine call.
    pub engine_timeout: Duration,
    /// Deadline for a whole forecast request.
    pub request_timeout: Duration,
    /// Inbound requests allowed per minute across the service.
    pub rate_limit_per_minute: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: "production".to_string(),
            forecast_engine_url: None,
            alpha_vantage_api_key: None,
            redis_url: None,
            cache: CacheConfig::default(),
            fetch: FetchConfig::default(),
            engine_timeout: Duration::from_secs(30),
            request_timeout: Duration::from_secs(30),
            rate_limit_per_minute: 100,
        }
    }
}

fn parse_env<T: FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

fn non_empty_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: env::var("HOST").unwrap_or(defaults.host),
            port: parse_env("PORT").unwrap_or(defaults.port),
            environment: env::var("ENVIRONMENT").unwrap_or(defaults.environment),
            forecast_engine_url: non_empty_env("FORECAST_ENGINE_URL")
                .or_else(|| non_empty_env("PYTHON_SERVICE_URL"))
                .map(|url| url.trim_end_matches('/').to_string()),
            alpha_vantage_api_key: non_empty_env("ALPHA_VANTAGE_API_KEY")
                .or_else(|| non_empty_env("ALPHA_VANTAGE_KEY")),
            redis_url: non_empty_env("REDIS_URL"),
            cache: CacheConfig {
                quote_ttl: parse_env("QUOTE_CACHE_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.cache.quote_ttl),
                forecast_ttl: parse_env("FORECAST_CACHE_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.cache.forecast_ttl),
                history_ttl: parse_env("HISTORY_CACHE_TTL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.cache.history_ttl),
                sweep_interval: parse_env("CACHE_SWEEP_INTERVAL_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(defaults.cache.sweep_interval),
            },
            fetch: FetchConfig {
                max_concurrent_fetches: parse_env("MAX_CONCURRENT_FETCHES")
                    .unwrap_or(defaults.fetch.max_concurrent_fetches),
                quote_timeout: parse_env("QUOTE_TIMEOUT_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.fetch.quote_timeout),
                history_timeout: parse_env("HISTORY_TIMEOUT_MS")
                    .map(Duration::from_millis)
                    .unwrap_or(defaults.fetch.history_timeout),
                history_window_days: parse_env("HISTORY_WINDOW_DAYS")
                    .unwrap_or(defaults.fetch.history_window_days),
            },
            engine_timeout: parse_env("ENGINE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.engine_timeout),
            request_timeout: parse_env("REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            rate_limit_per_minute: parse_env("RATE_LIMIT_PER_MINUTE")
                .unwrap_or(defaults.rate_limit_per_minute),
        }
    }

    /// Check the settings the service cannot start without.
    pub fn validate(&self) -> Result<(), String> {
        if self.forecast_engine_url.is_none() {
            return Err("FORECAST_ENGINE_URL is required".to_string());
        }
        if self.fetch.max_concurrent_fetches == 0 {
            return Err("MAX_CONCURRENT_FETCHES must be at least 1".to_string());
        }
        if !(1..=365).contains(&self.fetch.history_window_days) {
            return Err(format!(
                "HISTORY_WINDOW_DAYS must be between 1 and 365, got {}",
                self.fetch.history_window_days
            ));
        }
        if self.rate_limit_per_minute == 0 {
            return Err("RATE_LIMIT_PER_MINUTE must be at least 1".to_string());
        }
        Ok(())
    }
}
