//! Forecast pipeline: cache check, concurrent acquisition, engine call,
//! portfolio aggregation and cache write.

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::services::market_data::MarketDataAcquirer;
use crate::services::tiered_cache::TieredCache;
use crate::sources::ForecastEngine;
use crate::types::{
    EngineRequest, EngineResponse, ForecastRequest, Percentiles, PortfolioForecast,
    PortfolioHolding, TickerForecast, TickerQuote,
};
use chrono::Utc;
use futures_util::future;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

pub const FORECAST_NAMESPACE: &str = "forecasts";

/// Order-independent identity of a ticker set: sorted, de-duplicated, joined and hashed.
pub fn cache_key(tickers: &[String]) -> String {
    let mut sorted: Vec<&str> = tickers.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sorted.dedup();

    let digest = Sha256::digest(sorted.join(",").as_bytes());
    hex::encode(digest)
}

/// Portfolio-level sums over the supplied holdings.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PortfolioTotals {
    pub current_value: f64,
    pub expected_value: f64,
    pub percentiles: Percentiles,
}

/// Weight each instrument's figures by share count and sum them.
///
/// Bands are summed independently, ignoring cross-asset correlation. A holding
/// without a resolved quote adds nothing to the current value; one without a
/// forecast adds nothing to the expected value or bands.
pub fn aggregate_portfolio(
    holdings: &[PortfolioHolding],
    quotes: &HashMap<String, TickerQuote>,
    forecasts: &[TickerForecast],
) -> PortfolioTotals {
    let mut totals = PortfolioTotals::default();

    for holding in holdings {
        match quotes.get(&holding.ticker) {
            Some(quote) => totals.current_value += holding.shares * quote.price,
            None => warn!("No quote for holding {}, valued at zero", holding.ticker),
        }

        if let Some(forecast) = forecasts.iter().find(|f| f.symbol == holding.ticker) {
            totals.expected_value += holding.shares * forecast.percentiles.p50;
            totals
                .percentiles
                .accumulate(&forecast.percentiles, holding.shares);
        }
    }

    totals
}

pub struct ForecastOrchestrator {
    acquirer: Arc<MarketDataAcquirer>,
    forecasts: Arc<TieredCache<String, PortfolioForecast>>,
    engine: Arc<dyn ForecastEngine>,
    history_window_days: usize,
    engine_timeout: Duration,
    request_timeout: Duration,
}

impl ForecastOrchestrator {
    pub fn new(
        config: &Config,
        acquirer: Arc<MarketDataAcquirer>,
        forecasts: Arc<TieredCache<String, PortfolioForecast>>,
        engine: Arc<dyn ForecastEngine>,
    ) -> Self {
        Self {
            acquirer,
            forecasts,
            engine,
            history_window_days: config.fetch.history_window_days,
            engine_timeout: config.engine_timeout,
            request_timeout: config.request_timeout,
        }
    }

    pub fn acquirer(&self) -> &Arc<MarketDataAcquirer> {
        &self.acquirer
    }

    pub fn forecast_cache(&self) -> &Arc<TieredCache<String, PortfolioForecast>> {
        &self.forecasts
    }

    /// Run the full pipeline for one request.
    ///
    /// Validation happens before any cache or network access. A cache hit is
    /// returned as stored with `cache_hit` set.
    ///
    /// The cache key covers the ticker set only. A hit therefore carries the
    /// portfolio totals computed for the request that populated it, even when
    /// this request's holdings differ; callers needing exact totals for new
    /// holdings should `refresh_cache` first or aggregate client-side.
    pub async fn generate_forecast(&self, request: &ForecastRequest) -> Result<PortfolioForecast> {
        let request = request.validate()?;
        let span = info_span!(
            "forecast",
            request_id = %Uuid::new_v4(),
            tickers = request.tickers.len()
        );

        async {
            let result = self.run_pipeline(&request).await;
            if let Err(ref e) = result {
                error!(stage = e.stage(), "Forecast failed: {}", e);
            }
            result
        }
        .instrument(span)
        .await
    }

    /// Quote for a single symbol through the acquirer's cache and provider race.
    pub async fn ticker_quote(&self, symbol: &str) -> Result<TickerQuote> {
        self.acquirer.fetch_quote(symbol).await
    }

    /// Drop cached forecasts, quotes and histories from both tiers.
    pub async fn refresh_cache(&self) {
        self.forecasts.clear().await;
        self.acquirer.quote_cache().clear().await;
        self.acquirer.history_cache().clear().await;
        info!("Forecast, quote and history caches cleared");
    }

    async fn run_pipeline(&self, request: &ForecastRequest) -> Result<PortfolioForecast> {
        let deadline = Instant::now() + self.request_timeout;
        let key = cache_key(&request.tickers);

        if let Some(mut cached) = self.forecasts.get(&key).await {
            info!("Serving cached forecast {}", key);
            cached.cache_hit = true;
            return Ok(cached);
        }

        let (quotes, historical_data) = timeout_at(deadline, self.acquire(&request.tickers))
            .await
            .map_err(|_| AppError::DeadlineExceeded("acquisition"))?;
        let quotes = quotes?;

        let engine_request = EngineRequest {
            tickers: request.tickers.clone(),
            current_prices: quotes
                .iter()
                .map(|(symbol, quote)| (symbol.clone(), quote.price))
                .collect(),
            historical_data,
        };
        let response = self.call_engine(engine_request, deadline).await?;

        let totals = aggregate_portfolio(&request.portfolio, &quotes, &response.forecasts);
        let forecast = PortfolioForecast {
            current_value: totals.current_value,
            expected_value: totals.expected_value,
            risk: response.risk,
            percentiles: totals.percentiles,
            tickers: response.forecasts,
            generated_at: Utc::now(),
            cache_hit: false,
        };

        self.forecasts.set(key, forecast.clone()).await;
        info!(
            "Forecast generated for {} tickers ({} priced)",
            request.tickers.len(),
            quotes.len()
        );
        Ok(forecast)
    }

    /// Quotes (bounded) and histories (one task per symbol) side by side.
    ///
    /// A symbol whose history fails is only left out of the engine request.
    async fn acquire(
        &self,
        tickers: &[String],
    ) -> (Result<HashMap<String, TickerQuote>>, HashMap<String, Vec<f64>>) {
        let history_tasks: Vec<_> = tickers
            .iter()
            .map(|symbol| {
                let acquirer = Arc::clone(&self.acquirer);
                let symbol = symbol.clone();
                let window = self.history_window_days;
                tokio::spawn(async move {
                    let result = acquirer.get_historical_series(&symbol, window).await;
                    (symbol, result)
                })
            })
            .collect();

        let (quotes, histories) = future::join(
            self.acquirer.fetch_batch(tickers),
            future::join_all(history_tasks),
        )
        .await;

        let mut historical_data = HashMap::with_capacity(histories.len());
        for joined in histories {
            match joined {
                Ok((symbol, Ok(series))) => {
                    historical_data.insert(symbol, series.closes);
                }
                Ok((symbol, Err(e))) => warn!("Excluding {} from forecast: {}", symbol, e),
                Err(e) => error!("History task aborted: {}", e),
            }
        }

        debug!(
            "Acquired {} of {} historical series",
            historical_data.len(),
            tickers.len()
        );
        (quotes, historical_data)
    }

    async fn call_engine(&self, request: EngineRequest, deadline: Instant) -> Result<EngineResponse> {
        let engine_deadline = Instant::now() + self.engine_timeout;
        let response = match timeout_at(engine_deadline.min(deadline), self.engine.forecast(request)).await {
            Ok(result) => result?,
            Err(_) if engine_deadline < deadline => {
                return Err(AppError::EngineFailure(format!(
                    "no response within {:?}",
                    self.engine_timeout
                )))
            }
            Err(_) => return Err(AppError::DeadlineExceeded("forecasting")),
        };

        if let Some(bad) = response.forecasts.iter().find(|f| !f.is_consistent()) {
            return Err(AppError::EngineFailure(format!(
                "inconsistent forecast for {}: p5={} p50={} p95={} volatility={}",
                bad.symbol,
                bad.percentiles.p5,
                bad.percentiles.p50,
                bad.percentiles.p95,
                bad.volatility
            )));
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{QuoteSource, RiskLevel};

    fn quote(symbol: &str, price: f64) -> TickerQuote {
        TickerQuote {
            symbol: symbol.to_string(),
            price,
            change: 0.0,
            change_percent: 0.0,
            volume: 0,
            last_updated: Utc::now(),
            source: QuoteSource::Yahoo,
        }
    }

    fn forecast(symbol: &str, p5: f64, p50: f64, p95: f64) -> TickerForecast {
        TickerForecast {
            symbol: symbol.to_string(),
            current_price: p50,
            percentiles: Percentiles::new(p5, p50, p95),
            volatility: 0.2,
            risk_level: RiskLevel::Low,
        }
    }

    fn holding(ticker: &str, shares: f64) -> PortfolioHolding {
        PortfolioHolding {
            ticker: ticker.to_string(),
            shares,
        }
    }

    // =========================================================================
    // Cache Key Tests
    // =========================================================================

    #[test]
    fn test_cache_key_order_independent() {
        let a = cache_key(&["AAPL".to_string(), "TSLA".to_string()]);
        let b = cache_key(&["TSLA".to_string(), "AAPL".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_cache_key_distinguishes_sets() {
        let a = cache_key(&["AAPL".to_string()]);
        let b = cache_key(&["AAPL".to_string(), "MSFT".to_string()]);
        assert_ne!(a, b);
    }

    #[test]
    fn test_cache_key_ignores_duplicates() {
        let a = cache_key(&["AAPL".to_string(), "AAPL".to_string()]);
        assert_eq!(a, cache_key(&["AAPL".to_string()]));
    }

    // =========================================================================
    // Aggregation Tests
    // =========================================================================

    #[test]
    fn test_aggregate_current_value() {
        let quotes = HashMap::from([
            ("AAPL".to_string(), quote("AAPL", 175.50)),
            ("TSLA".to_string(), quote("TSLA", 248.30)),
        ]);
        let holdings = vec![holding("AAPL", 500.0), holding("TSLA", 200.0)];

        let totals = aggregate_portfolio(&holdings, &quotes, &[]);
        assert!((totals.current_value - 137_410.0).abs() < 1e-6);
        assert_eq!(totals.expected_value, 0.0);
    }

    #[test]
    fn test_aggregate_bands_weighted_by_shares() {
        let forecasts = vec![forecast("AAPL", 90.0, 100.0, 110.0), forecast("TSLA", 180.0, 200.0, 240.0)];
        let holdings = vec![holding("AAPL", 10.0), holding("TSLA", 2.0)];

        let totals = aggregate_portfolio(&holdings, &HashMap::new(), &forecasts);
        assert_eq!(totals.expected_value, 1_400.0);
        assert_eq!(totals.percentiles, Percentiles::new(1_260.0, 1_400.0, 1_580.0));
        assert!(totals.percentiles.is_ordered());
    }

    #[test]
    fn test_aggregate_missing_quote_contributes_zero() {
        let quotes = HashMap::from([("AAPL".to_string(), quote("AAPL", 100.0))]);
        let holdings = vec![holding("AAPL", 3.0), holding("TSLA", 50.0)];

        let totals = aggregate_portfolio(&holdings, &quotes, &[]);
        assert_eq!(totals.current_value, 300.0);
    }

    #[test]
    fn test_aggregate_without_holdings_is_zero() {
        let forecasts = vec![forecast("AAPL", 90.0, 100.0, 110.0)];
        assert_eq!(
            aggregate_portfolio(&[], &HashMap::new(), &forecasts),
            PortfolioTotals::default()
        );
    }
}
