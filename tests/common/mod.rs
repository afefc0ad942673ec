//! Stub collaborators shared by the integration tests.

#![allow(dead_code)]

use chrono::Utc;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use pfc::config::{Config, FetchConfig};
use pfc::error::{AppError, Result};
use pfc::services::{
    DurableTier, ForecastOrchestrator, MarketDataAcquirer, Providers, StoredDocument, TieredCache,
    FORECAST_NAMESPACE, HISTORY_NAMESPACE, QUOTE_NAMESPACE,
};
use pfc::sources::{ForecastEngine, HistoryProvider, QuoteProvider};
use pfc::types::{
    EngineRequest, EngineResponse, Percentiles, QuoteSource, RiskLevel, TickerForecast,
    TickerQuote,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// =============================================================================
// Quote Provider
// =============================================================================

/// Decrements the in-flight gauge even when the losing side of a race is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Quote provider answering from a fixed price table. Unknown symbols fail.
pub struct StubQuoteProvider {
    source: QuoteSource,
    prices: HashMap<String, f64>,
    panics_on: HashSet<String>,
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl StubQuoteProvider {
    pub fn new(source: QuoteSource) -> Self {
        Self {
            source,
            prices: HashMap::new(),
            panics_on: HashSet::new(),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn with_price(mut self, symbol: &str, price: f64) -> Self {
        self.prices.insert(symbol.to_string(), price);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Panic instead of answering for `symbol`, taking down the calling task.
    pub fn with_panic(mut self, symbol: &str) -> Self {
        self.panics_on.insert(symbol.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl QuoteProvider for StubQuoteProvider {
    fn source(&self) -> QuoteSource {
        self.source
    }

    fn fetch_quote<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, Result<TickerQuote>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let _guard = InFlight(&self.in_flight);

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            if self.panics_on.contains(symbol) {
                panic!("stub provider crashed on {}", symbol);
            }

            match self.prices.get(symbol) {
                Some(&price) => Ok(quote(symbol, price, self.source)),
                None => Err(AppError::ProviderUnavailable {
                    provider: self.source,
                    message: format!("no stub price for {}", symbol),
                }),
            }
        }
        .boxed()
    }
}

pub fn quote(symbol: &str, price: f64, source: QuoteSource) -> TickerQuote {
    TickerQuote {
        symbol: symbol.to_string(),
        price,
        change: 0.0,
        change_percent: 0.0,
        volume: 1_000,
        last_updated: Utc::now(),
        source,
    }
}

// =============================================================================
// History Provider
// =============================================================================

pub struct StubHistoryProvider {
    closes: HashMap<String, Vec<f64>>,
    calls: AtomicUsize,
}

impl StubHistoryProvider {
    pub fn new() -> Self {
        Self {
            closes: HashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_closes(mut self, symbol: &str, closes: Vec<f64>) -> Self {
        self.closes.insert(symbol.to_string(), closes);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HistoryProvider for StubHistoryProvider {
    fn source(&self) -> QuoteSource {
        QuoteSource::Yahoo
    }

    fn fetch_closes<'a>(
        &'a self,
        symbol: &'a str,
        _window_days: usize,
    ) -> BoxFuture<'a, Result<Vec<f64>>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.closes
                .get(symbol)
                .cloned()
                .ok_or_else(|| AppError::ProviderUnavailable {
                    provider: QuoteSource::Yahoo,
                    message: format!("no stub history for {}", symbol),
                })
        }
        .boxed()
    }
}

// =============================================================================
// Forecast Engine
// =============================================================================

pub enum EngineMode {
    /// Bands at 90% / 100% / 110% of the last close, or of 100.0 without history.
    Bands,
    Fail,
    /// Returns p5 above p50 for every ticker.
    Inconsistent,
    /// Panics inside the request handler.
    Panic,
}

pub struct StubEngine {
    mode: EngineMode,
    delay: Duration,
    calls: AtomicUsize,
    last_request: Mutex<Option<EngineRequest>>,
}

impl StubEngine {
    pub fn new(mode: EngineMode) -> Self {
        Self {
            mode,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<EngineRequest> {
        self.last_request.lock().unwrap().clone()
    }

    fn respond(&self, request: &EngineRequest) -> Result<EngineResponse> {
        let forecasts = request
            .tickers
            .iter()
            .map(|symbol| {
                let base = request
                    .historical_data
                    .get(symbol)
                    .and_then(|closes| closes.last().copied())
                    .unwrap_or(100.0);
                let percentiles = match self.mode {
                    EngineMode::Inconsistent => Percentiles::new(base * 1.2, base, base * 1.1),
                    _ => Percentiles::new(base * 0.9, base, base * 1.1),
                };
                TickerForecast {
                    symbol: symbol.clone(),
                    current_price: base,
                    percentiles,
                    volatility: 0.25,
                    risk_level: RiskLevel::Moderate,
                }
            })
            .collect();

        Ok(EngineResponse {
            forecasts,
            risk: RiskLevel::Moderate,
        })
    }
}

impl ForecastEngine for StubEngine {
    fn forecast(&self, request: EngineRequest) -> BoxFuture<'_, Result<EngineResponse>> {
        async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());

            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            match self.mode {
                EngineMode::Fail => Err(AppError::EngineFailure(
                    "engine returned 503: unavailable".to_string(),
                )),
                EngineMode::Panic => panic!("stub engine crashed"),
                _ => self.respond(&request),
            }
        }
        .boxed()
    }
}

// =============================================================================
// Durable Tier
// =============================================================================

/// In-memory durable tier. Can be switched into a failing mode.
#[derive(Default)]
pub struct MemoryDurableTier {
    documents: DashMap<String, StoredDocument>,
    failing: AtomicBool,
    stores: AtomicUsize,
}

impl MemoryDurableTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stores(&self) -> usize {
        self.stores.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Seed a document directly, e.g. with an old `stored_at`.
    pub fn insert(&self, namespace: &str, key: &str, document: StoredDocument) {
        self.documents.insert(format!("{}:{}", namespace, key), document);
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AppError::Internal("durable tier unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl DurableTier for MemoryDurableTier {
    fn load<'a>(
        &'a self,
        namespace: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<StoredDocument>>> {
        async move {
            self.check()?;
            Ok(self
                .documents
                .get(&format!("{}:{}", namespace, key))
                .map(|doc| doc.value().clone()))
        }
        .boxed()
    }

    fn store<'a>(
        &'a self,
        namespace: &'a str,
        key: &'a str,
        document: StoredDocument,
        _ttl: Duration,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            self.check()?;
            self.stores.fetch_add(1, Ordering::SeqCst);
            self.documents.insert(format!("{}:{}", namespace, key), document);
            Ok(())
        }
        .boxed()
    }

    fn purge<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, Result<usize>> {
        async move {
            self.check()?;
            let prefix = format!("{}:", namespace);
            let before = self.documents.len();
            self.documents.retain(|key, _| !key.starts_with(&prefix));
            Ok(before - self.documents.len())
        }
        .boxed()
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        async move { self.check() }.boxed()
    }
}

// =============================================================================
// Wiring
// =============================================================================

pub fn test_config() -> Config {
    Config {
        forecast_engine_url: Some("http://engine.test".to_string()),
        fetch: FetchConfig {
            max_concurrent_fetches: 4,
            quote_timeout: Duration::from_millis(500),
            history_timeout: Duration::from_millis(500),
            history_window_days: 30,
        },
        engine_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(5),
        ..Config::default()
    }
}

pub struct Harness {
    pub config: Arc<Config>,
    pub primary: Arc<StubQuoteProvider>,
    pub secondary: Arc<StubQuoteProvider>,
    pub history: Arc<StubHistoryProvider>,
    pub engine: Arc<StubEngine>,
    pub durable: Arc<MemoryDurableTier>,
    pub acquirer: Arc<MarketDataAcquirer>,
    pub orchestrator: Arc<ForecastOrchestrator>,
}

impl Harness {
    pub fn new(
        config: Config,
        primary: StubQuoteProvider,
        secondary: StubQuoteProvider,
        history: StubHistoryProvider,
        engine: StubEngine,
    ) -> Self {
        let config = Arc::new(config);
        let primary = Arc::new(primary);
        let secondary = Arc::new(secondary);
        let history = Arc::new(history);
        let engine = Arc::new(engine);
        let durable = Arc::new(MemoryDurableTier::new());
        let tier: Arc<dyn DurableTier> = durable.clone();

        let quotes = Arc::new(TieredCache::new(
            QUOTE_NAMESPACE,
            config.cache.quote_ttl,
            Some(tier.clone()),
        ));
        let histories = Arc::new(TieredCache::new(
            HISTORY_NAMESPACE,
            config.cache.history_ttl,
            Some(tier.clone()),
        ));
        let forecasts = Arc::new(TieredCache::new(
            FORECAST_NAMESPACE,
            config.cache.forecast_ttl,
            Some(tier),
        ));

        let acquirer = Arc::new(MarketDataAcquirer::new(
            &config.fetch,
            quotes,
            histories,
            Providers {
                primary: primary.clone(),
                secondary: secondary.clone(),
                history: history.clone(),
            },
        ));
        let orchestrator = Arc::new(ForecastOrchestrator::new(
            &config,
            acquirer.clone(),
            forecasts,
            engine.clone(),
        ));

        Self {
            config,
            primary,
            secondary,
            history,
            engine,
            durable,
            acquirer,
            orchestrator,
        }
    }

    /// AAPL @ 175.50 and TSLA @ 248.30 on both providers, with histories.
    pub fn standard() -> Self {
        Self::new(
            test_config(),
            StubQuoteProvider::new(QuoteSource::AlphaVantage)
                .with_price("AAPL", 175.50)
                .with_price("TSLA", 248.30),
            StubQuoteProvider::new(QuoteSource::Yahoo)
                .with_price("AAPL", 175.50)
                .with_price("TSLA", 248.30),
            standard_history(),
            StubEngine::new(EngineMode::Bands),
        )
    }
}

pub fn standard_history() -> StubHistoryProvider {
    StubHistoryProvider::new()
        .with_closes("AAPL", vec![170.0, 172.5, 175.5])
        .with_closes("TSLA", vec![240.0, 245.0, 248.3])
}

pub fn tickers(symbols: &[&str]) -> Vec<String> {
    symbols.iter().map(|s| s.to_string()).collect()
}
