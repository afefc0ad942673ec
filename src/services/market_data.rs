//! Market data acquisition: bounded-concurrency batch quote fetching with
//! dual-provider failover, plus single-provider historical series.

use crate::config::FetchConfig;
use crate::error::{AppError, Result};
use crate::services::tiered_cache::TieredCache;
use crate::sources::{HistoryProvider, QuoteProvider};
use crate::types::{normalize_symbol, HistoricalSeries, TickerQuote};
use futures_util::future::{self, BoxFuture, Either};
use futures_util::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

/// Logical cache namespaces used by the acquirer.
pub const QUOTE_NAMESPACE: &str = "quotes";
pub const HISTORY_NAMESPACE: &str = "history";

/// The external collaborators the acquirer pulls from.
#[derive(Clone)]
pub struct Providers {
    pub primary: Arc<dyn QuoteProvider>,
    pub secondary: Arc<dyn QuoteProvider>,
    pub history: Arc<dyn HistoryProvider>,
}

pub struct MarketDataAcquirer {
    quotes: Arc<TieredCache<String, TickerQuote>>,
    histories: Arc<TieredCache<String, HistoricalSeries>>,
    providers: Providers,
    permits: Arc<Semaphore>,
    quote_timeout: Duration,
    history_timeout: Duration,
}

impl MarketDataAcquirer {
    pub fn new(
        config: &FetchConfig,
        quotes: Arc<TieredCache<String, TickerQuote>>,
        histories: Arc<TieredCache<String, HistoricalSeries>>,
        providers: Providers,
    ) -> Self {
        Self {
            quotes,
            histories,
            providers,
            permits: Arc::new(Semaphore::new(config.max_concurrent_fetches.max(1))),
            quote_timeout: config.quote_timeout,
            history_timeout: config.history_timeout,
        }
    }

    pub fn quote_cache(&self) -> &Arc<TieredCache<String, TickerQuote>> {
        &self.quotes
    }

    pub fn history_cache(&self) -> &Arc<TieredCache<String, HistoricalSeries>> {
        &self.histories
    }

    /// Permits currently free in the quote pool.
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }

    /// Fetch quotes for a batch of symbols.
    ///
    /// Each symbol runs as its own task and holds a permit for the duration of
    /// its cache check and provider race. Symbols that fail on both providers
    /// are left out of the result; the batch only fails when nothing resolves.
    pub async fn fetch_batch(
        self: &Arc<Self>,
        symbols: &[String],
    ) -> Result<HashMap<String, TickerQuote>> {
        let mut seen = HashSet::new();
        let unique: Vec<String> = symbols
            .iter()
            .filter(|symbol| seen.insert(symbol.as_str()))
            .cloned()
            .collect();

        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let handles = unique.iter().map(|symbol| {
            let acquirer = Arc::clone(self);
            let symbol = symbol.clone();
            tokio::spawn(async move { acquirer.acquire_quote(&symbol).await })
        });
        let results = future::join_all(handles).await;

        let mut quotes = HashMap::with_capacity(unique.len());
        let mut failed = Vec::new();

        for (symbol, joined) in unique.into_iter().zip(results) {
            match joined {
                Ok(Ok(quote)) => {
                    quotes.insert(symbol, quote);
                }
                Ok(Err(e)) => {
                    warn!("Quote unavailable for {}: {}", symbol, e);
                    failed.push(symbol);
                }
                Err(e) => {
                    error!("Quote task for {} aborted: {}", symbol, e);
                    failed.push(symbol);
                }
            }
        }

        if quotes.is_empty() {
            return Err(AppError::AllSourcesFailed(format!(
                "no quotes resolved for {}",
                failed.join(", ")
            )));
        }

        debug!(
            "Resolved {} quotes ({} unavailable)",
            quotes.len(),
            failed.len()
        );
        Ok(quotes)
    }

    /// Fetch a single quote, normalizing the symbol first.
    pub async fn fetch_quote(&self, symbol: &str) -> Result<TickerQuote> {
        let symbol = normalize_symbol(symbol)?;
        self.acquire_quote(&symbol).await
    }

    /// Daily closes for one symbol from the history provider. No failover.
    pub async fn get_historical_series(
        &self,
        symbol: &str,
        window_days: usize,
    ) -> Result<HistoricalSeries> {
        let key = format!("{}:{}", symbol, window_days);
        if let Some(series) = self.histories.get(&key).await {
            return Ok(series);
        }

        let provider = self.providers.history.as_ref();
        let closes = tokio::time::timeout(
            self.history_timeout,
            provider.fetch_closes(symbol, window_days),
        )
        .await
        .map_err(|_| AppError::ProviderUnavailable {
            provider: provider.source(),
            message: format!("history for {} timed out after {:?}", symbol, self.history_timeout),
        })??;

        let series = HistoricalSeries::from_closes(symbol, closes, window_days);
        if series.is_empty() {
            return Err(AppError::ProviderUnavailable {
                provider: provider.source(),
                message: format!("empty history for {}", symbol),
            });
        }

        self.histories.set(key, series.clone()).await;
        Ok(series)
    }

    async fn acquire_quote(&self, symbol: &str) -> Result<TickerQuote> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AppError::Internal("quote permit pool closed".to_string()))?;

        let key = symbol.to_string();
        if let Some(quote) = self.quotes.get(&key).await {
            return Ok(quote);
        }

        let quote = self.race_providers(symbol).await?;
        debug!("{} quote for {} at {}", quote.source, symbol, quote.price);
        self.quotes.set(key, quote.clone()).await;
        Ok(quote)
    }

    /// First success wins; if the first to finish failed, wait for the other.
    async fn race_providers(&self, symbol: &str) -> Result<TickerQuote> {
        let primary = self.guarded_fetch(self.providers.primary.as_ref(), symbol);
        let secondary = self.guarded_fetch(self.providers.secondary.as_ref(), symbol);

        let (first_err, remaining) = match future::select(primary, secondary).await {
            Either::Left((Ok(quote), _)) | Either::Right((Ok(quote), _)) => return Ok(quote),
            Either::Left((Err(e), pending)) | Either::Right((Err(e), pending)) => (e, pending),
        };

        remaining.await.map_err(|second_err| {
            AppError::AllSourcesFailed(format!("{}: {}; {}", symbol, first_err, second_err))
        })
    }

    /// One provider call under the quote timeout. Non-positive prices count as failures.
    fn guarded_fetch<'a>(
        &self,
        provider: &'a dyn QuoteProvider,
        symbol: &'a str,
    ) -> BoxFuture<'a, Result<TickerQuote>> {
        let timeout = self.quote_timeout;
        async move {
            let source = provider.source();
            let quote = tokio::time::timeout(timeout, provider.fetch_quote(symbol))
                .await
                .map_err(|_| AppError::ProviderUnavailable {
                    provider: source,
                    message: format!("timed out after {:?}", timeout),
                })??;

            if !quote.is_valid() {
                return Err(AppError::ProviderUnavailable {
                    provider: source,
                    message: format!("invalid price {} for {}", quote.price, symbol),
                });
            }

            Ok(quote)
        }
        .boxed()
    }
}
