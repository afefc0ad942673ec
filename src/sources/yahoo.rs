//! Yahoo Finance chart API client.
//!
//! Serves as the secondary live quote provider and as the history provider.
//! Uses the unofficial chart endpoint, which needs no API key.

use crate::error::{AppError, Result};
use crate::sources::{HistoryProvider, QuoteProvider};
use crate::types::{QuoteSource, TickerQuote};
use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const YAHOO_CHART_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance chart response.
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    meta: YahooMeta,
    #[serde(default)]
    indicators: Option<YahooIndicators>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooMeta {
    regular_market_price: Option<f64>,
    previous_close: Option<f64>,
    chart_previous_close: Option<f64>,
    regular_market_volume: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    close: Option<Vec<Option<f64>>>,
}

/// Yahoo uses hyphens instead of dots for share classes (BRK-B, not BRK.B).
fn normalize_yahoo_symbol(symbol: &str) -> String {
    symbol.to_uppercase().replace('.', "-")
}

fn unavailable(message: impl Into<String>) -> AppError {
    AppError::ProviderUnavailable {
        provider: QuoteSource::Yahoo,
        message: message.into(),
    }
}

/// Unwrap the first chart result, surfacing Yahoo's own error payload.
fn first_result(data: YahooChartResponse) -> Result<YahooResult> {
    if let Some(error) = data.chart.error {
        return Err(unavailable(format!("{} - {}", error.code, error.description)));
    }

    data.chart
        .result
        .and_then(|results| results.into_iter().next())
        .ok_or_else(|| unavailable("no chart result"))
}

fn quote_from_result(symbol: &str, result: YahooResult) -> Result<TickerQuote> {
    let meta = result.meta;
    let price = meta
        .regular_market_price
        .ok_or_else(|| unavailable(format!("no market price for {}", symbol)))?;
    let previous_close = meta
        .previous_close
        .or(meta.chart_previous_close)
        .unwrap_or(0.0);

    let (change, change_percent) = if previous_close > 0.0 {
        let change = price - previous_close;
        (change, change / previous_close * 100.0)
    } else {
        (0.0, 0.0)
    };

    Ok(TickerQuote {
        symbol: symbol.to_string(),
        price,
        change,
        change_percent,
        volume: meta.regular_market_volume.unwrap_or(0),
        last_updated: Utc::now(),
        source: QuoteSource::Yahoo,
    })
}

/// Daily closes with gaps and non-positive values removed, oldest first.
fn closes_from_result(symbol: &str, result: YahooResult, window: usize) -> Result<Vec<f64>> {
    let closes: Vec<f64> = result
        .indicators
        .and_then(|indicators| indicators.quote.into_iter().next())
        .and_then(|quote| quote.close)
        .unwrap_or_default()
        .into_iter()
        .flatten()
        .filter(|close| close.is_finite() && *close > 0.0)
        .collect();

    if closes.is_empty() {
        return Err(unavailable(format!("no closing prices for {}", symbol)));
    }

    let skip = closes.len().saturating_sub(window);
    Ok(closes.into_iter().skip(skip).collect())
}

/// Yahoo Finance API client.
pub struct YahooFinanceClient {
    client: Client,
    base_url: String,
}

impl YahooFinanceClient {
    /// Create a new Yahoo Finance client.
    pub fn new() -> Self {
        Self::with_base_url(YAHOO_CHART_URL)
    }

    /// Point the client at a different chart endpoint.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Fetch a chart for a symbol.
    ///
    /// - range: `1d`, `5d`, `30d`, `1mo`, `1y`, ...
    /// - interval: `1d` for daily bars
    async fn get_chart(&self, symbol: &str, range: &str, interval: &str) -> Result<YahooResult> {
        let url = format!(
            "{}/{}?range={}&interval={}&includePrePost=false",
            self.base_url,
            normalize_yahoo_symbol(symbol),
            range,
            interval
        );

        debug!("Fetching Yahoo Finance chart: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(unavailable(format!("API error: {}", response.status())));
        }

        let data: YahooChartResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("parse error: {}", e)))?;

        first_result(data)
    }

    /// Current quote from today's chart metadata.
    pub async fn get_quote(&self, symbol: &str) -> Result<TickerQuote> {
        let result = self.get_chart(symbol, "1d", "1d").await?;
        quote_from_result(symbol, result)
    }

    /// The most recent `window` daily closes.
    pub async fn get_daily_closes(&self, symbol: &str, window: usize) -> Result<Vec<f64>> {
        let range = format!("{}d", window.max(1));
        let result = self.get_chart(symbol, &range, "1d").await?;
        closes_from_result(symbol, result, window)
    }
}

impl Default for YahooFinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteProvider for YahooFinanceClient {
    fn source(&self) -> QuoteSource {
        QuoteSource::Yahoo
    }

    fn fetch_quote<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, Result<TickerQuote>> {
        self.get_quote(symbol).boxed()
    }
}

impl HistoryProvider for YahooFinanceClient {
    fn source(&self) -> QuoteSource {
        QuoteSource::Yahoo
    }

    fn fetch_closes<'a>(
        &'a self,
        symbol: &'a str,
        window_days: usize,
    ) -> BoxFuture<'a, Result<Vec<f64>>> {
        self.get_daily_closes(symbol, window_days).boxed()
    }
}
