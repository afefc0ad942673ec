//! Alpha Vantage API client, the primary live quote provider.
//!
//! Free tier has very limited rate limits (25 requests/day, 5/minute), which
//! is why every quote is raced against Yahoo rather than retried.

use crate::error::{AppError, Result};
use crate::sources::QuoteProvider;
use crate::types::{QuoteSource, TickerQuote};
use chrono::Utc;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

const ALPHA_VANTAGE_URL: &str = "https://www.alphavantage.co/query";

/// Alpha Vantage global quote response.
#[derive(Debug, Clone, Deserialize)]
struct GlobalQuoteResponse {
    #[serde(rename = "Global Quote")]
    global_quote: Option<GlobalQuote>,
}

/// Global quote data. Every numeric field arrives as a string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: String,
    #[serde(rename = "05. price")]
    price: String,
    #[serde(rename = "06. volume")]
    volume: String,
    #[serde(rename = "09. change")]
    change: String,
    #[serde(rename = "10. change percent")]
    change_percent: String,
}

fn unavailable(message: impl Into<String>) -> AppError {
    AppError::ProviderUnavailable {
        provider: QuoteSource::AlphaVantage,
        message: message.into(),
    }
}

/// Parse a numeric field, treating anything unparseable as zero.
fn parse_number(s: &str) -> f64 {
    s.trim().parse().unwrap_or(0.0)
}

/// Parse change percent string (e.g., "1.23%" -> 1.23).
fn parse_change_percent(s: &str) -> f64 {
    parse_number(s.trim().trim_end_matches('%'))
}

fn quote_from_global(symbol: &str, data: GlobalQuoteResponse) -> Result<TickerQuote> {
    let quote = data
        .global_quote
        .filter(|q| !q.symbol.trim().is_empty())
        .ok_or_else(|| unavailable(format!("no quote data for {}", symbol)))?;

    Ok(TickerQuote {
        symbol: symbol.to_string(),
        price: parse_number(&quote.price),
        change: parse_number(&quote.change),
        change_percent: parse_change_percent(&quote.change_percent),
        volume: quote.volume.trim().parse().unwrap_or(0),
        last_updated: Utc::now(),
        source: QuoteSource::AlphaVantage,
    })
}

/// Alpha Vantage API client.
pub struct AlphaVantageClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl AlphaVantageClient {
    /// Create a new client. Without a key every request fails immediately.
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: ALPHA_VANTAGE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Get global quote for a symbol.
    pub async fn get_quote(&self, symbol: &str) -> Result<TickerQuote> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| unavailable("not configured"))?;

        let url = format!(
            "{}?function=GLOBAL_QUOTE&symbol={}&apikey={}",
            self.base_url, symbol, api_key
        );

        debug!("Fetching Alpha Vantage quote for {}", symbol);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| unavailable(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(unavailable(format!("API error: {}", response.status())));
        }

        let data: GlobalQuoteResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("parse error: {}", e)))?;

        quote_from_global(symbol, data)
    }
}

impl QuoteProvider for AlphaVantageClient {
    fn source(&self) -> QuoteSource {
        QuoteSource::AlphaVantage
    }

    fn fetch_quote<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, Result<TickerQuote>> {
        self.get_quote(symbol).boxed()
    }
}
