use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quote provider identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuoteSource {
    AlphaVantage,
    Yahoo,
}

impl fmt::Display for QuoteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuoteSource::AlphaVantage => write!(f, "alphavantage"),
            QuoteSource::Yahoo => write!(f, "yahoo"),
        }
    }
}

/// Current quote for a single symbol, normalized from any provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerQuote {
    pub symbol: String,
    pub price: f64,
    pub change: f64,
    pub change_percent: f64,
    pub volume: i64,
    pub last_updated: DateTime<Utc>,
    pub source: QuoteSource,
}

impl TickerQuote {
    /// A quote is usable only with a strictly positive, finite price.
    pub fn is_valid(&self) -> bool {
        self.price.is_finite() && self.price > 0.0
    }
}

/// Daily closing prices for a symbol, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalSeries {
    pub symbol: String,
    pub closes: Vec<f64>,
}

impl HistoricalSeries {
    /// Build a series keeping only the most recent `window` positive closes.
    pub fn from_closes(symbol: impl Into<String>, closes: Vec<f64>, window: usize) -> Self {
        let mut closes: Vec<f64> = closes
            .into_iter()
            .filter(|c| c.is_finite() && *c > 0.0)
            .collect();
        if closes.len() > window {
            closes.drain(..closes.len() - window);
        }
        Self {
            symbol: symbol.into(),
            closes,
        }
    }

    pub fn len(&self) -> usize {
        self.closes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.closes.is_empty()
    }
}
