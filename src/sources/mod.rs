//! External collaborators: quote providers, the history provider and the
//! forecasting engine client.

pub mod alphavantage;
pub mod forecast_engine;
pub mod yahoo;

pub use alphavantage::AlphaVantageClient;
pub use forecast_engine::{ForecastEngine, HttpForecastEngine};
pub use yahoo::YahooFinanceClient;

use crate::error::Result;
use crate::types::{QuoteSource, TickerQuote};
use futures_util::future::BoxFuture;

/// A live quote source. Implementations do their own HTTP and field parsing.
pub trait QuoteProvider: Send + Sync {
    fn source(&self) -> QuoteSource;

    fn fetch_quote<'a>(&'a self, symbol: &'a str) -> BoxFuture<'a, Result<TickerQuote>>;
}

/// Daily closing prices, oldest first.
pub trait HistoryProvider: Send + Sync {
    fn source(&self) -> QuoteSource;

    fn fetch_closes<'a>(&'a self, symbol: &'a str, window_days: usize)
        -> BoxFuture<'a, Result<Vec<f64>>>;
}
