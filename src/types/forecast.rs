use crate::error::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{HashMap, HashSet};

/// Maximum number of tickers accepted in one forecast request.
pub const MAX_TICKERS: usize = 50;

/// A single holding in the caller's portfolio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioHolding {
    pub ticker: String,
    pub shares: f64,
}

/// Inbound forecast request, as produced by the page extractor or any API client.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ForecastRequest {
    pub tickers: Vec<String>,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub portfolio: Vec<PortfolioHolding>,
}

/// `"portfolio": null` means no holdings, same as omitting the field.
fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<PortfolioHolding>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<PortfolioHolding>>::deserialize(deserializer)?.unwrap_or_default())
}

impl ForecastRequest {
    pub fn new(tickers: Vec<String>) -> Self {
        Self {
            tickers,
            portfolio: Vec::new(),
        }
    }

    pub fn with_portfolio(mut self, portfolio: Vec<PortfolioHolding>) -> Self {
        self.portfolio = portfolio;
        self
    }

    /// Validate bounds and return a normalized copy.
    ///
    /// Tickers are trimmed, upper-cased and de-duplicated (first occurrence wins).
    /// The 1..=50 bound applies to the list as submitted.
    pub fn validate(&self) -> Result<ForecastRequest> {
        if self.tickers.is_empty() {
            return Err(AppError::Validation(
                "at least one ticker symbol is required".to_string(),
            ));
        }
        if self.tickers.len() > MAX_TICKERS {
            return Err(AppError::Validation(format!(
                "maximum {} tickers allowed per request, got {}",
                MAX_TICKERS,
                self.tickers.len()
            )));
        }

        let mut seen = HashSet::new();
        let mut tickers = Vec::with_capacity(self.tickers.len());
        for raw in &self.tickers {
            let symbol = normalize_symbol(raw)?;
            if seen.insert(symbol.clone()) {
                tickers.push(symbol);
            }
        }

        let mut portfolio = Vec::with_capacity(self.portfolio.len());
        for holding in &self.portfolio {
            let ticker = normalize_symbol(&holding.ticker)?;
            if !holding.shares.is_finite() || holding.shares <= 0.0 {
                return Err(AppError::Validation(format!(
                    "shares for {} must be greater than zero",
                    ticker
                )));
            }
            portfolio.push(PortfolioHolding {
                ticker,
                shares: holding.shares,
            });
        }

        Ok(ForecastRequest { tickers, portfolio })
    }
}

/// Trim and upper-case a symbol, rejecting anything that is not a plain ticker.
pub fn normalize_symbol(raw: &str) -> Result<String> {
    let symbol = raw.trim().to_ascii_uppercase();
    if is_valid_symbol(&symbol) {
        Ok(symbol)
    } else {
        Err(AppError::Validation(format!("invalid ticker symbol: {:?}", raw)))
    }
}

/// 1-5 uppercase letters, optionally followed by a share-class suffix (`BRK.B`, `BRK-B`).
pub fn is_valid_symbol(symbol: &str) -> bool {
    let (base, class) = match symbol.find(['.', '-']) {
        Some(idx) => (&symbol[..idx], Some(&symbol[idx + 1..])),
        None => (symbol, None),
    };
    let base_ok = (1..=5).contains(&base.len()) && base.bytes().all(|b| b.is_ascii_uppercase());
    let class_ok = class.map_or(true, |c| c.len() == 1 && c.bytes().all(|b| b.is_ascii_uppercase()));
    base_ok && class_ok
}

/// Worst-case / median / best-case projections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p5: f64,
    pub p50: f64,
    pub p95: f64,
}

impl Percentiles {
    pub fn new(p5: f64, p50: f64, p95: f64) -> Self {
        Self { p5, p50, p95 }
    }

    /// True when all bands are finite and p5 <= p50 <= p95.
    pub fn is_ordered(&self) -> bool {
        [self.p5, self.p50, self.p95].iter().all(|v| v.is_finite())
            && self.p5 <= self.p50
            && self.p50 <= self.p95
    }

    /// Add `weight` times `other` to every band.
    pub fn accumulate(&mut self, other: &Percentiles, weight: f64) {
        self.p5 += weight * other.p5;
        self.p50 += weight * other.p50;
        self.p95 += weight * other.p95;
    }
}

/// Risk classification. The engine reports traffic-light colours, accepted as aliases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    #[serde(alias = "green")]
    Low,
    #[serde(alias = "yellow")]
    Moderate,
    #[serde(alias = "red")]
    High,
}

/// Per-instrument forecast returned by the forecasting engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TickerForecast {
    pub symbol: String,
    pub current_price: f64,
    #[serde(rename = "forecast")]
    pub percentiles: Percentiles,
    pub volatility: f64,
    #[serde(rename = "risk")]
    pub risk_level: RiskLevel,
}

impl TickerForecast {
    /// Ordered bands and a finite, non-negative volatility.
    pub fn is_consistent(&self) -> bool {
        self.percentiles.is_ordered() && self.volatility.is_finite() && self.volatility >= 0.0
    }
}

/// Portfolio-level forecast produced by one orchestration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioForecast {
    pub current_value: f64,
    pub expected_value: f64,
    pub risk: RiskLevel,
    pub percentiles: Percentiles,
    pub tickers: Vec<TickerForecast>,
    pub generated_at: DateTime<Utc>,
    pub cache_hit: bool,
}

/// Request body sent to the forecasting engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineRequest {
    pub tickers: Vec<String>,
    #[serde(default)]
    pub current_prices: HashMap<String, f64>,
    pub historical_data: HashMap<String, Vec<f64>>,
}

/// Response body returned by the forecasting engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineResponse {
    pub forecasts: Vec<TickerForecast>,
    pub risk: RiskLevel,
}
