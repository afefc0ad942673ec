pub mod cache;
pub mod market_data;
pub mod orchestrator;
pub mod redis_store;
pub mod tiered_cache;

pub use cache::LocalCache;
pub use market_data::{MarketDataAcquirer, Providers, HISTORY_NAMESPACE, QUOTE_NAMESPACE};
pub use orchestrator::{aggregate_portfolio, cache_key, ForecastOrchestrator, PortfolioTotals, FORECAST_NAMESPACE};
pub use redis_store::{DurableTier, RedisStore, StoredDocument};
pub use tiered_cache::TieredCache;
