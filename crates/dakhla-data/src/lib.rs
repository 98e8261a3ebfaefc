//! Tiered point-in-time market data retrieval for the Dakhla engine.
//!
//! Resolution order for any `(ticker, kind, as_of)` request:
//!
//! 1. **Historical store** — per-ticker parquet files holding the full
//!    adjusted price history.
//! 2. **Consolidated cache** — one JSON blob per ticker aggregating prices
//!    and fundamentals, valid while younger than its TTL.
//! 3. **Live source** — an abstract [`PriceSource`] / [`FundamentalsSource`]
//!    implementation, invoked on miss and written back to the cache.
//!
//! Outbound calls run through a shared token-bucket [`RateLimiter`] and a
//! [`retry`] wrapper with exponential backoff. All services are constructed
//! at startup and injected; there is no process-wide mutable state.
//!
//! [`PriceSource`]: dakhla_traits::PriceSource
//! [`FundamentalsSource`]: dakhla_traits::FundamentalsSource

pub mod cache;
pub mod fmp;
pub mod historical;
mod lists;
pub mod rate_limit;
pub mod retry;
pub mod static_source;
pub mod universe;

pub use cache::{CacheSettings, ConsolidatedBlob, DataCache};
pub use fmp::FmpSource;
pub use historical::HistoricalStore;
pub use rate_limit::RateLimiter;
pub use retry::{retry, RetryPolicy};
pub use static_source::StaticSource;
pub use universe::UniverseProvider;
