#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! # dakhla
//!
//! Systematic quantitative portfolio construction: academic multi-factor
//! scoring (Value / Quality / Momentum) fed as Bayesian views into a
//! Black-Litterman mean-variance optimizer, with walk-forward backtesting
//! under strict no-look-ahead semantics.
//!
//! This umbrella crate re-exports the workspace's sub-crates:
//!
//! - [`traits`] — core types, errors, configuration, source traits
//! - [`data`] — tiered point-in-time cache, universes, live sources
//! - [`factors`] — cross-sectional factor scoring pinned to a cutoff
//! - [`optimizer`] — Black-Litterman posterior and constrained allocation
//! - [`backtest`] — the walk-forward rebalance driver
//!
//! ## One rebalance, end to end
//!
//! ```ignore
//! use std::sync::Arc;
//! use dakhla::prelude::*;
//! use dakhla::data::{CacheSettings, DataCache, FmpSource, RateLimiter, UniverseProvider};
//! use dakhla::factors::FactorEngine;
//! use dakhla::optimizer::{BlackLittermanOptimizer, Objective};
//!
//! # async fn run() -> Result<()> {
//! let config = EngineConfig::default().validated()?;
//! let source = Arc::new(FmpSource::from_env()?);
//! let cache = Arc::new(DataCache::open(
//!     "data",
//!     source.clone(),
//!     source,
//!     Arc::new(RateLimiter::per_minute(config.rate_limit_per_min)),
//!     CacheSettings::from_config(&config),
//! )?);
//!
//! let as_of = chrono::Utc::now().date_naive();
//! let provider = UniverseProvider::new(Arc::clone(&cache));
//! let universe = provider.load(UniverseName::Sp500, as_of).await?;
//! let tickers: Vec<_> = universe.iter().map(|e| e.ticker.clone()).collect();
//!
//! let scores = FactorEngine::new(tickers, as_of, Arc::clone(&cache), config.clone())?
//!     .compute()
//!     .await?;
//! # Ok(())
//! # }
//! ```

/// Version information for the dakhla crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core types, errors, configuration, and source traits.
pub mod traits {
    pub use dakhla_traits::*;
}

/// Tiered point-in-time data cache, universes, and market data sources.
pub mod data {
    pub use dakhla_data::*;
}

/// Cross-sectional multi-factor scoring.
pub mod factors {
    pub use dakhla_factors::*;
}

/// Black-Litterman posterior and constrained mean-variance allocation.
pub mod optimizer {
    pub use dakhla_optimizer::*;
}

/// Walk-forward backtesting.
pub mod backtest {
    pub use dakhla_backtest::*;
}

// Re-export the most common types at the top level
pub use dakhla_backtest::{BacktestConfig, BacktestEngine, BacktestResult};
pub use dakhla_data::DataCache;
pub use dakhla_factors::{FactorEngine, FactorScores, ScoreSet};
pub use dakhla_optimizer::{AllocationResult, BlackLittermanOptimizer, Objective};
pub use dakhla_traits::{DakhlaError, Date, EngineConfig, Result, Ticker, UniverseName};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use dakhla_traits::{
        DakhlaError, Date, EngineConfig, FactorWeights, FundamentalsSnapshot, PriceBar, Result,
        Ticker, UniverseEntry, UniverseName,
    };

    pub use dakhla_data::{DataCache, UniverseProvider};
    pub use dakhla_factors::{FactorEngine, ScoreSet};
    pub use dakhla_optimizer::{AllocationResult, BlackLittermanOptimizer, Objective};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
        assert!(VERSION.contains('.'));
    }

    #[test]
    fn test_re_exports_compile() {
        fn _takes_config(_: &EngineConfig) {}
        fn _takes_error(_: &DakhlaError) {}
        let _result: Result<()> = Ok(());
    }
}
