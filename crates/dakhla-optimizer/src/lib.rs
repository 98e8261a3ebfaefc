//! Black-Litterman portfolio optimization.
//!
//! The pipeline: a market-cap-weighted equilibrium prior, factor-score
//! views with Idzorek-style uncertainty, the standard Bayesian posterior,
//! a constrained mean-variance solve over the capped simplex, and greedy
//! discrete share conversion. The market regime detector lives here too,
//! since its output feeds the optimizer's tilts.

pub mod allocation;
pub mod bl;
pub mod covariance;
pub mod optimizer;
pub mod regime;
pub mod solver;
pub mod views;

pub use allocation::DiscreteAllocation;
pub use bl::{equilibrium_returns, posterior_returns};
pub use covariance::{ledoit_wolf, ReturnsMatrix, ShrunkCovariance};
pub use optimizer::{AllocationResult, BenchmarkQuote, BlackLittermanOptimizer, PortfolioSnapshot};
pub use regime::{Regime, RegimeDetector, RegimeSignal, VolTermStructure};
pub use solver::Objective;
pub use views::{ViewConfig, ViewSpec};
