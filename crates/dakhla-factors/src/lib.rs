//! Cross-sectional multi-factor scoring.
//!
//! The [`FactorEngine`] computes Value / Quality / Momentum factor scores
//! for a universe of tickers, pinned to a single `as_of` date: every data
//! fetch is filtered to strictly-before that cutoff, raw factors are
//! standardized cross-sectionally with winsorization, and the composite is
//! ranked with deterministic tie-breaking.

pub mod engine;
pub mod raw;
pub mod scores;

pub use engine::FactorEngine;
pub use raw::RawFactors;
pub use scores::{FactorScores, FactorUniverseStats, ScoreSet};
