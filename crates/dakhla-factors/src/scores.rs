//! Factor score containers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use dakhla_traits::{Date, Ticker, UniverseStats};

use crate::raw::RawFactors;

/// Standardized and ranked factor scores for one ticker at one date.
///
/// Immutable once constructed; a fresh set is computed per rebalance date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorScores {
    /// Raw factor inputs (NaN where unavailable).
    pub raw: RawFactors,
    /// Cross-sectional value z-score, winsorized.
    pub value_z: f64,
    /// Cross-sectional quality z-score, winsorized.
    pub quality_z: f64,
    /// Cross-sectional momentum z-score, winsorized.
    pub momentum_z: f64,
    /// Weighted composite of the three z-scores.
    pub total_score: f64,
    /// Rank within the universe, 1 = best.
    pub rank: usize,
    /// `1 − (rank − 1) / N`.
    pub percentile: f64,
    /// Dispersion of the three z-scores; a factor-agreement proxy that
    /// drives view confidence downstream.
    pub factor_std: f64,
}

/// Cross-sectional moments per factor, retained for audit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorUniverseStats {
    /// Moments of the raw value cross-section.
    pub value: UniverseStats,
    /// Moments of the raw quality cross-section.
    pub quality: UniverseStats,
    /// Moments of the raw momentum cross-section.
    pub momentum: UniverseStats,
}

/// The scored universe for one rebalance date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreSet {
    /// Point-in-time cutoff the set was computed for.
    pub as_of: Date,
    /// Per-ticker scores.
    pub scores: BTreeMap<Ticker, FactorScores>,
    /// Standardization moments used.
    pub stats: FactorUniverseStats,
}

impl ScoreSet {
    /// Tickers ordered by rank (best first).
    #[must_use]
    pub fn ranked(&self) -> Vec<&Ticker> {
        let mut tickers: Vec<&Ticker> = self.scores.keys().collect();
        tickers.sort_by_key(|t| self.scores[*t].rank);
        tickers
    }

    /// The `n` best-ranked tickers.
    #[must_use]
    pub fn top_n(&self, n: usize) -> Vec<Ticker> {
        self.ranked().into_iter().take(n).cloned().collect()
    }

    /// Number of scored tickers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scores.len()
    }

    /// Whether the set is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}
