//! Factor-score views for the Black-Litterman posterior.
//!
//! Each selected ticker carries one absolute view: expected excess return
//! proportional to its composite score scaled by its own volatility, with
//! confidence set by how much the three factor z-scores agree.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use dakhla_traits::Ticker;

/// Tuning for view construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Excess return per 1σ of composite score (default 0.02 → ~2%).
    pub alpha_scalar: f64,
    /// `factor_std` breakpoints separating the confidence levels.
    pub confidence_thresholds: [f64; 3],
    /// Confidence per dispersion band, best agreement first.
    pub confidence_levels: [f64; 4],
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            alpha_scalar: 0.02,
            confidence_thresholds: [0.5, 1.0, 1.5],
            confidence_levels: [0.8, 0.6, 0.4, 0.2],
        }
    }
}

impl ViewConfig {
    /// Confidence for a given factor dispersion: tight agreement between
    /// the z-scores earns a stronger view.
    #[must_use]
    pub fn confidence_for(&self, factor_std: f64) -> f64 {
        let [low, mid, high] = self.confidence_thresholds;
        if factor_std < low {
            self.confidence_levels[0]
        } else if factor_std < mid {
            self.confidence_levels[1]
        } else if factor_std < high {
            self.confidence_levels[2]
        } else {
            self.confidence_levels[3]
        }
    }
}

/// One absolute view on one ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewSpec {
    /// Ticker the view applies to.
    pub ticker: Ticker,
    /// Index of the ticker in the optimization universe (picking row).
    pub asset_index: usize,
    /// Implied annualized excess return: `total_score · σ · α`.
    pub implied_excess_return: f64,
    /// Confidence in (0, 1].
    pub confidence: f64,
}

impl ViewSpec {
    /// Build a view from a composite score and the asset's annualized
    /// volatility.
    #[must_use]
    pub fn from_score(
        ticker: Ticker,
        asset_index: usize,
        total_score: f64,
        factor_std: f64,
        volatility: f64,
        config: &ViewConfig,
    ) -> Self {
        Self {
            ticker,
            asset_index,
            implied_excess_return: total_score * volatility * config.alpha_scalar,
            confidence: config.confidence_for(factor_std),
        }
    }
}

/// Idzorek-style diagonal view-uncertainty matrix:
/// `Ω_ii = (1 − c_i)/c_i · (p_i · τΣ · p_iᵀ)`.
///
/// With one absolute view per asset the picking product reduces to
/// `τ · Σ_ii` of the viewed asset.
#[must_use]
pub fn omega(views: &[ViewSpec], sigma: &DMatrix<f64>, tau: f64) -> DMatrix<f64> {
    let k = views.len();
    let mut omega = DMatrix::zeros(k, k);
    for (row, view) in views.iter().enumerate() {
        let variance = tau * sigma[(view.asset_index, view.asset_index)];
        let scale = (1.0 - view.confidence) / view.confidence;
        // Keep Ω invertible even at full confidence
        omega[(row, row)] = (scale * variance).max(1e-12);
    }
    omega
}

/// The `K × N` picking matrix for a set of absolute views.
#[must_use]
pub fn picking_matrix(views: &[ViewSpec], n_assets: usize) -> DMatrix<f64> {
    let mut p = DMatrix::zeros(views.len(), n_assets);
    for (row, view) in views.iter().enumerate() {
        p[(row, view.asset_index)] = 1.0;
    }
    p
}
