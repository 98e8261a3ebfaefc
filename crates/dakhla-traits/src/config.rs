//! Engine configuration.
//!
//! All tunable constants live in one immutable object validated at
//! construction. Components receive the config by injection; nothing reads
//! process-wide state.

use serde::{Deserialize, Serialize};

use crate::error::{DakhlaError, Result};

/// Composite factor weights. Must be non-negative and sum to 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorWeights {
    /// Weight on the value z-score.
    pub value: f64,
    /// Weight on the quality z-score.
    pub quality: f64,
    /// Weight on the momentum z-score.
    pub momentum: f64,
}

impl Default for FactorWeights {
    fn default() -> Self {
        Self {
            value: 0.4,
            quality: 0.4,
            momentum: 0.2,
        }
    }
}

impl FactorWeights {
    /// Validate that weights are non-negative and sum to 1.
    pub fn validate(&self) -> Result<()> {
        for (name, w) in [
            ("value", self.value),
            ("quality", self.quality),
            ("momentum", self.momentum),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(DakhlaError::Config(format!(
                    "factor weight '{name}' must be a non-negative finite number, got {w}"
                )));
            }
        }
        let sum = self.value + self.quality + self.momentum;
        if (sum - 1.0).abs() > 1e-9 {
            return Err(DakhlaError::Config(format!(
                "factor weights must sum to 1, got {sum}"
            )));
        }
        Ok(())
    }
}

/// Engine-wide configuration with validated invariants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Composite factor weights.
    pub factor_weights: FactorWeights,
    /// Z-score clamp applied during standardization.
    pub winsorize_limit: f64,
    /// Number of holdings selected for optimization.
    pub top_n: usize,
    /// Per-weight cap in the convex program.
    pub max_position_size: f64,
    /// Optional per-sector weight ceilings, keyed by sector name.
    pub sector_caps: Option<std::collections::BTreeMap<String, f64>>,
    /// View magnitude: expected excess return per 1σ of composite score.
    pub factor_alpha_scalar: f64,
    /// Implied risk aversion δ used in the equilibrium prior.
    pub risk_aversion: f64,
    /// Black-Litterman τ scaling.
    pub tau: f64,
    /// Annualized risk-free rate used for Sharpe and MaxSharpe.
    pub risk_free_rate: f64,
    /// Historical window for the covariance estimate, in trading days.
    pub covariance_lookback_days: usize,
    /// Outbound API call budget per minute.
    pub rate_limit_per_min: u32,
    /// TTL of the consolidated per-ticker cache, in hours.
    pub cache_ttl_hours: u64,
    /// TTL of quarterly fundamentals, in days.
    pub fundamentals_ttl_days: u64,
    /// Retry attempt budget for transient source failures.
    pub max_retries: u32,
    /// Let the regime detector tilt aggregate equity exposure.
    pub enable_regime_adjustment: bool,
    /// Apply macro tilts to expected returns.
    pub enable_macro_tilt: bool,
    /// Apply the regime-conditioned tilt to composite factor weights.
    pub enable_factor_regimes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            factor_weights: FactorWeights::default(),
            winsorize_limit: 3.0,
            top_n: 20,
            max_position_size: 0.30,
            sector_caps: None,
            factor_alpha_scalar: 0.02,
            risk_aversion: 2.5,
            tau: 0.05,
            risk_free_rate: 0.04,
            covariance_lookback_days: 504,
            rate_limit_per_min: 60,
            cache_ttl_hours: 24,
            fundamentals_ttl_days: 90,
            max_retries: 5,
            enable_regime_adjustment: false,
            enable_macro_tilt: false,
            enable_factor_regimes: true,
        }
    }
}

impl EngineConfig {
    /// Validate the configuration, returning it on success.
    ///
    /// # Errors
    ///
    /// Returns [`DakhlaError::Config`] on any violated invariant: weights
    /// not summing to 1, caps outside (0, 1], non-positive τ or δ, a zero
    /// holdings count, or an unusably short covariance window.
    pub fn validated(self) -> Result<Self> {
        self.factor_weights.validate()?;
        if !self.winsorize_limit.is_finite() || self.winsorize_limit <= 0.0 {
            return Err(DakhlaError::Config(format!(
                "winsorize_limit must be positive, got {}",
                self.winsorize_limit
            )));
        }
        if self.top_n == 0 {
            return Err(DakhlaError::Config("top_n must be at least 1".into()));
        }
        if !(0.0..=1.0).contains(&self.max_position_size) || self.max_position_size == 0.0 {
            return Err(DakhlaError::Config(format!(
                "max_position_size must be in (0, 1], got {}",
                self.max_position_size
            )));
        }
        if let Some(caps) = &self.sector_caps {
            for (sector, cap) in caps {
                if !(0.0..=1.0).contains(cap) || *cap == 0.0 {
                    return Err(DakhlaError::Config(format!(
                        "sector cap for '{sector}' must be in (0, 1], got {cap}"
                    )));
                }
            }
        }
        if self.risk_aversion <= 0.0 {
            return Err(DakhlaError::Config(format!(
                "risk_aversion must be positive, got {}",
                self.risk_aversion
            )));
        }
        if self.tau <= 0.0 {
            return Err(DakhlaError::Config(format!(
                "tau must be positive, got {}",
                self.tau
            )));
        }
        if self.covariance_lookback_days < 2 {
            return Err(DakhlaError::Config(format!(
                "covariance_lookback_days must be at least 2, got {}",
                self.covariance_lookback_days
            )));
        }
        if self.max_retries == 0 {
            return Err(DakhlaError::Config("max_retries must be at least 1".into()));
        }
        Ok(self)
    }
}
