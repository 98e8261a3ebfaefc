//! The Black-Litterman optimizer pipeline.
//!
//! Orchestrates: top-N selection → covariance with shrinkage → market-cap
//! prior → factor views → posterior → constrained solve → optional
//! discrete allocation. An infeasible program degrades to equal weight
//! within the selected set and marks the result.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dakhla_factors::{FactorScores, ScoreSet};
use dakhla_traits::{
    DakhlaError, Date, EngineConfig, PriceBar, Result, Ticker, UniverseEntry,
};

use crate::allocation::DiscreteAllocation;
use crate::bl::{equilibrium_returns, posterior_returns};
use crate::covariance::{ledoit_wolf, ReturnsMatrix, ShrunkCovariance};
use crate::regime::{Regime, RegimeSignal};
use crate::solver::{portfolio_metrics, solve, Objective};
use crate::views::{ViewConfig, ViewSpec};

/// Weights below this are pruned and the remainder renormalized.
const WEIGHT_FLOOR: f64 = 1e-3;

/// Rounds of sector-cap tightening before giving up.
const SECTOR_CAP_ROUNDS: usize = 4;

/// The optimizer's output for one rebalance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    /// Point-in-time cutoff of the inputs.
    pub as_of: Date,
    /// Objective that produced the weights.
    pub objective: Objective,
    /// Target fractional weights (sum to 1).
    pub weights: BTreeMap<Ticker, f64>,
    /// Annualized expected portfolio return.
    pub expected_return: f64,
    /// Annualized portfolio volatility.
    pub volatility: f64,
    /// Sharpe ratio against the configured risk-free rate.
    pub sharpe: f64,
    /// Integer share conversion, when capital was supplied.
    pub discrete: Option<DiscreteAllocation>,
    /// True when the solver failed and the result fell back to equal
    /// weight within the selected set.
    pub degraded: bool,
}

/// A serialized record of one allocation for later forward validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    /// Wall-clock creation time.
    pub created: DateTime<Utc>,
    /// Full engine configuration in force.
    pub config: EngineConfig,
    /// The allocation itself.
    pub result: AllocationResult,
    /// Factor scores of the held tickers.
    pub factor_scores: BTreeMap<Ticker, FactorScores>,
    /// Benchmark reference quote, when available.
    pub benchmark: Option<BenchmarkQuote>,
}

/// A benchmark ticker and its price at snapshot creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkQuote {
    /// Benchmark ticker (e.g. "SPY").
    pub ticker: Ticker,
    /// Price at creation.
    pub price: f64,
}

impl PortfolioSnapshot {
    /// Serialize to pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns a serialization error.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Market-cap prior + factor views → posterior → constrained allocation.
pub struct BlackLittermanOptimizer {
    config: EngineConfig,
    views: ViewConfig,
}

impl BlackLittermanOptimizer {
    /// Build an optimizer over a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DakhlaError::Config`] on an invalid configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        let config = config.validated()?;
        let views = ViewConfig {
            alpha_scalar: config.factor_alpha_scalar,
            ..ViewConfig::default()
        };
        Ok(Self { config, views })
    }

    /// The configuration in force.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the full pipeline for one rebalance.
    ///
    /// `universe` supplies market caps and sectors; `price_history` the
    /// covariance window (all bars strictly before `scores.as_of`).
    ///
    /// # Errors
    ///
    /// - [`DakhlaError::TemporalViolation`] if any bar is dated at or after
    ///   the cutoff.
    /// - [`DakhlaError::DataIntegrity`] when no selected ticker has both a
    ///   market cap and a price history.
    /// - [`DakhlaError::SingularCovariance`] from the covariance estimate.
    pub fn optimize(
        &self,
        scores: &ScoreSet,
        universe: &[UniverseEntry],
        price_history: &BTreeMap<Ticker, Vec<PriceBar>>,
        objective: Objective,
        regime: Option<&RegimeSignal>,
    ) -> Result<AllocationResult> {
        for (ticker, bars) in price_history {
            if let Some(bad) = bars.iter().find(|b| b.date >= scores.as_of) {
                return Err(DakhlaError::TemporalViolation(format!(
                    "{ticker} bar dated {} in a {} optimization",
                    bad.date, scores.as_of
                )));
            }
        }

        let caps_by_ticker: BTreeMap<&Ticker, f64> = universe
            .iter()
            .filter(|e| e.market_cap > 0.0)
            .map(|e| (&e.ticker, e.market_cap))
            .collect();
        let sectors: BTreeMap<&Ticker, Option<&String>> = universe
            .iter()
            .map(|e| (&e.ticker, e.sector.as_ref()))
            .collect();

        let selected: Vec<Ticker> = scores
            .top_n(self.config.top_n)
            .into_iter()
            .filter(|t| caps_by_ticker.contains_key(t) && price_history.contains_key(t))
            .collect();
        if selected.is_empty() {
            return Err(DakhlaError::DataIntegrity(
                "no selected ticker has market cap and price history".into(),
            ));
        }

        let window: BTreeMap<Ticker, Vec<PriceBar>> = selected
            .iter()
            .map(|t| (t.clone(), price_history[t].clone()))
            .collect();
        let returns = ReturnsMatrix::from_price_histories(&window)?;
        let cov = ledoit_wolf(&returns)?;
        let n = cov.tickers.len();

        let market_weights = {
            let caps: Vec<f64> = cov.tickers.iter().map(|t| caps_by_ticker[t]).collect();
            let total: f64 = caps.iter().sum();
            DVector::from_vec(caps.iter().map(|c| c / total).collect())
        };

        let prior = equilibrium_returns(&cov.matrix, &market_weights, self.config.risk_aversion);
        let views = self.build_views(scores, &cov, regime);
        let mut mu = posterior_returns(&cov.matrix, self.config.tau, &prior, &views)?;

        if self.config.enable_regime_adjustment {
            if let Some(signal) = regime {
                let scale = match signal.regime {
                    Regime::RiskOn => 1.0,
                    Regime::Caution => 0.75,
                    Regime::RiskOff => 0.5,
                };
                if scale < 1.0 {
                    let rf = self.config.risk_free_rate;
                    mu = mu.map(|m| rf + (m - rf) * scale);
                    info!(regime = %signal.regime, scale, "expected excess returns scaled");
                }
            }
        }

        // All posterior returns below the risk-free rate leave MaxSharpe
        // without a tangency; fall back to the minimum-variance objective.
        let effective_objective = if objective == Objective::MaxSharpe
            && mu.iter().all(|m| *m <= self.config.risk_free_rate)
        {
            warn!("all posterior returns below risk-free rate, using MinVolatility");
            Objective::MinVolatility
        } else {
            objective
        };

        let (weight_vec, degraded) =
            match self.solve_with_sector_caps(&mu, &cov, &sectors, effective_objective) {
                Ok(w) => (w, false),
                Err(DakhlaError::InfeasibleProgram(reason)) => {
                    warn!(%reason, "infeasible program, degrading to equal weight");
                    (DVector::from_element(n, 1.0 / n as f64), true)
                }
                Err(err) => return Err(err),
            };

        // The degraded fallback deliberately ignores the cap (an equal
        // weight above it is the documented behavior); a solved program
        // keeps the cap binding through pruning.
        let prune_cap = if degraded {
            f64::INFINITY
        } else {
            self.config.max_position_size
        };
        let weights = prune_weights(&cov.tickers, &weight_vec, prune_cap);
        let pruned_vec = DVector::from_vec(
            cov.tickers
                .iter()
                .map(|t| weights.get(t).copied().unwrap_or(0.0))
                .collect(),
        );
        let (expected_return, volatility, sharpe) =
            portfolio_metrics(&pruned_vec, &mu, &cov.matrix, self.config.risk_free_rate);

        info!(
            as_of = %scores.as_of,
            positions = weights.len(),
            expected_return,
            volatility,
            degraded,
            "allocation computed"
        );
        Ok(AllocationResult {
            as_of: scores.as_of,
            objective: effective_objective,
            weights,
            expected_return,
            volatility,
            sharpe,
            discrete: None,
            degraded,
        })
    }

    /// Convert an allocation's weights into integer shares at the given
    /// prices.
    ///
    /// # Errors
    ///
    /// See [`DiscreteAllocation::greedy`].
    pub fn with_discrete(
        &self,
        mut result: AllocationResult,
        prices: &BTreeMap<Ticker, f64>,
        capital: f64,
    ) -> Result<AllocationResult> {
        result.discrete = Some(DiscreteAllocation::greedy(&result.weights, prices, capital)?);
        Ok(result)
    }

    /// Derive a snapshot for later forward validation.
    #[must_use]
    pub fn snapshot(
        &self,
        result: &AllocationResult,
        scores: &ScoreSet,
        benchmark: Option<BenchmarkQuote>,
    ) -> PortfolioSnapshot {
        let factor_scores = result
            .weights
            .keys()
            .filter_map(|t| scores.scores.get(t).map(|s| (t.clone(), s.clone())))
            .collect();
        PortfolioSnapshot {
            created: Utc::now(),
            config: self.config.clone(),
            result: result.clone(),
            factor_scores,
            benchmark,
        }
    }

    /// Build one absolute view per selected ticker. Views are skipped
    /// entirely when every composite is identical (they would carry no
    /// cross-sectional information) and the posterior stays at the prior.
    fn build_views(
        &self,
        scores: &ScoreSet,
        cov: &ShrunkCovariance,
        regime: Option<&RegimeSignal>,
    ) -> Vec<ViewSpec> {
        let weights = self.tilted_weights(regime);
        let composites: Vec<f64> = cov
            .tickers
            .iter()
            .map(|t| {
                let s = &scores.scores[t];
                weights.value * s.value_z + weights.quality * s.quality_z
                    + weights.momentum * s.momentum_z
            })
            .collect();

        let spread = composites
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), c| {
                (lo.min(*c), hi.max(*c))
            });
        if spread.1 - spread.0 < 1e-12 {
            return Vec::new();
        }

        let vols = cov.volatilities();
        cov.tickers
            .iter()
            .enumerate()
            .map(|(i, ticker)| {
                ViewSpec::from_score(
                    ticker.clone(),
                    i,
                    composites[i],
                    scores.scores[ticker].factor_std,
                    vols[i],
                    &self.views,
                )
            })
            .collect()
    }

    /// Composite weights after the regime-conditioned tilt: stress shifts
    /// weight from momentum to quality.
    fn tilted_weights(&self, regime: Option<&RegimeSignal>) -> dakhla_traits::FactorWeights {
        let base = self.config.factor_weights;
        if !self.config.enable_factor_regimes {
            return base;
        }
        let shift: f64 = match regime.map(|r| r.regime) {
            Some(Regime::RiskOff) => 0.10,
            Some(Regime::Caution) => 0.05,
            _ => return base,
        };
        let shift = shift.min(base.momentum);
        dakhla_traits::FactorWeights {
            value: base.value,
            quality: base.quality + shift,
            momentum: base.momentum - shift,
        }
    }

    /// Solve, tightening per-asset caps until sector ceilings hold.
    fn solve_with_sector_caps(
        &self,
        mu: &DVector<f64>,
        cov: &ShrunkCovariance,
        sectors: &BTreeMap<&Ticker, Option<&String>>,
        objective: Objective,
    ) -> Result<DVector<f64>> {
        let n = cov.tickers.len();
        let mut caps = DVector::from_element(n, self.config.max_position_size);
        let Some(sector_caps) = &self.config.sector_caps else {
            return solve(mu, &cov.matrix, &caps, objective, self.config.risk_free_rate);
        };

        for _ in 0..SECTOR_CAP_ROUNDS {
            let w = solve(mu, &cov.matrix, &caps, objective, self.config.risk_free_rate)?;

            let mut worst: Option<(&str, f64, f64)> = None;
            for (sector, limit) in sector_caps {
                let total: f64 = cov
                    .tickers
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| {
                        sectors.get(t).copied().flatten().map(String::as_str) == Some(sector)
                    })
                    .map(|(i, _)| w[i])
                    .sum();
                if total > limit + 1e-6 {
                    let excess = total - limit;
                    if worst.as_ref().map_or(true, |(_, _, e)| excess > *e) {
                        worst = Some((sector, total, excess));
                    }
                }
            }

            let Some((sector, total, _)) = worst else {
                return Ok(w);
            };

            // Scale the offending sector's per-asset caps down in proportion.
            let limit = sector_caps[sector];
            let scale = limit / total;
            for (i, ticker) in cov.tickers.iter().enumerate() {
                if sectors.get(ticker).copied().flatten().map(String::as_str) == Some(sector) {
                    caps[i] = (w[i] * scale).max(1e-6).min(caps[i]);
                }
            }
        }

        Err(DakhlaError::InfeasibleProgram(
            "sector caps did not converge".into(),
        ))
    }
}

fn prune_weights(tickers: &[Ticker], weights: &DVector<f64>, cap: f64) -> BTreeMap<Ticker, f64> {
    let kept: Vec<usize> = (0..weights.len())
        .filter(|&i| weights[i] >= WEIGHT_FLOOR)
        .collect();
    let total: f64 = kept.iter().map(|&i| weights[i]).sum();
    let mut pruned: Vec<f64> = kept.iter().map(|&i| weights[i] / total).collect();

    // Renormalization can nudge a cap-bound weight past the cap; clip and
    // hand the excess to the uncapped positions until it dissipates.
    for _ in 0..10 {
        let excess: f64 = pruned.iter().map(|w| (w - cap).max(0.0)).sum();
        if excess <= 1e-12 {
            break;
        }
        let headroom: f64 = pruned.iter().filter(|w| **w < cap).map(|w| cap - *w).sum();
        if headroom <= 0.0 {
            for w in &mut pruned {
                *w = w.min(cap);
            }
            break;
        }
        let snapshot = pruned.clone();
        for (w, old) in pruned.iter_mut().zip(&snapshot) {
            if *old > cap {
                *w = cap;
            } else {
                *w = old + excess * (cap - old) / headroom;
            }
        }
    }

    kept.into_iter()
        .zip(pruned)
        .map(|(i, w)| (tickers[i].clone(), w))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;
    use dakhla_factors::{FactorUniverseStats, RawFactors};
    use dakhla_traits::stats::UniverseStats;

    fn day(y: i32, m: u32, d: u32) -> Date {
        Date::from_ymd_opt(y, m, d).unwrap()
    }

    fn wavy_bars(n: usize, base: f64, amplitude: f64, period: usize, end: Date) -> Vec<PriceBar> {
        (0..n)
            .map(|i| {
                let phase = (i % period) as f64 / period as f64;
                let price = base * (1.0 + amplitude * (phase - 0.5));
                PriceBar::flat(end - Duration::days((n - i) as i64), price)
            })
            .collect()
    }

    fn score_for(rank: usize, n: usize, total: f64, zs: (f64, f64, f64)) -> FactorScores {
        FactorScores {
            raw: RawFactors::default(),
            value_z: zs.0,
            quality_z: zs.1,
            momentum_z: zs.2,
            total_score: total,
            rank,
            percentile: 1.0 - (rank - 1) as f64 / n as f64,
            factor_std: dakhla_traits::stats::population_std(&[zs.0, zs.1, zs.2]),
        }
    }

    struct Fixture {
        scores: ScoreSet,
        universe: Vec<UniverseEntry>,
        history: BTreeMap<Ticker, Vec<PriceBar>>,
    }

    /// N tickers with distinct composites and deterministic price paths.
    fn fixture(as_of: Date, totals: &[f64]) -> Fixture {
        let n = totals.len();
        let names: Vec<Ticker> = (0..n).map(|i| format!("T{i:02}")).collect();

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| totals[b].partial_cmp(&totals[a]).unwrap());

        let mut scores = BTreeMap::new();
        for (position, &i) in order.iter().enumerate() {
            scores.insert(
                names[i].clone(),
                score_for(position + 1, n, totals[i], (totals[i], totals[i], totals[i])),
            );
        }

        let stats = FactorUniverseStats {
            value: UniverseStats::empty(),
            quality: UniverseStats::empty(),
            momentum: UniverseStats::empty(),
        };

        let universe: Vec<UniverseEntry> = names
            .iter()
            .enumerate()
            .map(|(i, t)| UniverseEntry {
                ticker: t.clone(),
                market_cap: 1.0e10 * (n - i) as f64,
                sector: Some(if i % 2 == 0 { "Tech" } else { "Industrials" }.to_string()),
                as_of,
            })
            .collect();

        let history: BTreeMap<Ticker, Vec<PriceBar>> = names
            .iter()
            .enumerate()
            .map(|(i, t)| {
                (
                    t.clone(),
                    wavy_bars(200, 50.0 + 10.0 * i as f64, 0.05 + 0.01 * i as f64, 5 + i, as_of),
                )
            })
            .collect();

        Fixture {
            scores: ScoreSet {
                as_of,
                scores,
                stats,
            },
            universe,
            history,
        }
    }

    fn base_config(top_n: usize) -> EngineConfig {
        EngineConfig {
            top_n,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_weights_sum_to_one_and_respect_cap() {
        let as_of = day(2023, 6, 30);
        let fix = fixture(as_of, &[1.5, 0.8, 0.2, -0.4, -1.0]);
        let optimizer = BlackLittermanOptimizer::new(base_config(5)).unwrap();

        let result = optimizer
            .optimize(&fix.scores, &fix.universe, &fix.history, Objective::MaxSharpe, None)
            .unwrap();

        assert!(!result.degraded);
        let sum: f64 = result.weights.values().sum();
        assert_relative_eq!(sum, 1.0, epsilon = 1e-6);
        for (ticker, w) in &result.weights {
            assert!(*w >= 0.0, "{ticker} negative");
            assert!(*w <= 0.30 + 1e-6, "{ticker} above cap: {w}");
        }
        assert!(result.volatility > 0.0);
    }

    #[test]
    fn test_degraded_fallback_on_infeasible_cap() {
        // max_position 0.10 with N = 5 cannot reach full investment:
        // equal-weight 0.20 each, flagged degraded.
        let as_of = day(2023, 6, 30);
        let fix = fixture(as_of, &[2.0, 1.0, 0.0, -1.0, -2.0]);
        let config = EngineConfig {
            max_position_size: 0.10,
            ..base_config(5)
        };
        let optimizer = BlackLittermanOptimizer::new(config).unwrap();

        let result = optimizer
            .optimize(&fix.scores, &fix.universe, &fix.history, Objective::MaxSharpe, None)
            .unwrap();

        assert!(result.degraded);
        assert_eq!(result.weights.len(), 5);
        for w in result.weights.values() {
            assert_relative_eq!(*w, 0.20, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_identical_composites_recover_market_prior() {
        let as_of = day(2023, 6, 30);
        let fix = fixture(as_of, &[0.7, 0.7, 0.7]);
        let config = EngineConfig {
            max_position_size: 1.0,
            risk_free_rate: 0.0,
            ..base_config(3)
        };
        let optimizer = BlackLittermanOptimizer::new(config).unwrap();

        let result = optimizer
            .optimize(&fix.scores, &fix.universe, &fix.history, Objective::MaxSharpe, None)
            .unwrap();

        // Views carry no information: weights ≈ the cap-weighted prior
        let total_cap: f64 = fix.universe.iter().map(|e| e.market_cap).sum();
        for entry in &fix.universe {
            let expected = entry.market_cap / total_cap;
            let got = result.weights.get(&entry.ticker).copied().unwrap_or(0.0);
            assert_relative_eq!(got, expected, epsilon = 0.03);
        }
    }

    #[test]
    fn test_high_score_earns_higher_weight() {
        let as_of = day(2023, 6, 30);
        let fix = fixture(as_of, &[2.0, 0.0, 0.0, 0.0, -2.0]);
        let optimizer = BlackLittermanOptimizer::new(base_config(5)).unwrap();

        let result = optimizer
            .optimize(&fix.scores, &fix.universe, &fix.history, Objective::MaxSharpe, None)
            .unwrap();

        let best = result.weights.get("T00").copied().unwrap_or(0.0);
        let worst = result.weights.get("T04").copied().unwrap_or(0.0);
        assert!(
            best > worst,
            "strong view {best} must out-weigh weak view {worst}"
        );
    }

    #[test]
    fn test_temporal_violation_is_fatal() {
        let as_of = day(2023, 6, 30);
        let mut fix = fixture(as_of, &[1.0, 0.5, 0.0]);
        fix.history
            .get_mut("T00")
            .unwrap()
            .push(PriceBar::flat(as_of, 999.0));

        let optimizer = BlackLittermanOptimizer::new(base_config(3)).unwrap();
        let err = optimizer
            .optimize(&fix.scores, &fix.universe, &fix.history, Objective::MaxSharpe, None)
            .unwrap_err();
        assert!(matches!(err, DakhlaError::TemporalViolation(_)));
    }

    #[test]
    fn test_equal_weight_objective() {
        let as_of = day(2023, 6, 30);
        let fix = fixture(as_of, &[1.0, 0.5, 0.0, -0.5]);
        let optimizer = BlackLittermanOptimizer::new(base_config(4)).unwrap();

        let result = optimizer
            .optimize(&fix.scores, &fix.universe, &fix.history, Objective::EqualWeight, None)
            .unwrap();
        for w in result.weights.values() {
            assert_relative_eq!(*w, 0.25, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_discrete_conversion_closes_cash() {
        let as_of = day(2023, 6, 30);
        let fix = fixture(as_of, &[1.0, 0.5, 0.0, -0.5]);
        let optimizer = BlackLittermanOptimizer::new(base_config(4)).unwrap();

        let result = optimizer
            .optimize(&fix.scores, &fix.universe, &fix.history, Objective::MaxSharpe, None)
            .unwrap();

        let prices: BTreeMap<Ticker, f64> = fix
            .history
            .iter()
            .map(|(t, bars)| (t.clone(), bars.last().unwrap().close))
            .collect();
        let capital = 100_000.0;
        let result = optimizer.with_discrete(result, &prices, capital).unwrap();

        let discrete = result.discrete.as_ref().unwrap();
        assert_relative_eq!(discrete.invested + discrete.leftover, capital, epsilon = 1e-6);
        assert!(discrete.shares.values().all(|s| *s > 0));
    }

    #[test]
    fn test_factor_regime_tilt_changes_views() {
        let as_of = day(2023, 6, 30);
        // Momentum and quality z-scores disagree, so shifting weight
        // between them reorders the composites.
        let mut fix = fixture(as_of, &[0.5, 0.4, 0.3]);
        for (i, (_, score)) in fix.scores.scores.iter_mut().enumerate() {
            score.momentum_z = 2.0 - i as f64 * 2.0;
            score.quality_z = i as f64 * 2.0 - 2.0;
            score.value_z = 0.0;
        }

        let config = EngineConfig {
            max_position_size: 0.60,
            ..base_config(3)
        };
        let optimizer = BlackLittermanOptimizer::new(config).unwrap();
        let calm = RegimeSignal {
            regime: Regime::RiskOn,
            signal_strength: 5.0,
            index_price: 100.0,
            sma_200: 95.0,
            vol_ratio: Some(0.9),
            data_points: 250,
        };
        let stressed = RegimeSignal {
            regime: Regime::RiskOff,
            ..calm.clone()
        };

        let on = optimizer
            .optimize(
                &fix.scores,
                &fix.universe,
                &fix.history,
                Objective::MaxSharpe,
                Some(&calm),
            )
            .unwrap();
        let off = optimizer
            .optimize(
                &fix.scores,
                &fix.universe,
                &fix.history,
                Objective::MaxSharpe,
                Some(&stressed),
            )
            .unwrap();

        assert_ne!(
            on.weights, off.weights,
            "RISK_OFF must tilt momentum weight into quality"
        );
    }

    #[test]
    fn test_sector_caps_bind() {
        let as_of = day(2023, 6, 30);
        let fix = fixture(as_of, &[2.0, 1.5, 1.0, 0.5, 0.0, -0.5]);
        let config = EngineConfig {
            sector_caps: Some(
                [("Tech".to_string(), 0.40)]
                    .into_iter()
                    .collect(),
            ),
            ..base_config(6)
        };
        let optimizer = BlackLittermanOptimizer::new(config).unwrap();

        let result = optimizer
            .optimize(&fix.scores, &fix.universe, &fix.history, Objective::MaxSharpe, None)
            .unwrap();

        let tech_total: f64 = fix
            .universe
            .iter()
            .filter(|e| e.sector.as_deref() == Some("Tech"))
            .filter_map(|e| result.weights.get(&e.ticker))
            .sum();
        assert!(
            tech_total <= 0.40 + 0.02,
            "tech sector weight {tech_total} exceeds its cap"
        );
    }

    #[test]
    fn test_snapshot_round_trip() {
        let as_of = day(2023, 6, 30);
        let fix = fixture(as_of, &[1.0, 0.0, -1.0]);
        let config = EngineConfig {
            max_position_size: 0.60,
            ..base_config(3)
        };
        let optimizer = BlackLittermanOptimizer::new(config).unwrap();

        let result = optimizer
            .optimize(&fix.scores, &fix.universe, &fix.history, Objective::MaxSharpe, None)
            .unwrap();
        let snapshot = optimizer.snapshot(
            &result,
            &fix.scores,
            Some(BenchmarkQuote {
                ticker: "SPY".into(),
                price: 440.0,
            }),
        );

        let json = snapshot.to_json().unwrap();
        let back: PortfolioSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back.result.weights, snapshot.result.weights);
        assert_eq!(back.benchmark, snapshot.benchmark);
    }
}
