//! Constrained mean-variance solver.
//!
//! The program is `Σw = 1`, `0 ≤ w_i ≤ cap_i`, with one of the objectives
//! below. Quadratic objectives are solved by projected gradient descent;
//! the projection onto the capped simplex is exact (bisection on the dual
//! variable), so the cap constraints bind exactly. MaxSharpe sweeps the
//! risk-aversion frontier and picks the tangency candidate. Everything is
//! deterministic: fixed iteration budgets, no randomness.

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use dakhla_traits::{DakhlaError, Result};

/// Iterations per projected-gradient solve.
const PGD_ITERATIONS: usize = 800;

/// Bisection iterations for the simplex projection.
const PROJECTION_ITERATIONS: usize = 80;

/// Risk-aversion grid for the MaxSharpe frontier sweep.
const SHARPE_SWEEP_POINTS: usize = 40;
const SHARPE_SWEEP_MIN: f64 = 0.05;
const SHARPE_SWEEP_MAX: f64 = 200.0;

/// Optimization objective.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "objective")]
pub enum Objective {
    /// Maximum Sharpe ratio (the default).
    MaxSharpe,
    /// Minimum portfolio variance.
    MinVolatility,
    /// Maximize `μᵀw − γ/2 · wᵀΣw`.
    MaxQuadraticUtility {
        /// Risk aversion γ.
        risk_aversion: f64,
    },
    /// Uniform `1/N` weights.
    EqualWeight,
}

/// Solve the constrained program.
///
/// `caps` is the per-asset upper bound vector (uniform `max_position_size`
/// unless sector limits tightened it).
///
/// # Errors
///
/// Returns [`DakhlaError::InfeasibleProgram`] when `Σ caps < 1` (no
/// feasible point) and [`DakhlaError::Config`] on dimension mismatches.
pub fn solve(
    mu: &DVector<f64>,
    sigma: &DMatrix<f64>,
    caps: &DVector<f64>,
    objective: Objective,
    risk_free_rate: f64,
) -> Result<DVector<f64>> {
    let n = mu.len();
    if n == 0 {
        return Err(DakhlaError::Config("empty optimization universe".into()));
    }
    if sigma.nrows() != n || sigma.ncols() != n || caps.len() != n {
        return Err(DakhlaError::Config(format!(
            "dimension mismatch: mu {n}, sigma {}x{}, caps {}",
            sigma.nrows(),
            sigma.ncols(),
            caps.len()
        )));
    }
    if caps.iter().any(|c| *c <= 0.0) {
        return Err(DakhlaError::InfeasibleProgram(
            "a position cap is non-positive".into(),
        ));
    }
    if caps.sum() < 1.0 - 1e-9 {
        return Err(DakhlaError::InfeasibleProgram(format!(
            "caps sum to {:.4}, cannot reach full investment",
            caps.sum()
        )));
    }

    let weights = match objective {
        Objective::EqualWeight => {
            let w = DVector::from_element(n, 1.0 / n as f64);
            if w.iter().zip(caps.iter()).any(|(w, c)| *w > *c + 1e-12) {
                return Err(DakhlaError::InfeasibleProgram(format!(
                    "equal weight 1/{n} exceeds a position cap"
                )));
            }
            w
        }
        Objective::MinVolatility => solve_quadratic(sigma, None, 1.0, caps),
        Objective::MaxQuadraticUtility { risk_aversion } => {
            if risk_aversion <= 0.0 {
                return Err(DakhlaError::Config(format!(
                    "risk_aversion must be positive, got {risk_aversion}"
                )));
            }
            solve_quadratic(sigma, Some(mu), risk_aversion, caps)
        }
        Objective::MaxSharpe => max_sharpe(mu, sigma, caps, risk_free_rate),
    };

    debug!(?objective, n, "solved mean-variance program");
    Ok(weights)
}

/// Annualized portfolio metrics for a weight vector.
#[must_use]
pub fn portfolio_metrics(
    weights: &DVector<f64>,
    mu: &DVector<f64>,
    sigma: &DMatrix<f64>,
    risk_free_rate: f64,
) -> (f64, f64, f64) {
    let expected = mu.dot(weights);
    let variance = (sigma * weights).dot(weights);
    let volatility = variance.max(0.0).sqrt();
    let sharpe = if volatility > 0.0 {
        (expected - risk_free_rate) / volatility
    } else {
        f64::NAN
    };
    (expected, volatility, sharpe)
}

/// Minimize `γ/2 · wᵀΣw − cᵀw` over the capped simplex (c = 0 for pure
/// minimum variance).
fn solve_quadratic(
    sigma: &DMatrix<f64>,
    linear: Option<&DVector<f64>>,
    gamma: f64,
    caps: &DVector<f64>,
) -> DVector<f64> {
    let n = sigma.nrows();

    // Lipschitz bound on the gradient: γ times the max absolute row sum.
    let lipschitz = gamma
        * (0..n)
            .map(|i| (0..n).map(|j| sigma[(i, j)].abs()).sum::<f64>())
            .fold(f64::MIN, f64::max);
    let step = if lipschitz > 0.0 { 1.0 / lipschitz } else { 1.0 };

    let mut w = project_capped_simplex(&DVector::from_element(n, 1.0 / n as f64), caps);
    for _ in 0..PGD_ITERATIONS {
        let mut grad = sigma * &w * gamma;
        if let Some(c) = linear {
            grad -= c;
        }
        w = project_capped_simplex(&(&w - grad * step), caps);
    }
    w
}

/// MaxSharpe via a frontier sweep: solve the quadratic-utility program on a
/// log-spaced risk-aversion grid and keep the candidate with the best
/// Sharpe ratio. The minimum-variance portfolio anchors the conservative
/// end of the grid.
fn max_sharpe(
    mu: &DVector<f64>,
    sigma: &DMatrix<f64>,
    caps: &DVector<f64>,
    risk_free_rate: f64,
) -> DVector<f64> {
    let sweep = |log_min: f64, log_max: f64| -> (f64, f64, DVector<f64>) {
        let mut best_gamma = f64::NAN;
        let mut best_sharpe = f64::NAN;
        let mut best = DVector::zeros(0);
        for i in 0..SHARPE_SWEEP_POINTS {
            let t = i as f64 / (SHARPE_SWEEP_POINTS - 1) as f64;
            let gamma = (log_min + t * (log_max - log_min)).exp();
            let candidate = solve_quadratic(sigma, Some(mu), gamma, caps);
            let (_, _, sharpe) = portfolio_metrics(&candidate, mu, sigma, risk_free_rate);
            if sharpe.is_finite() && (best_sharpe.is_nan() || sharpe > best_sharpe) {
                best_gamma = gamma;
                best_sharpe = sharpe;
                best = candidate;
            }
        }
        (best_gamma, best_sharpe, best)
    };

    // Coarse frontier sweep, then a fine pass around the best candidate.
    let (gamma, coarse_sharpe, coarse) = sweep(SHARPE_SWEEP_MIN.ln(), SHARPE_SWEEP_MAX.ln());
    if !gamma.is_finite() {
        // Every candidate had zero volatility; fall back to minimum variance.
        return solve_quadratic(sigma, None, 1.0, caps);
    }
    let half_step =
        (SHARPE_SWEEP_MAX.ln() - SHARPE_SWEEP_MIN.ln()) / (SHARPE_SWEEP_POINTS - 1) as f64;
    let (_, fine_sharpe, fine) = sweep(gamma.ln() - half_step, gamma.ln() + half_step);

    if fine_sharpe > coarse_sharpe {
        fine
    } else {
        coarse
    }
}

/// Exact Euclidean projection onto `{w : Σw = 1, 0 ≤ w_i ≤ cap_i}` by
/// bisection on the shift θ in `w_i = clip(v_i − θ, 0, cap_i)`.
fn project_capped_simplex(v: &DVector<f64>, caps: &DVector<f64>) -> DVector<f64> {
    let clip_sum = |theta: f64| -> f64 {
        v.iter()
            .zip(caps.iter())
            .map(|(vi, ci)| (vi - theta).clamp(0.0, *ci))
            .sum()
    };

    // At lo every cap binds (sum = Σcaps ≥ 1); at hi everything is zero.
    let mut lo = v.min() - caps.max() - 1.0;
    let mut hi = v.max();
    for _ in 0..PROJECTION_ITERATIONS {
        let mid = 0.5 * (lo + hi);
        if clip_sum(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    let theta = 0.5 * (lo + hi);
    DVector::from_iterator(
        v.len(),
        v.iter()
            .zip(caps.iter())
            .map(|(vi, ci)| (vi - theta).clamp(0.0, *ci)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn uniform_caps(n: usize, cap: f64) -> DVector<f64> {
        DVector::from_element(n, cap)
    }

    fn assert_feasible(w: &DVector<f64>, caps: &DVector<f64>) {
        assert_relative_eq!(w.sum(), 1.0, epsilon = 1e-6);
        for (wi, ci) in w.iter().zip(caps.iter()) {
            assert!(*wi >= -1e-9, "negative weight {wi}");
            assert!(*wi <= ci + 1e-6, "weight {wi} above cap {ci}");
        }
    }

    #[test]
    fn test_projection_simplex() {
        let v = DVector::from_vec(vec![0.9, 0.5, 0.1]);
        let caps = uniform_caps(3, 1.0);
        let w = project_capped_simplex(&v, &caps);
        assert_relative_eq!(w.sum(), 1.0, epsilon = 1e-9);
        assert!(w[0] > w[1] && w[1] > w[2]);
    }

    #[test]
    fn test_projection_respects_caps() {
        let v = DVector::from_vec(vec![10.0, 0.0, 0.0]);
        let caps = uniform_caps(3, 0.5);
        let w = project_capped_simplex(&v, &caps);
        assert_relative_eq!(w[0], 0.5, epsilon = 1e-9);
        assert_relative_eq!(w.sum(), 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_equal_weight() {
        let mu = DVector::from_vec(vec![0.1, 0.2, 0.3]);
        let sigma = DMatrix::identity(3, 3) * 0.04;
        let w = solve(&mu, &sigma, &uniform_caps(3, 0.5), Objective::EqualWeight, 0.0).unwrap();
        for wi in w.iter() {
            assert_relative_eq!(*wi, 1.0 / 3.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_equal_weight_infeasible_under_cap() {
        let mu = DVector::from_vec(vec![0.1, 0.2, 0.3, 0.1, 0.1]);
        let sigma = DMatrix::identity(5, 5) * 0.04;
        // 1/5 = 0.2 exceeds 0.19, but Σcaps = 0.95 < 1 triggers first
        let err = solve(&mu, &sigma, &uniform_caps(5, 0.19), Objective::EqualWeight, 0.0)
            .unwrap_err();
        assert!(matches!(err, DakhlaError::InfeasibleProgram(_)));
    }

    #[test]
    fn test_infeasible_when_caps_cannot_reach_one() {
        // max_position 0.10 with N = 5 can invest at most 50%
        let mu = DVector::from_element(5, 0.1);
        let sigma = DMatrix::identity(5, 5) * 0.04;
        let err = solve(&mu, &sigma, &uniform_caps(5, 0.10), Objective::MaxSharpe, 0.0)
            .unwrap_err();
        assert!(matches!(err, DakhlaError::InfeasibleProgram(_)));
    }

    #[test]
    fn test_min_volatility_prefers_low_variance_asset() {
        let mu = DVector::from_vec(vec![0.1, 0.1]);
        let sigma = DMatrix::from_row_slice(2, 2, &[0.01, 0.0, 0.0, 0.25]);
        let caps = uniform_caps(2, 1.0);
        let w = solve(&mu, &sigma, &caps, Objective::MinVolatility, 0.0).unwrap();
        assert_feasible(&w, &caps);
        assert!(w[0] > 0.9, "low-vol asset should dominate, got {w}");
    }

    #[test]
    fn test_max_sharpe_caps_dominant_view() {
        // One asset with an overwhelming expected return must pin at the
        // 0.30 cap, the other two sharing the remaining 0.70.
        let mu = DVector::from_vec(vec![0.50, 0.05, 0.05]);
        let sigma = DMatrix::from_row_slice(
            3,
            3,
            &[0.04, 0.002, 0.002, 0.002, 0.05, 0.002, 0.002, 0.002, 0.06],
        );
        let caps = uniform_caps(3, 0.30);

        // Σcaps = 0.9 < 1: infeasible as specified
        assert!(solve(&mu, &sigma, &caps, Objective::MaxSharpe, 0.02).is_err());

        // With a fourth asset the program is feasible and the cap binds.
        let mu = DVector::from_vec(vec![0.50, 0.05, 0.05, 0.05]);
        let sigma = DMatrix::from_diagonal(&DVector::from_vec(vec![0.04, 0.05, 0.06, 0.05]));
        let caps = uniform_caps(4, 0.30);
        let w = solve(&mu, &sigma, &caps, Objective::MaxSharpe, 0.02).unwrap();
        assert_feasible(&w, &caps);
        assert_relative_eq!(w[0], 0.30, epsilon = 1e-6);
        assert_relative_eq!(w[1] + w[2] + w[3], 0.70, epsilon = 1e-6);
    }

    #[test]
    fn test_max_sharpe_recovers_market_prior_without_information() {
        // μ set to the equilibrium returns of the market portfolio with
        // rf = 0: the tangency portfolio is the market portfolio itself.
        let sigma = DMatrix::from_row_slice(
            3,
            3,
            &[0.0225, 0.003, 0.006, 0.003, 0.016, 0.001, 0.006, 0.001, 0.04],
        );
        let w_mkt = DVector::from_vec(vec![0.5, 0.3, 0.2]);
        let mu = &sigma * &w_mkt * 2.5;

        let caps = uniform_caps(3, 1.0);
        let w = solve(&mu, &sigma, &caps, Objective::MaxSharpe, 0.0).unwrap();
        assert_feasible(&w, &caps);
        for i in 0..3 {
            assert_relative_eq!(w[i], w_mkt[i], epsilon = 0.02);
        }
    }

    #[test]
    fn test_quadratic_utility_tilt_grows_with_lower_aversion() {
        let mu = DVector::from_vec(vec![0.20, 0.05]);
        let sigma = DMatrix::from_row_slice(2, 2, &[0.04, 0.0, 0.0, 0.04]);
        let caps = uniform_caps(2, 1.0);

        let aggressive = solve(
            &mu,
            &sigma,
            &caps,
            Objective::MaxQuadraticUtility { risk_aversion: 1.0 },
            0.0,
        )
        .unwrap();
        let conservative = solve(
            &mu,
            &sigma,
            &caps,
            Objective::MaxQuadraticUtility { risk_aversion: 50.0 },
            0.0,
        )
        .unwrap();

        assert_feasible(&aggressive, &caps);
        assert_feasible(&conservative, &caps);
        assert!(
            aggressive[0] > conservative[0],
            "lower aversion must tilt harder into the high-return asset"
        );
    }

    #[test]
    fn test_cap_at_one_over_n_forces_equal_weights() {
        // Σcaps = 1 leaves a single feasible point: every cap binds.
        let mu = DVector::from_vec(vec![0.30, 0.10, 0.05, 0.01]);
        let sigma = DMatrix::from_diagonal(&DVector::from_vec(vec![0.04, 0.03, 0.05, 0.02]));
        let caps = uniform_caps(4, 0.25);
        let w = solve(&mu, &sigma, &caps, Objective::MaxSharpe, 0.0).unwrap();
        for wi in w.iter() {
            assert_relative_eq!(*wi, 0.25, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_single_asset_with_full_cap() {
        let mu = DVector::from_vec(vec![0.1]);
        let sigma = DMatrix::from_element(1, 1, 0.04);
        let w = solve(&mu, &sigma, &uniform_caps(1, 1.0), Objective::MaxSharpe, 0.0).unwrap();
        assert_relative_eq!(w[0], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_determinism() {
        let mu = DVector::from_vec(vec![0.12, 0.08, 0.15, 0.02]);
        let sigma = DMatrix::from_diagonal(&DVector::from_vec(vec![0.04, 0.03, 0.09, 0.02]));
        let caps = uniform_caps(4, 0.40);
        let a = solve(&mu, &sigma, &caps, Objective::MaxSharpe, 0.02).unwrap();
        let b = solve(&mu, &sigma, &caps, Objective::MaxSharpe, 0.02).unwrap();
        assert_eq!(a, b, "identical inputs must give identical outputs");
    }

    #[test]
    fn test_metrics() {
        let w = DVector::from_vec(vec![0.6, 0.4]);
        let mu = DVector::from_vec(vec![0.10, 0.05]);
        let sigma = DMatrix::from_row_slice(2, 2, &[0.04, 0.006, 0.006, 0.09]);
        let (ret, vol, sharpe) = portfolio_metrics(&w, &mu, &sigma, 0.02);

        assert_relative_eq!(ret, 0.08, epsilon = 1e-12);
        let expected_var: f64 = 0.36 * 0.04 + 2.0 * 0.6 * 0.4 * 0.006 + 0.16 * 0.09;
        assert_relative_eq!(vol, expected_var.sqrt(), epsilon = 1e-12);
        assert_relative_eq!(sharpe, (0.08 - 0.02) / expected_var.sqrt(), epsilon = 1e-12);
    }
}
