//! Covariance estimation with Ledoit-Wolf shrinkage.
//!
//! The sample covariance of daily returns is shrunk toward a
//! constant-correlation target (Ledoit & Wolf 2004) and annualized. A
//! matrix that fails the definiteness check even at full shrinkage is
//! surfaced as [`DakhlaError::SingularCovariance`].

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::{DMatrix, DVector};
use tracing::{debug, warn};

use dakhla_traits::{DakhlaError, Date, PriceBar, Result, Ticker, TRADING_DAYS_PER_YEAR};

/// Aligned daily simple returns for a set of tickers.
#[derive(Debug, Clone)]
pub struct ReturnsMatrix {
    /// Column order of the matrix.
    pub tickers: Vec<Ticker>,
    /// `T × N` matrix of daily simple returns.
    pub returns: DMatrix<f64>,
}

impl ReturnsMatrix {
    /// Build an aligned return matrix from per-ticker bar series.
    ///
    /// Only dates where every ticker has a bar participate, so the columns
    /// are strictly aligned. Returns are simple returns on adjusted close.
    ///
    /// # Errors
    ///
    /// Returns [`DakhlaError::DataIntegrity`] with fewer than three common
    /// dates (two returns), the minimum for a covariance.
    pub fn from_price_histories(series: &BTreeMap<Ticker, Vec<PriceBar>>) -> Result<Self> {
        if series.is_empty() {
            return Err(DakhlaError::DataIntegrity(
                "no price series for covariance".into(),
            ));
        }

        let mut common: Option<BTreeSet<Date>> = None;
        for bars in series.values() {
            let dates: BTreeSet<Date> = bars.iter().map(|b| b.date).collect();
            common = Some(match common {
                None => dates,
                Some(prev) => prev.intersection(&dates).copied().collect(),
            });
        }
        let common = common.unwrap_or_default();
        if common.len() < 3 {
            return Err(DakhlaError::DataIntegrity(format!(
                "only {} common dates across the covariance window",
                common.len()
            )));
        }

        let tickers: Vec<Ticker> = series.keys().cloned().collect();
        let t = common.len() - 1;
        let n = tickers.len();
        let mut returns = DMatrix::zeros(t, n);

        for (j, ticker) in tickers.iter().enumerate() {
            let by_date: BTreeMap<Date, f64> = series[ticker]
                .iter()
                .map(|b| (b.date, b.adj_close))
                .collect();
            let prices: Vec<f64> = common.iter().map(|d| by_date[d]).collect();
            for i in 1..prices.len() {
                returns[(i - 1, j)] = if prices[i - 1] > 0.0 {
                    prices[i] / prices[i - 1] - 1.0
                } else {
                    0.0
                };
            }
        }

        debug!(observations = t, assets = n, "return matrix aligned");
        Ok(Self { tickers, returns })
    }

    /// Number of return observations.
    #[must_use]
    pub fn observations(&self) -> usize {
        self.returns.nrows()
    }
}

/// A shrunk, annualized covariance estimate.
#[derive(Debug, Clone)]
pub struct ShrunkCovariance {
    /// Annualized covariance matrix, aligned with `tickers`.
    pub matrix: DMatrix<f64>,
    /// Column order of the matrix.
    pub tickers: Vec<Ticker>,
    /// Shrinkage intensity toward the constant-correlation target, in [0, 1].
    pub intensity: f64,
}

impl ShrunkCovariance {
    /// Annualized volatility (√diag) per asset, in ticker order.
    #[must_use]
    pub fn volatilities(&self) -> DVector<f64> {
        DVector::from_iterator(
            self.tickers.len(),
            self.matrix.diagonal().iter().map(|v| v.max(0.0).sqrt()),
        )
    }
}

/// Ledoit-Wolf shrinkage toward the constant-correlation target.
///
/// Computes the optimal intensity analytically, shrinks, annualizes, and
/// verifies definiteness via Cholesky. When the blended matrix fails the
/// check the intensity falls back to 1.0 (the pure target); if the target
/// itself is not positive definite, the estimate is unusable.
///
/// # Errors
///
/// Returns [`DakhlaError::SingularCovariance`] when no definite estimate
/// exists (e.g. an all-zero return matrix).
pub fn ledoit_wolf(returns: &ReturnsMatrix) -> Result<ShrunkCovariance> {
    let t = returns.returns.nrows();
    let n = returns.returns.ncols();
    if t < 2 {
        return Err(DakhlaError::DataIntegrity(
            "need at least two return observations".into(),
        ));
    }

    // Demean
    let mut x = returns.returns.clone();
    for j in 0..n {
        let mean = x.column(j).sum() / t as f64;
        for i in 0..t {
            x[(i, j)] -= mean;
        }
    }

    // Sample covariance (1/T convention, per Ledoit-Wolf)
    let sample = (x.transpose() * &x) / t as f64;

    // Constant-correlation target
    let std: Vec<f64> = (0..n).map(|i| sample[(i, i)].max(0.0).sqrt()).collect();
    let mut corr_sum = 0.0;
    let mut corr_count = 0usize;
    for i in 0..n {
        for j in 0..n {
            if i != j && std[i] > 0.0 && std[j] > 0.0 {
                corr_sum += sample[(i, j)] / (std[i] * std[j]);
                corr_count += 1;
            }
        }
    }
    let r_bar = if corr_count > 0 {
        corr_sum / corr_count as f64
    } else {
        0.0
    };

    let mut target = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            target[(i, j)] = if i == j {
                sample[(i, i)]
            } else {
                r_bar * std[i] * std[j]
            };
        }
    }

    // Optimal intensity: κ = (π − ρ) / γ, δ = clamp(κ / T, 0, 1)
    let mut pi_hat = 0.0;
    let mut pi_diag = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in 0..n {
            let mut acc = 0.0;
            for row in 0..t {
                acc += (x[(row, i)] * x[(row, j)] - sample[(i, j)]).powi(2);
            }
            let v = acc / t as f64;
            pi_diag[i][j] = v;
            pi_hat += v;
        }
    }

    let mut rho_hat = 0.0;
    for i in 0..n {
        rho_hat += pi_diag[i][i];
    }
    for i in 0..n {
        for j in 0..n {
            if i == j || std[i] <= 0.0 || std[j] <= 0.0 {
                continue;
            }
            let mut theta_ii = 0.0;
            let mut theta_jj = 0.0;
            for row in 0..t {
                let prod = x[(row, i)] * x[(row, j)] - sample[(i, j)];
                theta_ii += (x[(row, i)].powi(2) - sample[(i, i)]) * prod;
                theta_jj += (x[(row, j)].powi(2) - sample[(j, j)]) * prod;
            }
            theta_ii /= t as f64;
            theta_jj /= t as f64;
            rho_hat +=
                (r_bar / 2.0) * ((std[j] / std[i]) * theta_ii + (std[i] / std[j]) * theta_jj);
        }
    }

    let gamma_hat: f64 = (&target - &sample).map(|v| v * v).sum();
    let intensity = if gamma_hat > 0.0 {
        (((pi_hat - rho_hat) / gamma_hat) / t as f64).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let annualize = TRADING_DAYS_PER_YEAR as f64;
    let blend = |delta: f64| -> DMatrix<f64> {
        (&target * delta + &sample * (1.0 - delta)) * annualize
    };

    let mut matrix = blend(intensity);
    let mut used = intensity;
    if matrix.clone().cholesky().is_none() {
        warn!(intensity, "shrunk covariance not positive definite, forcing full shrinkage");
        matrix = blend(1.0);
        used = 1.0;
        if matrix.clone().cholesky().is_none() {
            return Err(DakhlaError::SingularCovariance);
        }
    }

    debug!(intensity = used, assets = n, observations = t, "covariance shrunk");
    Ok(ShrunkCovariance {
        matrix,
        tickers: returns.tickers.clone(),
        intensity: used,
    })
}
