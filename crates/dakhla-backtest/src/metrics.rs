//! Performance metrics over an equity curve.

use serde::{Deserialize, Serialize};

use dakhla_traits::TRADING_DAYS_PER_YEAR;

/// Summary statistics of a completed backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    /// Total return over the full period.
    pub total_return: f64,
    /// Geometric annualized return.
    pub annualized_return: f64,
    /// Annualized volatility of daily portfolio returns.
    pub annualized_volatility: f64,
    /// Annualized Sharpe ratio of daily portfolio returns.
    pub sharpe_ratio: f64,
    /// Maximum peak-to-trough drawdown, as a positive fraction.
    pub max_drawdown: f64,
    /// Mean one-way turnover across rebalances.
    pub avg_turnover: f64,
    /// Rebalances executed.
    pub n_rebalances: usize,
    /// Rebalances skipped after failures.
    pub n_skipped: usize,
}

/// Annualized Sharpe ratio of a daily return series.
#[must_use]
pub fn sharpe_ratio(daily_returns: &[f64]) -> f64 {
    let valid: Vec<f64> = daily_returns
        .iter()
        .copied()
        .filter(|r| r.is_finite())
        .collect();
    if valid.len() < 2 {
        return f64::NAN;
    }

    let mean = valid.iter().sum::<f64>() / valid.len() as f64;
    let variance =
        valid.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (valid.len() - 1) as f64;
    let std = variance.sqrt();
    if std == 0.0 {
        f64::NAN
    } else {
        mean / std * (TRADING_DAYS_PER_YEAR as f64).sqrt()
    }
}

/// Annualized volatility of a daily return series.
#[must_use]
pub fn annualized_volatility(daily_returns: &[f64]) -> f64 {
    let valid: Vec<f64> = daily_returns
        .iter()
        .copied()
        .filter(|r| r.is_finite())
        .collect();
    if valid.len() < 2 {
        return f64::NAN;
    }
    let mean = valid.iter().sum::<f64>() / valid.len() as f64;
    let variance =
        valid.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (valid.len() - 1) as f64;
    variance.sqrt() * (TRADING_DAYS_PER_YEAR as f64).sqrt()
}

/// Maximum drawdown of an equity-value series, as a positive fraction.
#[must_use]
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0;
    for &value in values {
        if value > peak {
            peak = value;
        }
        if peak > 0.0 {
            let dd = (peak - value) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

/// One-way turnover between two weight maps: half the L1 distance.
#[must_use]
pub fn turnover(
    old: &std::collections::BTreeMap<String, f64>,
    new: &std::collections::BTreeMap<String, f64>,
) -> f64 {
    let tickers: std::collections::BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    tickers
        .into_iter()
        .map(|t| {
            let before = old.get(t).copied().unwrap_or(0.0);
            let after = new.get(t).copied().unwrap_or(0.0);
            (after - before).abs()
        })
        .sum::<f64>()
        / 2.0
}
