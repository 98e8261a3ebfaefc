//! Greedy discrete share allocation.
//!
//! Converts fractional target weights into integer share counts: floor
//! division seeds the allocation, then residual cash goes one share at a
//! time to whichever ticker most reduces tracking error against the
//! targets, until no remaining price fits.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use dakhla_traits::{DakhlaError, Result, Ticker};

/// An integer share allocation with its cash accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscreteAllocation {
    /// Shares per ticker (tickers with zero shares are omitted).
    pub shares: BTreeMap<Ticker, u64>,
    /// Capital deployed into shares.
    pub invested: f64,
    /// Cash that no remaining share price fits into.
    pub leftover: f64,
}

impl DiscreteAllocation {
    /// Greedily allocate `capital` across `weights` at the given prices.
    ///
    /// # Errors
    ///
    /// - [`DakhlaError::Config`] for non-positive capital.
    /// - [`DakhlaError::DataIntegrity`] when a weighted ticker has no
    ///   positive price.
    pub fn greedy(
        weights: &BTreeMap<Ticker, f64>,
        prices: &BTreeMap<Ticker, f64>,
        capital: f64,
    ) -> Result<Self> {
        if !(capital > 0.0) {
            return Err(DakhlaError::Config(format!(
                "capital must be positive, got {capital}"
            )));
        }

        let mut tickers: Vec<&Ticker> = Vec::new();
        for (ticker, weight) in weights {
            if *weight <= 0.0 {
                continue;
            }
            match prices.get(ticker) {
                Some(p) if *p > 0.0 && p.is_finite() => tickers.push(ticker),
                _ => {
                    return Err(DakhlaError::DataIntegrity(format!(
                        "no positive price for weighted ticker {ticker}"
                    )))
                }
            }
        }

        // Floor-division seed
        let mut shares: BTreeMap<Ticker, u64> = BTreeMap::new();
        let mut leftover = capital;
        for ticker in &tickers {
            let price = prices[*ticker];
            let count = (weights[*ticker] * capital / price).floor() as u64;
            leftover -= count as f64 * price;
            shares.insert((*ticker).clone(), count);
        }

        // Spend the residual one share at a time, minimizing tracking error.
        loop {
            let mut best: Option<(&Ticker, f64)> = None;
            for ticker in &tickers {
                let price = prices[*ticker];
                if price > leftover + 1e-9 {
                    continue;
                }
                let error = tracking_error(&shares, weights, prices, ticker, capital);
                match best {
                    Some((_, best_error)) if error >= best_error => {}
                    _ => best = Some((ticker, error)),
                }
            }
            let Some((ticker, _)) = best else {
                break;
            };
            leftover -= prices[ticker];
            *shares.get_mut(ticker).expect("seeded above") += 1;
        }

        shares.retain(|_, count| *count > 0);
        let invested: f64 = shares
            .iter()
            .map(|(ticker, count)| *count as f64 * prices[ticker])
            .sum();

        debug!(
            positions = shares.len(),
            invested,
            leftover,
            "discrete allocation complete"
        );
        Ok(Self {
            shares,
            invested,
            leftover: leftover.max(0.0),
        })
    }
}

/// Sum of squared deviations from target weights if `candidate` received
/// one more share.
fn tracking_error(
    shares: &BTreeMap<Ticker, u64>,
    weights: &BTreeMap<Ticker, f64>,
    prices: &BTreeMap<Ticker, f64>,
    candidate: &Ticker,
    capital: f64,
) -> f64 {
    shares
        .iter()
        .map(|(ticker, count)| {
            let mut count = *count as f64;
            if ticker == candidate {
                count += 1.0;
            }
            let actual = count * prices[ticker] / capital;
            (actual - weights[ticker]).powi(2)
        })
        .sum()
}
