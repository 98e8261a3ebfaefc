//! Raw per-ticker factor inputs.
//!
//! Every guard failure (missing field, non-positive denominator) yields NaN
//! for that input, which standardization later maps to the neutral z-score.
//! Nothing here substitutes fabricated values.

use serde::{Deserialize, Deserializer, Serialize};

use dakhla_traits::{FundamentalsSnapshot, PriceBar};

/// JSON has no NaN; unavailable inputs serialize as `null` and read back
/// as NaN.
fn null_as_nan<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Trading days in the momentum lookback: price(t−1) / price(t−253) − 1.
pub const MOMENTUM_LOOKBACK_DAYS: usize = 252;

/// Raw factor inputs for one ticker. NaN marks an unavailable input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RawFactors {
    /// Trailing free cash flow over market cap.
    #[serde(deserialize_with = "null_as_nan")]
    pub fcf_yield: f64,
    /// Trailing EBIT over market cap.
    #[serde(deserialize_with = "null_as_nan")]
    pub earnings_yield: f64,
    /// EBIT over invested capital (total assets − current liabilities).
    #[serde(deserialize_with = "null_as_nan")]
    pub roic: f64,
    /// Gross profit over revenue.
    #[serde(deserialize_with = "null_as_nan")]
    pub gross_margin: f64,
    /// Twelve-month price return.
    #[serde(deserialize_with = "null_as_nan")]
    pub momentum_12m: f64,
}

impl Default for RawFactors {
    fn default() -> Self {
        Self {
            fcf_yield: f64::NAN,
            earnings_yield: f64::NAN,
            roic: f64::NAN,
            gross_margin: f64::NAN,
            momentum_12m: f64::NAN,
        }
    }
}

impl RawFactors {
    /// Compute raw factors from a fundamentals snapshot and a price history
    /// ending strictly before the cutoff (bars sorted ascending).
    #[must_use]
    pub fn compute(fundamentals: Option<&FundamentalsSnapshot>, bars: &[PriceBar]) -> Self {
        let mut raw = Self {
            momentum_12m: momentum_12m(bars),
            ..Self::default()
        };

        let Some(f) = fundamentals else {
            return raw;
        };

        if let Some(cap) = f.market_cap.filter(|c| *c > 0.0) {
            if let Some(fcf) = f.free_cash_flow {
                raw.fcf_yield = fcf / cap;
            }
            if let Some(ebit) = f.ebit {
                raw.earnings_yield = ebit / cap;
            }
        }

        if let (Some(ebit), Some(assets), Some(liabilities)) =
            (f.ebit, f.total_assets, f.current_liabilities)
        {
            let invested_capital = assets - liabilities;
            if invested_capital > 0.0 {
                raw.roic = ebit / invested_capital;
            }
        }

        if let (Some(gross), Some(revenue)) = (f.gross_profit, f.revenue) {
            if revenue > 0.0 {
                raw.gross_margin = gross / revenue;
            }
        }

        raw
    }

    /// `0.5·fcf_yield + 0.5·earnings_yield` (NaN-propagating).
    #[must_use]
    pub fn value_raw(&self) -> f64 {
        0.5 * self.fcf_yield + 0.5 * self.earnings_yield
    }

    /// `0.5·roic + 0.5·gross_margin` (NaN-propagating).
    #[must_use]
    pub fn quality_raw(&self) -> f64 {
        0.5 * self.roic + 0.5 * self.gross_margin
    }

    /// Whether every input is unavailable.
    #[must_use]
    pub fn is_all_nan(&self) -> bool {
        self.fcf_yield.is_nan()
            && self.earnings_yield.is_nan()
            && self.roic.is_nan()
            && self.gross_margin.is_nan()
            && self.momentum_12m.is_nan()
    }
}

/// Twelve-month momentum from a bar series ending strictly before the
/// cutoff: the last bar over the bar 252 trading days earlier, minus one.
/// NaN with fewer than 253 bars or a non-positive base price.
fn momentum_12m(bars: &[PriceBar]) -> f64 {
    if bars.len() <= MOMENTUM_LOOKBACK_DAYS {
        return f64::NAN;
    }
    let current = bars[bars.len() - 1].adj_close;
    let base = bars[bars.len() - 1 - MOMENTUM_LOOKBACK_DAYS].adj_close;
    if base > 0.0 && current.is_finite() {
        current / base - 1.0
    } else {
        f64::NAN
    }
}
