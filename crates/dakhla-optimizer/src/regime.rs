//! Market regime detection.
//!
//! Classifies market state from two signals: the index price against its
//! 200-day simple moving average, and the short/long volatility-index
//! ratio (contango vs. backwardation). Agreement gives RISK_ON or
//! RISK_OFF; disagreement is CAUTION. The detector memoizes its last
//! result for a configurable duration.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use dakhla_traits::{DakhlaError, PriceBar, Result};

/// Market regime states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    /// Both signals bullish.
    RiskOn,
    /// Signals disagree, or only the trend signal is available and weak.
    Caution,
    /// Both signals bearish.
    RiskOff,
}

impl std::fmt::Display for Regime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::RiskOn => "RISK_ON",
            Self::Caution => "CAUTION",
            Self::RiskOff => "RISK_OFF",
        };
        f.write_str(s)
    }
}

/// Short- and long-dated volatility index levels (e.g. VIX9D / VIX3M).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolTermStructure {
    /// Short-dated implied volatility level.
    pub short: f64,
    /// Long-dated implied volatility level.
    pub long: f64,
}

impl VolTermStructure {
    /// Short over long; below 1 is contango (calm), at or above 1 is
    /// backwardation (stress).
    #[must_use]
    pub fn ratio(&self) -> f64 {
        self.short / self.long
    }
}

/// Regime classification with its inputs, for reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeSignal {
    /// Classified regime.
    pub regime: Regime,
    /// Percent distance of the index from its 200-day SMA.
    pub signal_strength: f64,
    /// Last index close used.
    pub index_price: f64,
    /// The 200-day simple moving average.
    pub sma_200: f64,
    /// Short/long volatility ratio, when supplied.
    pub vol_ratio: Option<f64>,
    /// Bars that fed the calculation.
    pub data_points: usize,
}

/// Classifies market state from an index series and the volatility term
/// structure.
pub struct RegimeDetector {
    sma_window: usize,
    cache_ttl: Duration,
    memo: Mutex<Option<(Instant, RegimeSignal)>>,
}

impl Default for RegimeDetector {
    fn default() -> Self {
        Self::new(200, Duration::from_secs(3600))
    }
}

impl RegimeDetector {
    /// A detector with the given moving-average window and memo TTL.
    #[must_use]
    pub fn new(sma_window: usize, cache_ttl: Duration) -> Self {
        Self {
            sma_window,
            cache_ttl,
            memo: Mutex::new(None),
        }
    }

    /// Classify from index bars (sorted ascending) and, optionally, the
    /// volatility term structure.
    ///
    /// # Errors
    ///
    /// Returns [`DakhlaError::DataIntegrity`] with fewer bars than the SMA
    /// window needs.
    pub fn classify(
        &self,
        index_bars: &[PriceBar],
        vol_term: Option<VolTermStructure>,
    ) -> Result<RegimeSignal> {
        if index_bars.len() < self.sma_window {
            return Err(DakhlaError::DataIntegrity(format!(
                "{} index bars, need {} for the moving average",
                index_bars.len(),
                self.sma_window
            )));
        }

        let window = &index_bars[index_bars.len() - self.sma_window..];
        let sma = window.iter().map(|b| b.adj_close).sum::<f64>() / self.sma_window as f64;
        let price = index_bars.last().expect("len checked").adj_close;
        let trend_on = price > sma;
        let signal_strength = (price - sma) / sma * 100.0;

        let vol_ratio = vol_term.map(|v| v.ratio());
        let regime = match vol_ratio {
            Some(ratio) => {
                let vol_on = ratio < 1.0;
                match (trend_on, vol_on) {
                    (true, true) => Regime::RiskOn,
                    (false, false) => Regime::RiskOff,
                    _ => Regime::Caution,
                }
            }
            // Trend-only classification when no volatility data is supplied.
            None if trend_on => Regime::RiskOn,
            None => Regime::RiskOff,
        };

        let signal = RegimeSignal {
            regime,
            signal_strength,
            index_price: price,
            sma_200: sma,
            vol_ratio,
            data_points: index_bars.len(),
        };
        debug!(%regime, signal_strength, ?vol_ratio, "regime classified");
        Ok(signal)
    }

    /// Classify with memoization: returns the previous result while it is
    /// younger than the TTL.
    pub fn classify_cached(
        &self,
        index_bars: &[PriceBar],
        vol_term: Option<VolTermStructure>,
    ) -> Result<RegimeSignal> {
        {
            let memo = self.memo.lock().expect("memo poisoned");
            if let Some((at, signal)) = memo.as_ref() {
                if at.elapsed() < self.cache_ttl {
                    return Ok(signal.clone());
                }
            }
        }

        let signal = self.classify(index_bars, vol_term)?;
        *self.memo.lock().expect("memo poisoned") = Some((Instant::now(), signal.clone()));
        Ok(signal)
    }

    /// Drop the memoized result.
    pub fn clear_cache(&self) {
        *self.memo.lock().expect("memo poisoned") = None;
    }
}
