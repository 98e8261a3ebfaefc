//! The factor computation engine.
//!
//! `FactorEngine` is constructed for one universe and one `as_of` date; the
//! date is the single hinge of temporal correctness and every fetch is
//! filtered to strictly-before it. Fetching runs over a bounded worker
//! pool; all fetches complete before any factor math begins.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Duration;
use futures::stream::StreamExt;
use tracing::{debug, info, warn};

use dakhla_data::DataCache;
use dakhla_traits::stats::{population_std, zscore};
use dakhla_traits::{
    DakhlaError, Date, EngineConfig, FundamentalsSnapshot, PriceBar, Result, Ticker,
};

use crate::raw::RawFactors;
use crate::scores::{FactorScores, FactorUniverseStats, ScoreSet};

/// Tickers fetched per batch.
pub const FETCH_BATCH_SIZE: usize = 50;

/// Concurrent fetches within a batch.
pub const FETCH_WORKERS: usize = 8;

/// Calendar days of price history requested, sized to yield at least the
/// 252 trading days momentum needs plus slack for holidays.
const PRICE_LOOKBACK_CALENDAR_DAYS: i64 = 423;

struct TickerData {
    ticker: Ticker,
    fundamentals: Option<FundamentalsSnapshot>,
    bars: Vec<PriceBar>,
}

/// Computes point-in-time factor scores for a universe.
pub struct FactorEngine {
    tickers: Vec<Ticker>,
    as_of: Date,
    cache: Arc<DataCache>,
    config: EngineConfig,
    cancel: Option<Arc<AtomicBool>>,
}

impl FactorEngine {
    /// Build an engine for the given tickers and cutoff.
    ///
    /// Tickers are uppercased, deduplicated, and sorted; the config is
    /// validated here so later stages can assume its invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DakhlaError::Config`] for an empty universe or an invalid
    /// configuration.
    pub fn new(
        tickers: Vec<Ticker>,
        as_of: Date,
        cache: Arc<DataCache>,
        config: EngineConfig,
    ) -> Result<Self> {
        let config = config.validated()?;
        let mut tickers: Vec<Ticker> = tickers.into_iter().map(|t| t.to_uppercase()).collect();
        tickers.sort();
        tickers.dedup();
        if tickers.is_empty() {
            return Err(DakhlaError::Config("universe is empty".into()));
        }
        Ok(Self {
            tickers,
            as_of,
            cache,
            config,
            cancel: None,
        })
    }

    /// Attach a cancellation flag, checked between fetch batches.
    #[must_use]
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// The point-in-time cutoff.
    #[must_use]
    pub fn as_of(&self) -> Date {
        self.as_of
    }

    /// The normalized universe.
    #[must_use]
    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    /// Fetch inputs, compute raw factors, standardize, and rank.
    ///
    /// Individual ticker failures are tolerated (the ticker is dropped with
    /// a log entry); losing more than half of the requested universe is
    /// [`DakhlaError::UniverseTooSparse`]. A datum dated at or after
    /// `as_of` anywhere in the inputs aborts with
    /// [`DakhlaError::TemporalViolation`].
    pub async fn compute(&self) -> Result<ScoreSet> {
        let data = self.fetch_all().await?;

        let requested = self.tickers.len();
        if data.len() * 2 < requested {
            return Err(DakhlaError::UniverseTooSparse {
                requested,
                resolved: data.len(),
            });
        }

        Ok(self.score(data))
    }

    async fn fetch_all(&self) -> Result<Vec<TickerData>> {
        let start = self.as_of - Duration::days(PRICE_LOOKBACK_CALENDAR_DAYS);
        let mut kept: Vec<TickerData> = Vec::with_capacity(self.tickers.len());

        for batch in self.tickers.chunks(FETCH_BATCH_SIZE) {
            if let Some(cancel) = &self.cancel {
                if cancel.load(Ordering::Relaxed) {
                    return Err(DakhlaError::Cancelled);
                }
            }

            let mut stream = futures::stream::iter(batch.iter().map(|ticker| {
                let cache = Arc::clone(&self.cache);
                let ticker = ticker.clone();
                let as_of = self.as_of;
                async move { fetch_one(&cache, ticker, start, as_of).await }
            }))
            .buffer_unordered(FETCH_WORKERS);

            while let Some(result) = stream.next().await {
                if let Some(data) = result? {
                    kept.push(data);
                }
            }
        }

        kept.sort_by(|a, b| a.ticker.cmp(&b.ticker));
        debug!(
            requested = self.tickers.len(),
            resolved = kept.len(),
            as_of = %self.as_of,
            "universe fetch complete"
        );
        Ok(kept)
    }

    fn score(&self, data: Vec<TickerData>) -> ScoreSet {
        let raws: Vec<RawFactors> = data
            .iter()
            .map(|d| RawFactors::compute(d.fundamentals.as_ref(), &d.bars))
            .collect();

        let limit = self.config.winsorize_limit;
        let (value_z, value_stats) =
            zscore(&raws.iter().map(RawFactors::value_raw).collect::<Vec<_>>(), limit);
        let (quality_z, quality_stats) =
            zscore(&raws.iter().map(RawFactors::quality_raw).collect::<Vec<_>>(), limit);
        let (momentum_z, momentum_stats) =
            zscore(&raws.iter().map(|r| r.momentum_12m).collect::<Vec<_>>(), limit);

        let w = self.config.factor_weights;
        let totals: Vec<f64> = (0..raws.len())
            .map(|i| w.value * value_z[i] + w.quality * quality_z[i] + w.momentum * momentum_z[i])
            .collect();

        // Rank descending by composite; ties break on ticker so output is
        // reproducible bit for bit.
        let mut order: Vec<usize> = (0..raws.len()).collect();
        order.sort_by(|&a, &b| {
            totals[b]
                .partial_cmp(&totals[a])
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| data[a].ticker.cmp(&data[b].ticker))
        });

        let n = raws.len();
        let mut scores = BTreeMap::new();
        for (position, &i) in order.iter().enumerate() {
            let rank = position + 1;
            scores.insert(
                data[i].ticker.clone(),
                FactorScores {
                    raw: raws[i],
                    value_z: value_z[i],
                    quality_z: quality_z[i],
                    momentum_z: momentum_z[i],
                    total_score: totals[i],
                    rank,
                    percentile: 1.0 - (rank - 1) as f64 / n as f64,
                    factor_std: population_std(&[value_z[i], quality_z[i], momentum_z[i]]),
                },
            );
        }

        info!(universe = n, as_of = %self.as_of, "factor scores computed");
        ScoreSet {
            as_of: self.as_of,
            scores,
            stats: FactorUniverseStats {
                value: value_stats,
                quality: quality_stats,
                momentum: momentum_stats,
            },
        }
    }
}

/// Fetch one ticker's inputs. `Ok(None)` drops the ticker; `Err` aborts the
/// whole computation (temporal violations and cancellation only).
async fn fetch_one(
    cache: &DataCache,
    ticker: Ticker,
    start: Date,
    as_of: Date,
) -> Result<Option<TickerData>> {
    let bars = match cache.get_prices(&ticker, start, as_of).await {
        Ok(bars) => bars,
        Err(DakhlaError::StaleData { .. }) => {
            // Expired cache with a failed refresh: accept the stale copy
            // rather than dropping the ticker.
            warn!(%ticker, "using stale cached prices");
            cache.read_cached_prices(&ticker, start, as_of)?
        }
        Err(err @ DakhlaError::TemporalViolation(_)) => return Err(err),
        Err(err) => {
            warn!(%ticker, %err, "dropped: price history unavailable");
            return Ok(None);
        }
    };

    if bars.is_empty() {
        warn!(%ticker, "dropped: no price history before cutoff");
        return Ok(None);
    }
    if let Some(bad) = bars.iter().find(|b| b.date >= as_of) {
        return Err(DakhlaError::TemporalViolation(format!(
            "{ticker} bar dated {} reached the {as_of} computation",
            bad.date
        )));
    }

    let fundamentals = match cache.get_fundamentals(&ticker, as_of).await {
        Ok(snap) => Some(snap),
        Err(err @ DakhlaError::TemporalViolation(_)) => return Err(err),
        Err(err) => {
            // The ticker stays in the universe with neutral fundamental
            // factors; only missing price history excludes it.
            debug!(%ticker, %err, "no usable fundamentals, factors neutral");
            None
        }
    };

    Ok(Some(TickerData {
        ticker,
        fundamentals,
        bars,
    }))
}
