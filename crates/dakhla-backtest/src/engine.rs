//! The walk-forward backtest driver.
//!
//! Rebalances are sequential (each depends on the prior portfolio value);
//! the I/O inside each rebalance is parallel via the factor engine's
//! worker pool. A per-rebalance failure skips that rebalance and carries
//! the prior weights; temporal violations abort the whole run.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dakhla_data::{DataCache, UniverseProvider};
use dakhla_factors::FactorEngine;
use dakhla_optimizer::{AllocationResult, BlackLittermanOptimizer, Objective};
use dakhla_traits::{
    DakhlaError, Date, EngineConfig, PriceBar, Result, Ticker, UniverseName,
};

use crate::metrics::{self, SummaryStats};
use crate::schedule::{rebalance_dates, RebalanceFrequency};

/// Calendar days fetched per trading day wanted (trading year ≈ 252 of 365).
const CALENDAR_PER_TRADING: f64 = 1.5;

/// Backtest parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    /// Named universe to trade.
    pub universe: UniverseName,
    /// Explicit ticker list overriding the named universe, when set.
    pub custom_universe: Option<Vec<Ticker>>,
    /// First rebalance no earlier than this date.
    pub start: Date,
    /// Simulation ends here (inclusive).
    pub end: Date,
    /// Rebalance cadence.
    pub frequency: RebalanceFrequency,
    /// Starting capital.
    pub initial_capital: f64,
    /// Optimizer objective per rebalance.
    pub objective: Objective,
    /// One-way transaction cost charged on turnover, in basis points.
    pub transaction_cost_bps: f64,
    /// Cap-ranked universe subset fed to the factor engine.
    pub universe_size: usize,
    /// Engine configuration shared by every rebalance.
    pub engine: EngineConfig,
}

impl BacktestConfig {
    /// A quarterly configuration over the given range with defaults.
    #[must_use]
    pub fn quarterly(universe: UniverseName, start: Date, end: Date) -> Self {
        Self {
            universe,
            custom_universe: None,
            start,
            end,
            frequency: RebalanceFrequency::Quarterly,
            initial_capital: 100_000.0,
            objective: Objective::MaxSharpe,
            transaction_cost_bps: 0.0,
            universe_size: 100,
            engine: EngineConfig::default(),
        }
    }

    fn validated(self) -> Result<Self> {
        if self.start >= self.end {
            return Err(DakhlaError::Config(format!(
                "backtest range {}..{} is empty",
                self.start, self.end
            )));
        }
        if !(self.initial_capital > 0.0) {
            return Err(DakhlaError::Config(format!(
                "initial_capital must be positive, got {}",
                self.initial_capital
            )));
        }
        if self.transaction_cost_bps < 0.0 {
            return Err(DakhlaError::Config(
                "transaction_cost_bps must be non-negative".into(),
            ));
        }
        if self.universe_size == 0 {
            return Err(DakhlaError::Config("universe_size must be at least 1".into()));
        }
        let engine = self.engine.validated()?;
        Ok(Self { engine, ..self })
    }
}

/// What happened at one scheduled rebalance date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RebalanceRecord {
    /// Scheduled date.
    pub date: Date,
    /// Target weights in force after this date.
    pub weights: BTreeMap<Ticker, f64>,
    /// One-way turnover against the prior weights.
    pub turnover: f64,
    /// Cost charged on that turnover.
    pub transaction_cost: f64,
    /// The optimizer fell back to equal weight.
    pub degraded: bool,
    /// The rebalance failed and prior weights were carried.
    pub skipped: bool,
}

/// Output of a completed backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Portfolio value per simulated trading day.
    pub equity_curve: Vec<(Date, f64)>,
    /// Per-rebalance records.
    pub rebalances: Vec<RebalanceRecord>,
    /// Daily portfolio returns.
    pub daily_returns: Vec<f64>,
    /// Summary statistics.
    pub summary: SummaryStats,
}

/// Walk-forward scheduler over the rebalance dates.
pub struct BacktestEngine {
    cache: Arc<DataCache>,
    config: BacktestConfig,
    optimizer: BlackLittermanOptimizer,
    cancel: Option<Arc<AtomicBool>>,
}

impl BacktestEngine {
    /// Build an engine over a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`DakhlaError::Config`] on invalid parameters.
    pub fn new(cache: Arc<DataCache>, config: BacktestConfig) -> Result<Self> {
        let config = config.validated()?;
        let optimizer = BlackLittermanOptimizer::new(config.engine.clone())?;
        Ok(Self {
            cache,
            config,
            optimizer,
            cancel: None,
        })
    }

    /// Attach a cancellation flag, checked before each rebalance.
    #[must_use]
    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Run the walk-forward loop.
    ///
    /// # Errors
    ///
    /// - [`DakhlaError::Config`] when the range contains no rebalance date.
    /// - [`DakhlaError::TemporalViolation`] (fatal) from any rebalance.
    /// - [`DakhlaError::Cancelled`] when the cancel flag is raised; the
    ///   partially completed run is discarded.
    pub async fn run(&self) -> Result<BacktestResult> {
        let dates = rebalance_dates(self.config.start, self.config.end, self.config.frequency);
        if dates.is_empty() {
            return Err(DakhlaError::Config(format!(
                "no rebalance dates in {}..{}",
                self.config.start, self.config.end
            )));
        }
        info!(
            universe = %self.config.universe,
            rebalances = dates.len(),
            "backtest starting"
        );

        let provider = UniverseProvider::new(Arc::clone(&self.cache));
        let mut value = self.config.initial_capital;
        let mut weights: BTreeMap<Ticker, f64> = BTreeMap::new();
        let mut equity_curve: Vec<(Date, f64)> = Vec::new();
        let mut daily_returns: Vec<f64> = Vec::new();
        let mut rebalances: Vec<RebalanceRecord> = Vec::new();

        for (idx, &date) in dates.iter().enumerate() {
            if let Some(cancel) = &self.cancel {
                if cancel.load(Ordering::Relaxed) {
                    return Err(DakhlaError::Cancelled);
                }
            }

            let period_end = dates
                .get(idx + 1)
                .copied()
                .unwrap_or(self.config.end + Duration::days(1));

            match self.rebalance(&provider, date).await {
                Ok(result) => {
                    let turnover = metrics::turnover(&weights, &result.weights);
                    let cost = turnover * self.config.transaction_cost_bps / 10_000.0;
                    value *= 1.0 - cost;
                    weights = result.weights.clone();
                    rebalances.push(RebalanceRecord {
                        date,
                        weights: result.weights,
                        turnover,
                        transaction_cost: cost,
                        degraded: result.degraded,
                        skipped: false,
                    });
                }
                Err(err @ (DakhlaError::TemporalViolation(_) | DakhlaError::Cancelled)) => {
                    return Err(err)
                }
                Err(err) => {
                    warn!(%date, %err, "rebalance failed, carrying prior portfolio");
                    rebalances.push(RebalanceRecord {
                        date,
                        weights: weights.clone(),
                        turnover: 0.0,
                        transaction_cost: 0.0,
                        degraded: false,
                        skipped: true,
                    });
                }
            }

            let period = self
                .simulate_period(&weights, date, period_end, value)
                .await?;
            for (date, day_return, day_value) in period {
                daily_returns.push(day_return);
                equity_curve.push((date, day_value));
                value = day_value;
            }
        }

        let total_return = value / self.config.initial_capital - 1.0;
        let n_days = daily_returns.len().max(1);
        let annualized_return = (1.0 + total_return)
            .powf(dakhla_traits::TRADING_DAYS_PER_YEAR as f64 / n_days as f64)
            - 1.0;
        let executed: Vec<&RebalanceRecord> = rebalances.iter().filter(|r| !r.skipped).collect();
        let avg_turnover = if executed.is_empty() {
            0.0
        } else {
            executed.iter().map(|r| r.turnover).sum::<f64>() / executed.len() as f64
        };
        let curve_values: Vec<f64> = equity_curve.iter().map(|(_, v)| *v).collect();

        let summary = SummaryStats {
            total_return,
            annualized_return,
            annualized_volatility: metrics::annualized_volatility(&daily_returns),
            sharpe_ratio: metrics::sharpe_ratio(&daily_returns),
            max_drawdown: metrics::max_drawdown(&curve_values),
            avg_turnover,
            n_rebalances: executed.len(),
            n_skipped: rebalances.len() - executed.len(),
        };
        info!(
            total_return,
            max_drawdown = summary.max_drawdown,
            skipped = summary.n_skipped,
            "backtest complete"
        );

        Ok(BacktestResult {
            equity_curve,
            rebalances,
            daily_returns,
            summary,
        })
    }

    /// One rebalance: universe as of `date`, factor scores pinned to
    /// `date`, optimizer over the covariance window ending at `date`.
    async fn rebalance(&self, provider: &UniverseProvider, date: Date) -> Result<AllocationResult> {
        let entries = match &self.config.custom_universe {
            Some(tickers) => provider.load_tickers(tickers.clone(), date).await?,
            None => provider.load(self.config.universe, date).await?,
        };
        if entries.is_empty() {
            return Err(DakhlaError::NotFound(format!(
                "universe resolved empty as of {date}"
            )));
        }
        let entries = UniverseProvider::top_n(&entries, self.config.universe_size);
        let tickers: Vec<Ticker> = entries.iter().map(|e| e.ticker.clone()).collect();

        let mut engine = FactorEngine::new(
            tickers,
            date,
            Arc::clone(&self.cache),
            self.config.engine.clone(),
        )?;
        if let Some(cancel) = &self.cancel {
            engine = engine.with_cancel(Arc::clone(cancel));
        }
        let scores = engine.compute().await?;

        let selected = scores.top_n(self.config.engine.top_n);
        let lookback_calendar =
            (self.config.engine.covariance_lookback_days as f64 * CALENDAR_PER_TRADING) as i64;
        let window_start = date - Duration::days(lookback_calendar);

        let mut history: BTreeMap<Ticker, Vec<PriceBar>> = BTreeMap::new();
        for ticker in &selected {
            let bars = match self.cache.get_prices(ticker, window_start, date).await {
                Ok(bars) => bars,
                Err(DakhlaError::StaleData { .. }) => {
                    warn!(%ticker, "covariance window using stale cached prices");
                    self.cache.read_cached_prices(ticker, window_start, date)?
                }
                Err(err) => return Err(err),
            };
            history.insert(ticker.clone(), bars);
        }

        self.optimizer
            .optimize(&scores, &entries, &history, self.config.objective, None)
    }

    /// Simulate the portfolio from `start` (inclusive) to `end` (exclusive)
    /// holding `weights` fixed, compounding daily returns on adjusted
    /// closes. Returns `(date, daily_return, value)` per trading day.
    async fn simulate_period(
        &self,
        weights: &BTreeMap<Ticker, f64>,
        start: Date,
        end: Date,
        mut value: f64,
    ) -> Result<Vec<(Date, f64, f64)>> {
        if weights.is_empty() {
            return Ok(Vec::new());
        }

        // A few days of lead-in supplies the base price for the first
        // return of the period.
        let fetch_start = start - Duration::days(7);
        let mut series: BTreeMap<&Ticker, BTreeMap<Date, f64>> = BTreeMap::new();
        for ticker in weights.keys() {
            let bars = match self.cache.get_prices(ticker, fetch_start, end).await {
                Ok(bars) => bars,
                Err(DakhlaError::StaleData { .. }) => {
                    self.cache.read_cached_prices(ticker, fetch_start, end)?
                }
                Err(err) => {
                    warn!(%ticker, %err, "no simulation data, holding flat");
                    return Ok(Vec::new());
                }
            };
            series.insert(ticker, bars.iter().map(|b| (b.date, b.adj_close)).collect());
        }

        // Trade only dates every held ticker has.
        let mut common: Option<BTreeSet<Date>> = None;
        for prices in series.values() {
            let dates: BTreeSet<Date> = prices.keys().copied().collect();
            common = Some(match common {
                None => dates,
                Some(prev) => prev.intersection(&dates).copied().collect(),
            });
        }
        let common: Vec<Date> = common.unwrap_or_default().into_iter().collect();

        let mut path = Vec::new();
        for window in common.windows(2) {
            let (prev, day) = (window[0], window[1]);
            if day < start {
                continue;
            }
            let day_return: f64 = weights
                .iter()
                .map(|(ticker, w)| {
                    let prices = &series[ticker];
                    let base = prices[&prev];
                    if base > 0.0 {
                        w * (prices[&day] / base - 1.0)
                    } else {
                        0.0
                    }
                })
                .sum();
            value *= 1.0 + day_return;
            path.push((day, day_return, value));
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use dakhla_data::{CacheSettings, RateLimiter, StaticSource};
    use dakhla_traits::FundamentalsSnapshot;

    fn day(y: i32, m: u32, d: u32) -> Date {
        Date::from_ymd_opt(y, m, d).unwrap()
    }

    /// Daily bars from `from` to `to` following a deterministic oscillating
    /// path with per-ticker drift.
    fn path_bars(from: Date, to: Date, base: f64, drift: f64, period: usize) -> Vec<PriceBar> {
        let mut bars = Vec::new();
        let mut date = from;
        let mut i = 0usize;
        while date < to {
            let cycle = (i % period) as f64 / period as f64;
            let price = base * (1.0 + drift * i as f64 / 1000.0) * (1.0 + 0.03 * (cycle - 0.5));
            bars.push(PriceBar::flat(date, price));
            date = date + Duration::days(1);
            i += 1;
        }
        bars
    }

    fn snapshot_for(ticker: &str, cap: f64, published: Date) -> FundamentalsSnapshot {
        FundamentalsSnapshot {
            free_cash_flow: Some(cap * 0.05),
            ebit: Some(cap * 0.07),
            total_assets: Some(cap * 0.9),
            current_liabilities: Some(cap * 0.2),
            gross_profit: Some(cap * 0.3),
            revenue: Some(cap * 0.8),
            market_cap: Some(cap),
            sector: Some("Test".into()),
            ..FundamentalsSnapshot::empty(ticker, published, published)
        }
    }

    /// Five tickers with daily history and fundamentals up to `data_end`;
    /// nothing dated at or after `data_end` exists in the source.
    fn five_ticker_source(data_end: Date) -> Arc<StaticSource> {
        let source = StaticSource::new();
        let from = day(2018, 1, 1);
        let late_report = day(2020, 5, 15);
        for (i, ticker) in ["AAA", "BBB", "CCC", "DDD", "EEE"].iter().enumerate() {
            source.set_prices(
                *ticker,
                path_bars(from, data_end, 40.0 + 15.0 * i as f64, 0.4 + 0.2 * i as f64, 5 + i),
            );
            source.add_fundamentals(
                *ticker,
                snapshot_for(ticker, 1.0e10 * (5 - i) as f64, day(2019, 11, 15)),
            );
            if data_end > late_report {
                // A later report that only post-June-2020 rebalances see.
                source.add_fundamentals(
                    *ticker,
                    snapshot_for(ticker, 1.1e10 * (5 - i) as f64, late_report),
                );
            }
        }
        Arc::new(source)
    }

    fn cache_for(dir: &std::path::Path, source: Arc<StaticSource>) -> Arc<DataCache> {
        Arc::new(
            DataCache::open(
                dir,
                source.clone(),
                source,
                Arc::new(RateLimiter::per_minute(600_000)),
                CacheSettings {
                    ttl: std::time::Duration::ZERO,
                    ..CacheSettings::default()
                },
            )
            .unwrap(),
        )
    }

    fn config_2020() -> BacktestConfig {
        BacktestConfig {
            custom_universe: Some(
                ["AAA", "BBB", "CCC", "DDD", "EEE"]
                    .iter()
                    .map(|t| t.to_string())
                    .collect(),
            ),
            universe_size: 5,
            transaction_cost_bps: 10.0,
            engine: EngineConfig {
                top_n: 5,
                ..EngineConfig::default()
            },
            ..BacktestConfig::quarterly(UniverseName::Sp500, day(2020, 1, 1), day(2020, 12, 31))
        }
    }

    #[tokio::test]
    async fn test_quarterly_walk_forward() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_for(dir.path(), five_ticker_source(day(2021, 1, 15)));
        let engine = BacktestEngine::new(cache, config_2020()).unwrap();

        let result = engine.run().await.unwrap();

        assert_eq!(result.rebalances.len(), 4);
        assert_eq!(result.summary.n_rebalances, 4);
        assert_eq!(result.summary.n_skipped, 0);
        assert!(!result.equity_curve.is_empty());

        for record in &result.rebalances {
            let sum: f64 = record.weights.values().sum();
            assert_relative_eq!(sum, 1.0, epsilon = 1e-6);
            for w in record.weights.values() {
                assert!(*w >= 0.0 && *w <= 0.30 + 1e-6);
            }
        }

        // Equity curve accounting: final value consistent with returns
        let final_value = result.equity_curve.last().unwrap().1;
        assert_relative_eq!(
            result.summary.total_return,
            final_value / 100_000.0 - 1.0,
            epsilon = 1e-9
        );
        assert!(result.summary.max_drawdown >= 0.0);

        // First rebalance buys in from cash: cost charged on 0.5 turnover
        assert_relative_eq!(result.rebalances[0].turnover, 0.5, epsilon = 1e-9);
        assert!(result.rebalances[0].transaction_cost > 0.0);
    }

    #[tokio::test]
    async fn test_april_rebalance_ignores_future_data() {
        // Run once with full history, once with every datum from
        // 2020-04-01 onward deleted. The 2020-04-01 rebalance must be
        // bitwise identical.
        let cutoff = day(2020, 4, 1);

        let dir_full = tempfile::tempdir().unwrap();
        let full = BacktestEngine::new(
            cache_for(dir_full.path(), five_ticker_source(day(2021, 1, 15))),
            config_2020(),
        )
        .unwrap()
        .run()
        .await
        .unwrap();

        let truncated_source = five_ticker_source(cutoff);
        let dir_cut = tempfile::tempdir().unwrap();
        let truncated = BacktestEngine::new(
            cache_for(dir_cut.path(), truncated_source),
            config_2020(),
        )
        .unwrap()
        .run()
        .await
        .unwrap();

        let full_april = full.rebalances.iter().find(|r| r.date == cutoff).unwrap();
        let cut_april = truncated
            .rebalances
            .iter()
            .find(|r| r.date == cutoff)
            .unwrap();

        assert!(!full_april.skipped && !cut_april.skipped);
        assert_eq!(
            full_april.weights, cut_april.weights,
            "April weights must depend only on data before 2020-04-01"
        );
    }

    /// Delegates to a [`StaticSource`], but any price window reaching past
    /// the outage date fails as if the vendor lost coverage.
    struct OutageAfter {
        inner: Arc<StaticSource>,
        outage: Date,
    }

    #[async_trait::async_trait]
    impl dakhla_traits::PriceSource for OutageAfter {
        async fn get_history(&self, ticker: &str, start: Date, end: Date) -> Result<Vec<PriceBar>> {
            if end > self.outage {
                return Err(DakhlaError::NotFound(format!("{ticker} coverage lost")));
            }
            self.inner.get_history(ticker, start, end).await
        }
    }

    #[async_trait::async_trait]
    impl dakhla_traits::FundamentalsSource for OutageAfter {
        async fn get_latest(
            &self,
            ticker: &str,
            as_of: Date,
        ) -> Result<FundamentalsSnapshot> {
            self.inner.get_latest(ticker, as_of).await
        }
    }

    #[tokio::test]
    async fn test_failed_rebalance_is_skipped_and_carried() {
        // The vendor loses price coverage in June: the July and October
        // rebalances cannot score the universe and must be skipped,
        // carrying the prior portfolio.
        let dir = tempfile::tempdir().unwrap();
        let outage = Arc::new(OutageAfter {
            inner: five_ticker_source(day(2021, 1, 15)),
            outage: day(2020, 6, 1),
        });
        let cache = Arc::new(
            DataCache::open(
                dir.path(),
                outage.clone(),
                outage,
                Arc::new(RateLimiter::per_minute(600_000)),
                CacheSettings {
                    ttl: std::time::Duration::ZERO,
                    ..CacheSettings::default()
                },
            )
            .unwrap(),
        );
        let engine = BacktestEngine::new(cache, config_2020()).unwrap();

        let result = engine.run().await.unwrap();

        assert_eq!(result.rebalances.len(), 4);
        assert!(result.summary.n_skipped >= 1);

        let july = result.rebalances.iter().find(|r| r.date == day(2020, 7, 1)).unwrap();
        assert!(july.skipped);
        let april = result.rebalances.iter().find(|r| r.date == day(2020, 4, 1)).unwrap();
        assert_eq!(
            july.weights, april.weights,
            "skipped rebalance carries the prior weights"
        );
    }

    #[tokio::test]
    async fn test_cancellation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_for(dir.path(), five_ticker_source(day(2021, 1, 15)));
        let cancel = Arc::new(AtomicBool::new(true));
        let engine = BacktestEngine::new(cache, config_2020())
            .unwrap()
            .with_cancel(cancel);

        assert!(matches!(engine.run().await, Err(DakhlaError::Cancelled)));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_for(dir.path(), five_ticker_source(day(2021, 1, 15)));
        let config = BacktestConfig {
            initial_capital: 0.0,
            ..config_2020()
        };
        assert!(matches!(
            BacktestEngine::new(cache, config),
            Err(DakhlaError::Config(_))
        ));
    }
}
