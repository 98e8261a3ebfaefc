//! Deterministic in-memory data source.
//!
//! `StaticSource` serves pre-loaded bars and fundamentals, for offline runs
//! and for tests that substitute the network layer with a double. Content
//! can be replaced after construction, so a test can perturb "future" data
//! and re-run a computation against the same handles.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use dakhla_traits::{
    DakhlaError, Date, FundamentalsSnapshot, FundamentalsSource, PriceBar, PriceSource, Result,
    Ticker,
};

#[derive(Debug, Default)]
struct Inner {
    prices: BTreeMap<Ticker, Vec<PriceBar>>,
    fundamentals: BTreeMap<Ticker, Vec<FundamentalsSnapshot>>,
}

/// In-memory implementation of both source traits.
#[derive(Debug, Default)]
pub struct StaticSource {
    inner: RwLock<Inner>,
}

impl StaticSource {
    /// An empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the full bar history for a ticker (sorted on insert).
    #[must_use]
    pub fn with_prices(self, ticker: impl Into<Ticker>, bars: Vec<PriceBar>) -> Self {
        self.set_prices(ticker, bars);
        self
    }

    /// Append a fundamentals snapshot for a ticker.
    #[must_use]
    pub fn with_fundamentals(self, ticker: impl Into<Ticker>, snap: FundamentalsSnapshot) -> Self {
        self.add_fundamentals(ticker, snap);
        self
    }

    /// Replace the bar history for a ticker.
    pub fn set_prices(&self, ticker: impl Into<Ticker>, mut bars: Vec<PriceBar>) {
        bars.sort_by_key(|b| b.date);
        let mut inner = self.inner.write().expect("source poisoned");
        inner.prices.insert(ticker.into().to_uppercase(), bars);
    }

    /// Append a fundamentals snapshot for a ticker.
    pub fn add_fundamentals(&self, ticker: impl Into<Ticker>, snap: FundamentalsSnapshot) {
        let mut inner = self.inner.write().expect("source poisoned");
        inner
            .fundamentals
            .entry(ticker.into().to_uppercase())
            .or_default()
            .push(snap);
    }

    /// Apply a mutation to every stored bar of a ticker.
    pub fn mutate_prices(&self, ticker: &str, f: impl Fn(&mut PriceBar)) {
        let mut inner = self.inner.write().expect("source poisoned");
        if let Some(bars) = inner.prices.get_mut(&ticker.to_uppercase()) {
            for bar in bars.iter_mut() {
                f(bar);
            }
        }
    }
}

#[async_trait]
impl PriceSource for StaticSource {
    async fn get_history(&self, ticker: &str, start: Date, end: Date) -> Result<Vec<PriceBar>> {
        let inner = self.inner.read().expect("source poisoned");
        let bars = inner
            .prices
            .get(&ticker.to_uppercase())
            .ok_or_else(|| DakhlaError::NotFound(format!("no price fixture for {ticker}")))?;
        Ok(bars
            .iter()
            .filter(|b| b.date >= start && b.date < end)
            .copied()
            .collect())
    }
}

#[async_trait]
impl FundamentalsSource for StaticSource {
    async fn get_latest(&self, ticker: &str, as_of: Date) -> Result<FundamentalsSnapshot> {
        let inner = self.inner.read().expect("source poisoned");
        let snaps = inner
            .fundamentals
            .get(&ticker.to_uppercase())
            .ok_or_else(|| DakhlaError::NotFound(format!("no fundamentals fixture for {ticker}")))?;

        let latest = snaps
            .iter()
            .filter(|s| s.publication_date < as_of)
            .max_by_key(|s| s.publication_date)
            .ok_or_else(|| {
                DakhlaError::NotFound(format!("no {ticker} report published before {as_of}"))
            })?;

        let mut snap = latest.clone();
        snap.as_of = as_of;
        Ok(snap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn day(y: i32, m: u32, d: u32) -> Date {
        Date::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_price_range_filter() {
        let start = day(2023, 1, 2);
        let bars: Vec<PriceBar> = (0..10)
            .map(|i| PriceBar::flat(start + Duration::days(i), 100.0 + i as f64))
            .collect();
        let source = StaticSource::new().with_prices("aapl", bars);

        let got = source
            .get_history("AAPL", start + Duration::days(2), start + Duration::days(5))
            .await
            .unwrap();
        assert_eq!(got.len(), 3);
        assert_eq!(got[0].adj_close, 102.0);
    }

    #[tokio::test]
    async fn test_unknown_ticker_is_not_found() {
        let source = StaticSource::new();
        let err = source
            .get_history("ZZZ", day(2023, 1, 1), day(2023, 2, 1))
            .await
            .unwrap_err();
        assert!(matches!(err, DakhlaError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_fundamentals_latest_before_cutoff() {
        let source = StaticSource::new()
            .with_fundamentals(
                "AAPL",
                FundamentalsSnapshot::empty("AAPL", day(2023, 4, 1), day(2023, 2, 2)),
            )
            .with_fundamentals(
                "AAPL",
                FundamentalsSnapshot::empty("AAPL", day(2023, 7, 1), day(2023, 5, 4)),
            );

        let snap = source.get_latest("AAPL", day(2023, 5, 1)).await.unwrap();
        assert_eq!(snap.publication_date, day(2023, 2, 2));
        assert_eq!(snap.as_of, day(2023, 5, 1), "as_of reflects the request");

        let snap = source.get_latest("AAPL", day(2023, 6, 1)).await.unwrap();
        assert_eq!(snap.publication_date, day(2023, 5, 4));
    }

    #[tokio::test]
    async fn test_fundamentals_none_before_cutoff() {
        let source = StaticSource::new().with_fundamentals(
            "NEW",
            FundamentalsSnapshot::empty("NEW", day(2023, 7, 1), day(2023, 5, 4)),
        );
        let err = source.get_latest("NEW", day(2023, 1, 1)).await.unwrap_err();
        assert!(matches!(err, DakhlaError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_mutate_prices() {
        let start = day(2023, 1, 2);
        let source = StaticSource::new().with_prices(
            "X",
            (0..5)
                .map(|i| PriceBar::flat(start + Duration::days(i), 10.0))
                .collect(),
        );

        let cutoff = start + Duration::days(3);
        source.mutate_prices("X", |bar| {
            if bar.date >= cutoff {
                bar.adj_close *= 10.0;
            }
        });

        let before = source.get_history("X", start, cutoff).await.unwrap();
        assert!(before.iter().all(|b| b.adj_close == 10.0));
        let after = source
            .get_history("X", cutoff, cutoff + Duration::days(2))
            .await
            .unwrap();
        assert!(after.iter().all(|b| b.adj_close == 100.0));
    }
}
