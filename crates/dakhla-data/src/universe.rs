//! Named universes enriched with point-in-time metadata.
//!
//! A universe starts as a curated ticker list and becomes a set of
//! [`UniverseEntry`] values by fetching each ticker's market cap and sector
//! through the cache as of a date. Tickers with no resolvable market cap
//! are dropped with a log entry.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::stream::StreamExt;
use tracing::{debug, warn};

use dakhla_traits::{Date, Result, Ticker, UniverseEntry, UniverseName};

use crate::cache::DataCache;
use crate::lists;

/// Concurrent enrichment fetches per universe load.
const ENRICH_WORKERS: usize = 8;

/// Supplies named universes as of a date.
pub struct UniverseProvider {
    cache: Arc<DataCache>,
}

impl UniverseProvider {
    /// A provider backed by the given cache.
    #[must_use]
    pub fn new(cache: Arc<DataCache>) -> Self {
        Self { cache }
    }

    /// The curated ticker list for a universe, sorted and deduplicated.
    ///
    /// `Combined` is sp500 ∪ russell2000; nasdaq100 is deliberately left
    /// out to avoid double-counting large-cap tech.
    #[must_use]
    pub fn tickers(name: UniverseName) -> Vec<Ticker> {
        let set: BTreeSet<&str> = match name {
            UniverseName::Sp500 => lists::SP500.iter().copied().collect(),
            UniverseName::Russell2000 => lists::RUSSELL2000.iter().copied().collect(),
            UniverseName::Nasdaq100 => lists::NASDAQ100.iter().copied().collect(),
            UniverseName::Combined => lists::SP500
                .iter()
                .chain(lists::RUSSELL2000.iter())
                .copied()
                .collect(),
        };
        set.into_iter().map(str::to_string).collect()
    }

    /// Load a universe as of a date, enriched with market cap and sector.
    ///
    /// Tickers whose metadata cannot be resolved, or whose market cap is
    /// null, are dropped with a warning. Entries come back sorted by market
    /// cap descending (ties broken by ticker).
    ///
    /// # Errors
    ///
    /// Individual ticker failures never propagate; only infrastructure
    /// errors do.
    pub async fn load(&self, name: UniverseName, as_of: Date) -> Result<Vec<UniverseEntry>> {
        debug!(universe = %name, %as_of, "loading universe");
        self.load_tickers(Self::tickers(name), as_of).await
    }

    /// Enrich an explicit ticker list the same way [`load`] enriches a
    /// named universe.
    ///
    /// [`load`]: Self::load
    pub async fn load_tickers(
        &self,
        tickers: Vec<Ticker>,
        as_of: Date,
    ) -> Result<Vec<UniverseEntry>> {
        let mut entries = Vec::new();
        let mut stream = futures::stream::iter(tickers.into_iter().map(|ticker| {
            let cache = Arc::clone(&self.cache);
            async move {
                let result = cache.get_fundamentals(&ticker, as_of).await;
                (ticker, result)
            }
        }))
        .buffer_unordered(ENRICH_WORKERS);

        while let Some((ticker, result)) = stream.next().await {
            match result {
                Ok(snap) => match snap.market_cap {
                    Some(cap) if cap > 0.0 => entries.push(UniverseEntry {
                        ticker,
                        market_cap: cap,
                        sector: snap.sector,
                        as_of,
                    }),
                    _ => warn!(%ticker, "dropped from universe: null market cap"),
                },
                Err(err) => warn!(%ticker, %err, "dropped from universe"),
            }
        }

        entries.sort_by(|a, b| {
            b.market_cap
                .partial_cmp(&a.market_cap)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });
        debug!(resolved = entries.len(), %as_of, "universe enriched");
        Ok(entries)
    }

    /// Take the `n` largest entries by market cap.
    #[must_use]
    pub fn top_n(entries: &[UniverseEntry], n: usize) -> Vec<UniverseEntry> {
        entries.iter().take(n).cloned().collect()
    }
}
