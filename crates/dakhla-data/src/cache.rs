//! Tiered point-in-time data cache.
//!
//! Resolution order: historical parquet store, then the consolidated
//! per-ticker JSON cache, then the live source (with write-back). Reads see
//! the file as it was at open time; writers serialize per ticker through an
//! advisory lock so a write never tears a concurrent read of another
//! ticker.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dakhla_traits::{
    DakhlaError, Date, EngineConfig, FundamentalsSnapshot, FundamentalsSource, PriceBar,
    PriceSource, Result, Ticker,
};

use crate::historical::HistoricalStore;
use crate::rate_limit::RateLimiter;
use crate::retry::{retry, RetryPolicy};

const CACHE_META_VERSION: u32 = 1;

/// Tuning knobs for the cache, derived from [`EngineConfig`].
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// TTL of the consolidated per-ticker blob.
    pub ttl: Duration,
    /// TTL of cached quarterly fundamentals.
    pub fundamentals_ttl: Duration,
    /// Retry schedule for live fetches.
    pub retry: RetryPolicy,
    /// Always prefer the historical store, even for current dates.
    pub historical_mode: bool,
}

impl CacheSettings {
    /// Derive settings from the engine configuration.
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            ttl: Duration::from_secs(config.cache_ttl_hours * 3600),
            fundamentals_ttl: Duration::from_secs(config.fundamentals_ttl_days * 86_400),
            retry: RetryPolicy::with_attempts(config.max_retries),
            historical_mode: false,
        }
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// One serialized blob per ticker aggregating prices and fundamentals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatedBlob {
    /// When the price section was last written.
    pub write_time: DateTime<Utc>,
    /// When the fundamentals section was last written.
    pub fundamentals_write_time: Option<DateTime<Utc>>,
    /// Cached daily bars, sorted ascending.
    pub prices: Vec<PriceBar>,
    /// Cached fundamentals snapshot, if any.
    pub fundamentals: Option<FundamentalsSnapshot>,
}

impl ConsolidatedBlob {
    /// An empty blob stamped now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            write_time: Utc::now(),
            fundamentals_write_time: None,
            prices: Vec::new(),
            fundamentals: None,
        }
    }
}

impl Default for ConsolidatedBlob {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    version: u32,
    last_maintenance: Option<DateTime<Utc>>,
}

/// Tiered point-in-time retrieval of prices and fundamentals.
pub struct DataCache {
    cache_dir: PathBuf,
    settings: CacheSettings,
    prices: Arc<dyn PriceSource>,
    fundamentals: Arc<dyn FundamentalsSource>,
    limiter: Arc<RateLimiter>,
    historical: HistoricalStore,
    locks: std::sync::Mutex<HashMap<Ticker, Arc<tokio::sync::Mutex<()>>>>,
}

impl DataCache {
    /// Open a cache rooted at `data_root`, backed by the given sources.
    ///
    /// Creates `cache/` and `historical/prices/` under the root and writes
    /// `cache/meta.json` on first use.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the directories cannot be created.
    pub fn open(
        data_root: impl AsRef<Path>,
        prices: Arc<dyn PriceSource>,
        fundamentals: Arc<dyn FundamentalsSource>,
        limiter: Arc<RateLimiter>,
        settings: CacheSettings,
    ) -> Result<Self> {
        let cache_dir = data_root.as_ref().join("cache");
        fs::create_dir_all(&cache_dir)?;
        let historical = HistoricalStore::open(data_root.as_ref())?;

        let meta_path = cache_dir.join("meta.json");
        if !meta_path.is_file() {
            let meta = CacheMeta {
                version: CACHE_META_VERSION,
                last_maintenance: None,
            };
            atomic_write(&meta_path, &serde_json::to_vec_pretty(&meta)?)?;
        }

        Ok(Self {
            cache_dir,
            settings,
            prices,
            fundamentals,
            limiter,
            historical,
            locks: std::sync::Mutex::new(HashMap::new()),
        })
    }

    /// The historical (first) tier.
    #[must_use]
    pub fn historical(&self) -> &HistoricalStore {
        &self.historical
    }

    /// Daily bars for `ticker` with `start <= date < end`.
    ///
    /// Tiers are consulted in order: the historical store (when the range
    /// ends in the past or historical mode is on), the consolidated cache
    /// while fresh, and finally the live source with write-back.
    ///
    /// # Errors
    ///
    /// - [`DakhlaError::NotFound`] when no tier has coverage.
    /// - [`DakhlaError::SourceUnavailable`] when the live fetch exhausts its
    ///   retry budget and no cached copy exists.
    /// - [`DakhlaError::StaleData`] when the refresh fails but an expired
    ///   cached copy exists; accept it via [`read_cached_prices`].
    ///
    /// [`read_cached_prices`]: Self::read_cached_prices
    pub async fn get_prices(&self, ticker: &str, start: Date, end: Date) -> Result<Vec<PriceBar>> {
        if start >= end {
            return Err(DakhlaError::DataIntegrity(format!(
                "empty price range {start}..{end} for {ticker}"
            )));
        }
        let ticker = ticker.to_uppercase();

        // Tier 1: historical store for purely historical ranges.
        let today = Utc::now().date_naive();
        if (self.settings.historical_mode || end <= today) && self.historical.contains(&ticker) {
            let bars = self.historical.read(&ticker, start, end)?;
            if !bars.is_empty() {
                return Ok(bars);
            }
        }

        // Tier 2: consolidated cache while fresh.
        let cached = self.read_blob(&ticker)?;
        if let Some(blob) = &cached {
            if age_within(blob.write_time, self.settings.ttl) {
                let bars = filter_range(&blob.prices, start, end);
                if !bars.is_empty() {
                    debug!(%ticker, rows = bars.len(), "consolidated cache hit");
                    return Ok(bars);
                }
            }
        }

        // Tier 3: live source with write-back.
        match self.fetch_prices_live(&ticker, start, end).await {
            Ok(bars) => Ok(bars),
            Err(err) if err.is_transient() => match cached {
                Some(blob) if !filter_range(&blob.prices, start, end).is_empty() => {
                    warn!(%ticker, %err, "refresh failed, cached copy is stale");
                    Err(DakhlaError::StaleData {
                        ticker,
                        written: blob.write_time.to_rfc3339(),
                    })
                }
                _ => Err(err),
            },
            Err(err) => Err(err),
        }
    }

    /// Read cached bars as-is, ignoring TTL. This is the escape hatch for
    /// callers that choose to accept data flagged [`DakhlaError::StaleData`].
    pub fn read_cached_prices(&self, ticker: &str, start: Date, end: Date) -> Result<Vec<PriceBar>> {
        let ticker = ticker.to_uppercase();
        match self.read_blob(&ticker)? {
            Some(blob) => Ok(filter_range(&blob.prices, start, end)),
            None => Err(DakhlaError::NotFound(format!("no cache entry for {ticker}"))),
        }
    }

    /// Latest fundamentals snapshot with publication date strictly before
    /// `as_of`.
    ///
    /// # Errors
    ///
    /// - [`DakhlaError::NotFound`] when no reporting period predates `as_of`.
    /// - [`DakhlaError::TemporalViolation`] when a source returns data dated
    ///   at or after the cutoff (fatal).
    pub async fn get_fundamentals(&self, ticker: &str, as_of: Date) -> Result<FundamentalsSnapshot> {
        let ticker = ticker.to_uppercase();

        if let Some(blob) = self.read_blob(&ticker)? {
            if let (Some(snap), Some(written)) = (&blob.fundamentals, blob.fundamentals_write_time)
            {
                // A snapshot assembled for a different cutoff may miss a
                // report published in between, so only the exact cutoff is
                // reusable.
                let reusable = snap.as_of == as_of
                    && snap.publication_date < as_of
                    && age_within(written, self.settings.fundamentals_ttl);
                if reusable {
                    debug!(%ticker, %as_of, "fundamentals cache hit");
                    return Ok(snap.clone());
                }
            }
        }

        self.limiter.acquire().await;
        let fetched = retry(&self.settings.retry, || {
            self.fundamentals.get_latest(&ticker, as_of)
        })
        .await?;

        if fetched.publication_date >= as_of {
            return Err(DakhlaError::TemporalViolation(format!(
                "fundamentals for {ticker} published {} but cutoff is {as_of}",
                fetched.publication_date
            )));
        }

        let mut blob = self.read_blob(&ticker)?.unwrap_or_default();
        blob.fundamentals = Some(fetched.clone());
        blob.fundamentals_write_time = Some(Utc::now());
        self.set(&ticker, blob).await?;

        Ok(fetched)
    }

    /// Atomically write a ticker's consolidated blob (temp file + rename),
    /// holding that ticker's advisory lock for the duration.
    pub async fn set(&self, ticker: &str, blob: ConsolidatedBlob) -> Result<()> {
        let ticker = ticker.to_uppercase();
        let lock = self.lock_for(&ticker);
        let _guard = lock.lock().await;
        atomic_write(&self.blob_path(&ticker), &serde_json::to_vec(&blob)?)
    }

    /// Remove consolidated entries older than the TTL. Entries are never
    /// purged implicitly; this is the explicit maintenance pass.
    ///
    /// Returns the number of entries removed.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the cache directory cannot be scanned.
    pub fn maintenance(&self) -> Result<usize> {
        let mut removed = 0;
        for entry in fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !name.starts_with("ticker_") || !name.ends_with(".json") {
                continue;
            }
            let expired = match read_blob_file(&path) {
                Ok(blob) => !age_within(blob.write_time, self.settings.ttl),
                // Unreadable entries are corrupt; drop them too.
                Err(_) => true,
            };
            if expired {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }

        let meta = CacheMeta {
            version: CACHE_META_VERSION,
            last_maintenance: Some(Utc::now()),
        };
        atomic_write(
            &self.cache_dir.join("meta.json"),
            &serde_json::to_vec_pretty(&meta)?,
        )?;
        debug!(removed, "cache maintenance complete");
        Ok(removed)
    }

    async fn fetch_prices_live(&self, ticker: &str, start: Date, end: Date) -> Result<Vec<PriceBar>> {
        self.limiter.acquire().await;
        let fetched = retry(&self.settings.retry, || {
            self.prices.get_history(ticker, start, end)
        })
        .await?;

        if let Some(bad) = fetched.iter().find(|b| b.date >= end) {
            return Err(DakhlaError::TemporalViolation(format!(
                "price bar for {ticker} dated {} at or after cutoff {end}",
                bad.date
            )));
        }

        let mut bars: Vec<PriceBar> = fetched.into_iter().filter(|b| b.date >= start).collect();
        bars.sort_by_key(|b| b.date);
        bars.dedup_by_key(|b| b.date);

        if bars.is_empty() {
            return Err(DakhlaError::NotFound(format!(
                "{ticker} has no bars in {start}..{end}"
            )));
        }

        // Merge into the consolidated blob: new bars win on date collisions.
        let mut blob = self.read_blob(ticker)?.unwrap_or_default();
        let mut by_date: std::collections::BTreeMap<Date, PriceBar> =
            blob.prices.iter().map(|b| (b.date, *b)).collect();
        for bar in &bars {
            by_date.insert(bar.date, *bar);
        }
        blob.prices = by_date.into_values().collect();
        blob.write_time = Utc::now();
        self.set(ticker, blob).await?;

        Ok(bars)
    }

    fn blob_path(&self, ticker: &str) -> PathBuf {
        self.cache_dir.join(format!("ticker_{ticker}.json"))
    }

    fn read_blob(&self, ticker: &str) -> Result<Option<ConsolidatedBlob>> {
        let path = self.blob_path(ticker);
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(read_blob_file(&path)?))
    }

    fn lock_for(&self, ticker: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().expect("lock map poisoned");
        locks
            .entry(ticker.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

fn read_blob_file(path: &Path) -> Result<ConsolidatedBlob> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn filter_range(bars: &[PriceBar], start: Date, end: Date) -> Vec<PriceBar> {
    bars.iter()
        .filter(|b| b.date >= start && b.date < end)
        .copied()
        .collect()
}

fn age_within(written: DateTime<Utc>, ttl: Duration) -> bool {
    let age = Utc::now().signed_duration_since(written);
    age < chrono::Duration::from_std(ttl).unwrap_or(chrono::TimeDelta::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::static_source::StaticSource;
    use async_trait::async_trait;
    use chrono::Duration as CDuration;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn day(y: i32, m: u32, d: u32) -> Date {
        Date::from_ymd_opt(y, m, d).unwrap()
    }

    fn flat_bars(start: Date, n: usize, price: f64) -> Vec<PriceBar> {
        (0..n)
            .map(|i| PriceBar::flat(start + CDuration::days(i as i64), price))
            .collect()
    }

    /// Wraps a source and counts calls, to observe tier behavior.
    struct CountingSource {
        inner: StaticSource,
        calls: AtomicU32,
    }

    impl CountingSource {
        fn new(inner: StaticSource) -> Arc<Self> {
            Arc::new(Self {
                inner,
                calls: AtomicU32::new(0),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PriceSource for CountingSource {
        async fn get_history(&self, ticker: &str, start: Date, end: Date) -> Result<Vec<PriceBar>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_history(ticker, start, end).await
        }
    }

    #[async_trait]
    impl FundamentalsSource for CountingSource {
        async fn get_latest(&self, ticker: &str, as_of: Date) -> Result<FundamentalsSnapshot> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.get_latest(ticker, as_of).await
        }
    }

    /// A source that always fails with a transient error.
    struct DownSource;

    #[async_trait]
    impl PriceSource for DownSource {
        async fn get_history(&self, _: &str, _: Date, _: Date) -> Result<Vec<PriceBar>> {
            Err(DakhlaError::SourceUnavailable("down".into()))
        }
    }

    #[async_trait]
    impl FundamentalsSource for DownSource {
        async fn get_latest(&self, _: &str, _: Date) -> Result<FundamentalsSnapshot> {
            Err(DakhlaError::SourceUnavailable("down".into()))
        }
    }

    fn fast_settings() -> CacheSettings {
        CacheSettings {
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay_ms: 1,
                backoff_factor: 1.0,
                jitter: 0.0,
            },
            ..CacheSettings::default()
        }
    }

    fn open_cache(
        dir: &Path,
        source: Arc<dyn PriceSource>,
        fundamentals: Arc<dyn FundamentalsSource>,
        settings: CacheSettings,
    ) -> DataCache {
        DataCache::open(
            dir,
            source,
            fundamentals,
            Arc::new(RateLimiter::per_minute(6_000)),
            settings,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_miss_fetches_then_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let start = day(2023, 1, 2);
        let source = CountingSource::new(
            StaticSource::new().with_prices("AAPL", flat_bars(start, 10, 150.0)),
        );
        let cache = open_cache(dir.path(), source.clone(), source.clone(), fast_settings());

        let end = start + CDuration::days(10);
        let first = cache.get_prices("AAPL", start, end).await.unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(source.calls(), 1);

        let second = cache.get_prices("AAPL", start, end).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(source.calls(), 1, "second read must not hit the source");
    }

    #[tokio::test]
    async fn test_expired_ttl_refetches() {
        let dir = tempfile::tempdir().unwrap();
        let start = day(2023, 1, 2);
        let source = CountingSource::new(
            StaticSource::new().with_prices("MSFT", flat_bars(start, 5, 300.0)),
        );
        let settings = CacheSettings {
            ttl: Duration::ZERO,
            ..fast_settings()
        };
        let cache = open_cache(dir.path(), source.clone(), source.clone(), settings);

        let end = start + CDuration::days(5);
        cache.get_prices("MSFT", start, end).await.unwrap();
        cache.get_prices("MSFT", start, end).await.unwrap();
        assert_eq!(source.calls(), 2, "zero TTL must force a refetch");
    }

    #[tokio::test]
    async fn test_stale_data_surfaced_when_refresh_fails() {
        let dir = tempfile::tempdir().unwrap();
        let start = day(2023, 1, 2);
        let end = start + CDuration::days(5);

        // Seed the cache with a working source.
        let good = CountingSource::new(
            StaticSource::new().with_prices("NVDA", flat_bars(start, 5, 400.0)),
        );
        let settings = CacheSettings {
            ttl: Duration::ZERO,
            ..fast_settings()
        };
        let cache = open_cache(dir.path(), good.clone(), good.clone(), settings.clone());
        cache.get_prices("NVDA", start, end).await.unwrap();
        drop(cache);

        // Reopen against a dead source: the expired entry is flagged stale.
        let cache = open_cache(dir.path(), Arc::new(DownSource), Arc::new(DownSource), settings);
        let err = cache.get_prices("NVDA", start, end).await.unwrap_err();
        assert!(matches!(err, DakhlaError::StaleData { .. }), "got {err}");

        // The caller can explicitly accept the stale copy.
        let stale = cache.read_cached_prices("NVDA", start, end).unwrap();
        assert_eq!(stale.len(), 5);
    }

    #[tokio::test]
    async fn test_historical_tier_preferred_for_past_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let start = day(2020, 1, 2);
        let cache = open_cache(
            dir.path(),
            Arc::new(DownSource),
            Arc::new(DownSource),
            fast_settings(),
        );
        cache
            .historical()
            .write("SPY", &flat_bars(start, 20, 320.0))
            .unwrap();

        // The live source is dead; the historical tier must answer alone.
        let bars = cache
            .get_prices("SPY", start, start + CDuration::days(20))
            .await
            .unwrap();
        assert_eq!(bars.len(), 20);
    }

    #[tokio::test]
    async fn test_fundamentals_point_in_time() {
        let dir = tempfile::tempdir().unwrap();
        let q1 = FundamentalsSnapshot {
            market_cap: Some(1.0e12),
            ..FundamentalsSnapshot::empty("AAPL", day(2023, 4, 1), day(2023, 2, 2))
        };
        let q2 = FundamentalsSnapshot {
            market_cap: Some(1.1e12),
            ..FundamentalsSnapshot::empty("AAPL", day(2023, 7, 1), day(2023, 5, 4))
        };
        let source = CountingSource::new(
            StaticSource::new()
                .with_fundamentals("AAPL", q1.clone())
                .with_fundamentals("AAPL", q2.clone()),
        );
        let cache = open_cache(dir.path(), source.clone(), source.clone(), fast_settings());

        // A cutoff between the two publications sees only the first.
        let snap = cache.get_fundamentals("AAPL", day(2023, 3, 1)).await.unwrap();
        assert_eq!(snap.publication_date, q1.publication_date);

        // A later cutoff sees the second.
        let snap = cache.get_fundamentals("AAPL", day(2023, 6, 1)).await.unwrap();
        assert_eq!(snap.publication_date, q2.publication_date);
    }

    #[tokio::test]
    async fn test_fundamentals_cached_within_ttl() {
        let dir = tempfile::tempdir().unwrap();
        let snap = FundamentalsSnapshot {
            market_cap: Some(5.0e11),
            ..FundamentalsSnapshot::empty("META", day(2023, 6, 1), day(2023, 4, 27))
        };
        let source =
            CountingSource::new(StaticSource::new().with_fundamentals("META", snap));
        let cache = open_cache(dir.path(), source.clone(), source.clone(), fast_settings());

        cache.get_fundamentals("META", day(2023, 6, 1)).await.unwrap();
        cache.get_fundamentals("META", day(2023, 6, 1)).await.unwrap();
        assert_eq!(source.calls(), 1);
    }

    #[tokio::test]
    async fn test_set_is_atomic_and_readable() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(
            dir.path(),
            Arc::new(DownSource),
            Arc::new(DownSource),
            fast_settings(),
        );
        let start = day(2023, 1, 2);
        let blob = ConsolidatedBlob {
            prices: flat_bars(start, 3, 10.0),
            ..ConsolidatedBlob::new()
        };

        cache.set("ABC", blob).await.unwrap();
        let bars = cache
            .read_cached_prices("ABC", start, start + CDuration::days(3))
            .unwrap();
        assert_eq!(bars.len(), 3);
        // No temp file left behind
        assert!(!dir.path().join("cache").join("ticker_ABC.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_maintenance_purges_expired_entries() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CacheSettings {
            ttl: Duration::ZERO,
            ..fast_settings()
        };
        let cache = open_cache(dir.path(), Arc::new(DownSource), Arc::new(DownSource), settings);
        cache.set("OLD", ConsolidatedBlob::new()).await.unwrap();

        let removed = cache.maintenance().unwrap();
        assert_eq!(removed, 1);
        assert!(cache.read_cached_prices("OLD", day(2023, 1, 1), day(2024, 1, 1)).is_err());
    }

    #[tokio::test]
    async fn test_source_violating_cutoff_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let start = day(2023, 1, 2);
        // Source hands back bars beyond the requested end date.
        struct LeakySource(Vec<PriceBar>);

        #[async_trait]
        impl PriceSource for LeakySource {
            async fn get_history(&self, _: &str, _: Date, _: Date) -> Result<Vec<PriceBar>> {
                Ok(self.0.clone())
            }
        }

        let leaky = Arc::new(LeakySource(flat_bars(start, 30, 1.0)));
        let cache = open_cache(dir.path(), leaky, Arc::new(DownSource), fast_settings());

        let err = cache
            .get_prices("BAD", start, start + CDuration::days(5))
            .await
            .unwrap_err();
        assert!(matches!(err, DakhlaError::TemporalViolation(_)), "got {err}");
    }
}
