//! CLI subcommand implementations.

pub mod backtest;
pub mod cache;
pub mod optimize;
pub mod regime;
pub mod score;
pub mod universe;

use std::sync::Arc;

use anyhow::{Context as _, Result};
use chrono::{NaiveDate, Utc};

use dakhla::data::{CacheSettings, DataCache, FmpSource, RateLimiter, StaticSource};
use dakhla::prelude::EngineConfig;

/// Shared command context: validated config plus the tiered cache.
pub struct Context {
    pub config: EngineConfig,
    pub cache: Arc<DataCache>,
}

impl Context {
    /// Build the cache over the FMP live source, or over an empty static
    /// source in offline mode (cache tiers answer alone).
    pub fn new(data_dir: &str, offline: bool) -> Result<Self> {
        let config = EngineConfig::default()
            .validated()
            .context("invalid engine configuration")?;
        let limiter = Arc::new(RateLimiter::per_minute(config.rate_limit_per_min));
        let settings = CacheSettings {
            historical_mode: offline,
            ..CacheSettings::from_config(&config)
        };

        let cache = if offline {
            let empty = Arc::new(StaticSource::new());
            DataCache::open(data_dir, empty.clone(), empty, limiter, settings)?
        } else {
            let fmp = Arc::new(FmpSource::from_env().context(
                "set FMP_API_KEY (or use --offline to resolve from the cache only)",
            )?);
            DataCache::open(data_dir, fmp.clone(), fmp, limiter, settings)?
        };

        Ok(Self {
            config,
            cache: Arc::new(cache),
        })
    }
}

/// Parse a YYYY-MM-DD date; `None` means today.
pub fn parse_date_or_today(date: Option<&str>) -> Result<NaiveDate> {
    match date {
        Some(s) => parse_date(s),
        None => Ok(Utc::now().date_naive()),
    }
}

/// Parse a date string in YYYY-MM-DD format.
pub fn parse_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("invalid date '{date_str}', expected YYYY-MM-DD"))
}
