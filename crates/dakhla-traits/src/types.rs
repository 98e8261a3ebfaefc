//! Common types used throughout the Dakhla engine.
//!
//! This module defines the core data types for representing securities,
//! daily price bars, point-in-time fundamentals, and universe membership.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DakhlaError;

// Re-export date type from chrono
pub use chrono::NaiveDate as Date;

/// A market ticker identifier.
///
/// Tickers are opaque uppercase symbols ("AAPL", "MSFT") and serve as the
/// primary key throughout the engine.
pub type Ticker = String;

/// A single daily price bar.
///
/// `adj_close` is the authoritative return series: it folds dividends and
/// splits back into the price, so consecutive-bar ratios are total returns.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    /// Trading date.
    pub date: Date,
    /// Opening price.
    pub open: f64,
    /// Intraday high.
    pub high: f64,
    /// Intraday low.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Split- and dividend-adjusted closing price.
    pub adj_close: f64,
    /// Shares traded.
    pub volume: i64,
}

impl PriceBar {
    /// A flat bar at the given price, useful for fixtures.
    #[must_use]
    pub fn flat(date: Date, price: f64) -> Self {
        Self {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            adj_close: price,
            volume: 0,
        }
    }
}

/// A company's latest-reported fundamentals as of a date.
///
/// All fields are point-in-time: for a snapshot with `as_of = D`, only
/// reporting periods whose publication date is strictly before `D` are
/// included. Missing fields are `None` and map to neutral factor inputs
/// downstream; they are never substituted with fabricated values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsSnapshot {
    /// Ticker this snapshot belongs to.
    pub ticker: Ticker,
    /// Point-in-time cutoff the snapshot was assembled for.
    pub as_of: Date,
    /// Publication date of the most recent report included (strictly < `as_of`).
    pub publication_date: Date,
    /// Trailing free cash flow.
    pub free_cash_flow: Option<f64>,
    /// Trailing earnings before interest and taxes.
    pub ebit: Option<f64>,
    /// Total assets from the latest balance sheet.
    pub total_assets: Option<f64>,
    /// Total current liabilities from the latest balance sheet.
    pub current_liabilities: Option<f64>,
    /// Trailing gross profit.
    pub gross_profit: Option<f64>,
    /// Trailing revenue.
    pub revenue: Option<f64>,
    /// Shares outstanding.
    pub shares_outstanding: Option<f64>,
    /// Market capitalization.
    pub market_cap: Option<f64>,
    /// GICS-style sector classification.
    pub sector: Option<String>,
}

impl FundamentalsSnapshot {
    /// An empty snapshot for a ticker, with every field missing.
    #[must_use]
    pub fn empty(ticker: impl Into<Ticker>, as_of: Date, publication_date: Date) -> Self {
        Self {
            ticker: ticker.into(),
            as_of,
            publication_date,
            free_cash_flow: None,
            ebit: None,
            total_assets: None,
            current_liabilities: None,
            gross_profit: None,
            revenue: None,
            shares_outstanding: None,
            market_cap: None,
            sector: None,
        }
    }
}

/// A universe member enriched with market cap and sector metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UniverseEntry {
    /// Ticker symbol.
    pub ticker: Ticker,
    /// Market capitalization as of `as_of`.
    pub market_cap: f64,
    /// Sector classification, when known.
    pub sector: Option<String>,
    /// Date the entry was resolved for.
    pub as_of: Date,
}

/// Named curated universes.
///
/// `Combined` is sp500 ∪ russell2000 and deliberately excludes nasdaq100,
/// which overlaps sp500's large-cap tech by roughly 59%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniverseName {
    /// Large-cap US equities (S&P 500 constituents).
    Sp500,
    /// Small-cap US equities (curated Russell 2000 subset).
    Russell2000,
    /// Nasdaq-100 constituents.
    Nasdaq100,
    /// sp500 ∪ russell2000.
    Combined,
}

impl UniverseName {
    /// Canonical lowercase name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sp500 => "sp500",
            Self::Russell2000 => "russell2000",
            Self::Nasdaq100 => "nasdaq100",
            Self::Combined => "combined",
        }
    }
}

impl fmt::Display for UniverseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UniverseName {
    type Err = DakhlaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sp500" => Ok(Self::Sp500),
            "russell2000" => Ok(Self::Russell2000),
            "nasdaq100" => Ok(Self::Nasdaq100),
            "combined" => Ok(Self::Combined),
            other => Err(DakhlaError::Config(format!("unknown universe '{other}'"))),
        }
    }
}
