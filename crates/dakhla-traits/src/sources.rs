//! Abstract market data source traits.
//!
//! Any vendor client can back the engine by implementing these traits. Both
//! carry the point-in-time contract: no returned datum may be dated at or
//! after the requested cutoff. The cache layer re-verifies the contract and
//! treats a violation as fatal.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Date, FundamentalsSnapshot, PriceBar};

/// A source of historical daily price bars.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch daily bars for `ticker` with `start <= date < end`, sorted by
    /// date ascending with no duplicates.
    ///
    /// # Errors
    ///
    /// - [`DakhlaError::NotFound`] when the source has no coverage for the
    ///   ticker or range.
    /// - [`DakhlaError::SourceUnavailable`] on transient failures; the
    ///   caller's retry wrapper owns the attempt budget.
    ///
    /// [`DakhlaError::NotFound`]: crate::error::DakhlaError::NotFound
    /// [`DakhlaError::SourceUnavailable`]: crate::error::DakhlaError::SourceUnavailable
    async fn get_history(&self, ticker: &str, start: Date, end: Date) -> Result<Vec<PriceBar>>;
}

/// A source of point-in-time company fundamentals.
#[async_trait]
pub trait FundamentalsSource: Send + Sync {
    /// Fetch the latest fundamentals snapshot whose publication date is
    /// strictly before `as_of`.
    ///
    /// # Errors
    ///
    /// - [`DakhlaError::NotFound`] when no reporting period predates `as_of`.
    /// - [`DakhlaError::SourceUnavailable`] on transient failures.
    ///
    /// [`DakhlaError::NotFound`]: crate::error::DakhlaError::NotFound
    /// [`DakhlaError::SourceUnavailable`]: crate::error::DakhlaError::SourceUnavailable
    async fn get_latest(&self, ticker: &str, as_of: Date) -> Result<FundamentalsSnapshot>;
}
