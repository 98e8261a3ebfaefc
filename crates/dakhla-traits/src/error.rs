//! Error types for the Dakhla engine.
//!
//! The taxonomy follows the engine's propagation policy: transient source
//! failures are retried and surfaced only on exhaustion, per-ticker data
//! problems degrade to neutral inputs or dropped tickers, and temporal or
//! configuration violations are fatal.

use thiserror::Error;

/// The main error type for Dakhla operations.
#[derive(Debug, Error)]
pub enum DakhlaError {
    /// Transient network or remote-API failure; retried with backoff and
    /// surfaced only once the attempt budget is exhausted.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// A ticker or reporting period is absent from every tier.
    #[error("not found: {0}")]
    NotFound(String),

    /// Missing required fields, non-positive denominators, or a
    /// non-monotonic price series.
    #[error("data integrity: {0}")]
    DataIntegrity(String),

    /// A datum dated at or after the `as_of` cutoff reached a point-in-time
    /// computation. Fatal: the enclosing rebalance is aborted.
    #[error("temporal violation: {0}")]
    TemporalViolation(String),

    /// A cache entry is past its TTL and the refresh failed; the caller
    /// decides whether to accept the stale copy.
    #[error("stale cache entry for {ticker}, written {written}")]
    StaleData {
        /// Ticker whose consolidated entry expired.
        ticker: String,
        /// RFC 3339 write time of the expired entry.
        written: String,
    },

    /// Fewer than half of the requested tickers could be resolved.
    #[error("universe too sparse: {resolved} of {requested} tickers resolved")]
    UniverseTooSparse {
        /// Tickers requested for the rebalance.
        requested: usize,
        /// Tickers actually resolved.
        resolved: usize,
    },

    /// The convex program's constraints cannot be satisfied.
    #[error("infeasible program: {0}")]
    InfeasibleProgram(String),

    /// The covariance matrix is not positive definite even after full
    /// shrinkage toward the structured target.
    #[error("covariance matrix is singular")]
    SingularCovariance,

    /// Invalid configuration; fatal at construction.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The operation was cancelled; partial results are discarded.
    #[error("cancelled")]
    Cancelled,

    /// Columnar store (parquet) failure.
    #[error("columnar store: {0}")]
    Columnar(String),

    /// Filesystem failure on the cache directory.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization failure on a consolidated cache blob or snapshot.
    #[error("serialization: {0}")]
    Json(#[from] serde_json::Error),
}

impl DakhlaError {
    /// Whether the retry wrapper should attempt this operation again.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_))
    }
}

/// A specialized Result type for Dakhla operations.
pub type Result<T> = std::result::Result<T, DakhlaError>;
