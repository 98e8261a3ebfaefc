//! Rebalance schedules.

use chrono::{Datelike, Months};
use serde::{Deserialize, Serialize};

use dakhla_traits::Date;

/// How often the portfolio is recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    /// First of every month.
    Monthly,
    /// First of every third month.
    Quarterly,
}

impl RebalanceFrequency {
    /// Months between rebalances.
    #[must_use]
    pub const fn months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
        }
    }
}

/// Rebalance dates in `[start, end]`: the first of each period, starting
/// with the month containing `start` (or the next month when `start` is
/// past the first).
#[must_use]
pub fn rebalance_dates(start: Date, end: Date, frequency: RebalanceFrequency) -> Vec<Date> {
    let mut current = Date::from_ymd_opt(start.year(), start.month(), 1).expect("valid month start");
    if current < start {
        current = current + Months::new(1);
    }

    let step = Months::new(frequency.months());
    let mut dates = Vec::new();
    while current <= end {
        dates.push(current);
        current = current + step;
    }
    dates
}
