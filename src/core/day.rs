//! Calendar day normalization.
//!
//! Every day-keyed structure in the crate (sync bookkeeping, contacts,
//! retained key batches) is keyed by [`DayDate`], which is always the start
//! of a UTC calendar day.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A calendar day in UTC.
///
/// Two `DayDate`s built from different instants of the same day are equal.
/// Serializes as `YYYY-MM-DD` so it can key JSON maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DayDate(NaiveDate);

impl DayDate {
    /// Truncate a timestamp to its calendar day.
    pub fn from_timestamp(timestamp: DateTime<Utc>) -> Self {
        Self(timestamp.date_naive())
    }

    /// Build a day from its calendar components.
    pub fn from_ymd(year: i32, month: u32, day: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, day).map(Self)
    }

    /// The first instant of this day.
    pub fn start(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.0.and_time(NaiveTime::MIN))
    }

    /// The first instant of the following day.
    pub fn end(&self) -> DateTime<Utc> {
        self.start() + Duration::days(1)
    }

    /// The day `days` calendar days before this one.
    pub fn days_before(&self, days: i64) -> Self {
        Self(self.0 - Duration::days(days))
    }

    /// Whether `timestamp` falls on this day.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp >= self.start() && timestamp < self.end()
    }

    /// Milliseconds since the Unix epoch of the day start.
    pub fn timestamp_millis(&self) -> i64 {
        self.start().timestamp_millis()
    }

    pub fn naive(&self) -> NaiveDate {
        self.0
    }
}

impl From<DateTime<Utc>> for DayDate {
    fn from(timestamp: DateTime<Utc>) -> Self {
        Self::from_timestamp(timestamp)
    }
}

impl fmt::Display for DayDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}
