//! Epoch boundaries.
//!
//! An epoch is the lifetime of one ephemeral identifier. The real boundaries
//! come from the key schedule, so they sit behind [`EpochClock`]; the crate
//! ships a fixed-length clock aligned to the UTC day start.

use crate::core::day::DayDate;
use chrono::{DateTime, Duration, Utc};

/// Default epoch length in minutes (96 epochs per day).
pub const DEFAULT_EPOCH_MINUTES: i64 = 15;

/// A `[start, end)` segment during which one identifier is valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Epoch {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Number of whole one-minute windows in this epoch.
    pub fn minute_windows(&self) -> i64 {
        self.duration().num_minutes()
    }
}

/// Source of epoch boundaries.
pub trait EpochClock: Send + Sync {
    /// Length of every epoch.
    fn epoch_duration(&self) -> Duration;

    /// Start of the epoch containing `timestamp`.
    fn epoch_start(&self, timestamp: DateTime<Utc>) -> DateTime<Utc>;

    /// The epoch containing `timestamp`.
    fn epoch(&self, timestamp: DateTime<Utc>) -> Epoch {
        let start = self.epoch_start(timestamp);
        Epoch {
            start,
            end: start + self.epoch_duration(),
        }
    }
}

/// Fixed-length epochs counted from the start of each UTC day.
#[derive(Debug, Clone, Copy)]
pub struct FixedEpochClock {
    duration: Duration,
}

impl FixedEpochClock {
    /// Create a clock with the given epoch length.
    ///
    /// Lengths that do not divide a day evenly leave a short final epoch.
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Default for FixedEpochClock {
    fn default() -> Self {
        Self::new(Duration::minutes(DEFAULT_EPOCH_MINUTES))
    }
}

impl EpochClock for FixedEpochClock {
    fn epoch_duration(&self) -> Duration {
        self.duration
    }

    fn epoch_start(&self, timestamp: DateTime<Utc>) -> DateTime<Utc> {
        let day_start = DayDate::from_timestamp(timestamp).start();
        let length_ms = self.duration.num_milliseconds();
        if length_ms <= 0 {
            return day_start;
        }
        let offset_ms = (timestamp - day_start).num_milliseconds();
        day_start + Duration::milliseconds(offset_ms - offset_ms % length_ms)
    }
}
