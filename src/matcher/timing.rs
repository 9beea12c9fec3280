//! Detection session throttling.

use crate::config::{Config, DEFAULT_MAX_DETECTIONS_PER_DAY};
use crate::matcher::MatchError;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::VecDeque;

/// Bookkeeping of when detection sessions ran.
pub trait DetectionTiming: Send + Sync {
    /// Record a detection session at `timestamp`.
    fn add_detection(&self, timestamp: DateTime<Utc>) -> Result<(), MatchError>;

    /// Recorded sessions within the last 24 hours, oldest first.
    fn detections(&self) -> Vec<DateTime<Utc>>;

    /// Whether another session may run at `now`.
    fn should_detect(&self, now: DateTime<Utc>) -> bool;
}

/// Allows at most `max_per_day` sessions in any rolling 24 hours.
#[derive(Debug)]
pub struct DetectionTimingManager {
    max_per_day: usize,
    detections: Mutex<VecDeque<DateTime<Utc>>>,
}

impl DetectionTimingManager {
    pub fn new(max_per_day: usize) -> Self {
        Self {
            max_per_day,
            detections: Mutex::new(VecDeque::new()),
        }
    }

    /// Limiter using the configured sessions per day.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_detections_per_day)
    }

    /// Number of sessions counted against the limit at `now`.
    pub fn detections_in_window(&self, now: DateTime<Utc>) -> usize {
        let window_start = now - Duration::days(1);
        self.detections
            .lock()
            .iter()
            .filter(|&&ts| ts > window_start && ts <= now)
            .count()
    }
}

impl Default for DetectionTimingManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DETECTIONS_PER_DAY)
    }
}

impl DetectionTiming for DetectionTimingManager {
    fn add_detection(&self, timestamp: DateTime<Utc>) -> Result<(), MatchError> {
        let mut detections = self.detections.lock();
        let window_start = timestamp - Duration::days(1);
        while detections.front().is_some_and(|&ts| ts <= window_start) {
            detections.pop_front();
        }
        detections.push_back(timestamp);
        Ok(())
    }

    fn detections(&self) -> Vec<DateTime<Utc>> {
        self.detections.lock().iter().copied().collect()
    }

    fn should_detect(&self, now: DateTime<Utc>) -> bool {
        self.detections_in_window(now) < self.max_per_day
    }
}
