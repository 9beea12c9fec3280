//! One-minute signal windows within an epoch.
//!
//! Samples are collected into fixed-duration windows for averaging. A window
//! covers `(start, end]`: a sample stamped exactly at `start` belongs to the
//! previous window, one stamped exactly at `end` belongs to this one.

use chrono::{DateTime, Duration, Utc};
use statrs::statistics::Statistics;

/// A time window holding the RSSI samples received in it.
#[derive(Debug, Clone)]
pub struct SignalWindow {
    /// Exclusive lower bound
    pub start: DateTime<Utc>,
    /// Inclusive upper bound
    pub end: DateTime<Utc>,
    samples: Vec<f64>,
}

impl SignalWindow {
    /// Create a new empty window starting at the given time.
    pub fn new(start: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            start,
            end: start + duration,
            samples: Vec::new(),
        }
    }

    /// Check if a timestamp falls within this window.
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp > self.start && timestamp <= self.end
    }

    /// Add a sample to this window.
    pub fn add_sample(&mut self, rssi: f64) {
        self.samples.push(rssi);
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Unweighted mean of the samples, `None` for an empty window.
    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.samples.iter().mean())
        }
    }
}

/// Split `[epoch_start, epoch_start + count * window)` into windows and
/// distribute `samples` into them.
///
/// Samples outside every window are ignored. Empty windows are kept so the
/// caller sees the full window grid.
pub fn fill_windows(
    epoch_start: DateTime<Utc>,
    count: i64,
    window: Duration,
    samples: &[(DateTime<Utc>, f64)],
) -> Vec<SignalWindow> {
    (0..count.max(0))
        .map(|i| {
            let start = epoch_start + window * i as i32;
            let mut signal_window = SignalWindow::new(start, window);
            for (timestamp, rssi) in samples {
                if signal_window.contains(*timestamp) {
                    signal_window.add_sample(*rssi);
                }
            }
            signal_window
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_window_creation() {
        let window = SignalWindow::new(start(), Duration::minutes(1));

        assert_eq!(window.start, start());
        assert_eq!(window.end, start() + Duration::minutes(1));
        assert!(window.is_empty());
        assert_eq!(window.mean(), None);
    }

    #[test]
    fn test_window_contains_is_left_open() {
        let window = SignalWindow::new(start(), Duration::minutes(1));

        assert!(!window.contains(start()));
        assert!(window.contains(start() + Duration::seconds(30)));
        assert!(window.contains(start() + Duration::minutes(1)));
        assert!(!window.contains(start() + Duration::seconds(61)));
    }

    #[test]
    fn test_window_mean() {
        let mut window = SignalWindow::new(start(), Duration::minutes(1));
        window.add_sample(-70.0);
        window.add_sample(-80.0);
        assert_eq!(window.sample_count(), 2);
        assert!((window.mean().unwrap() + 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_fill_windows_boundary_sample() {
        let samples = vec![
            (start(), -60.0),
            (start() + Duration::minutes(1), -70.0),
            (start() + Duration::seconds(90), -72.0),
        ];
        let windows = fill_windows(start(), 3, Duration::minutes(1), &samples);

        assert_eq!(windows.len(), 3);
        // The sample at the epoch start falls in no window.
        assert_eq!(windows[0].sample_count(), 1);
        assert_eq!(windows[0].mean(), Some(-70.0));
        assert_eq!(windows[1].sample_count(), 1);
        assert!(windows[2].is_empty());
    }
}
