//! Default matcher: retain batches, detect on finalize.

use crate::core::DayDate;
use crate::matcher::{DetectionTiming, MatchError, Matcher};
use crate::transparency::SharedTransparencyLog;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A retained day of published keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayBatch {
    pub day: DayDate,
    pub data: Vec<u8>,
}

/// Matches retained key batches against local observations.
///
/// Implementations own the key schedule and the handshake store; this crate
/// only decides when they run.
pub trait ExposureDetector: Send + Sync {
    /// Run one detection session and return the number of qualifying events.
    fn detect(&self, batches: &[DayBatch]) -> Result<usize, MatchError>;
}

/// Matcher that keeps the latest payload per day and runs a detection
/// session on finalize when the timing policy allows one.
pub struct BatchMatcher {
    detector: Arc<dyn ExposureDetector>,
    timing: Arc<dyn DetectionTiming>,
    retention_days: u32,
    retained: Mutex<BTreeMap<DayDate, Vec<u8>>>,
    transparency: Option<SharedTransparencyLog>,
}

impl BatchMatcher {
    /// Create a matcher retaining `retention_days` days, today included.
    pub fn new(
        detector: Arc<dyn ExposureDetector>,
        timing: Arc<dyn DetectionTiming>,
        retention_days: u32,
    ) -> Self {
        Self {
            detector,
            timing,
            retention_days,
            retained: Mutex::new(BTreeMap::new()),
            transparency: None,
        }
    }

    /// Count detection sessions in the given transparency log.
    pub fn with_transparency_log(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = Some(log);
        self
    }

    /// Days currently retained, oldest first.
    pub fn retained_days(&self) -> Vec<DayDate> {
        self.retained.lock().keys().copied().collect()
    }

    fn prune(&self, now: DateTime<Utc>) {
        let oldest_kept = DayDate::from_timestamp(now)
            .days_before(i64::from(self.retention_days.saturating_sub(1)));
        self.retained.lock().retain(|day, _| *day >= oldest_kept);
    }
}

impl Matcher for BatchMatcher {
    fn receive(&self, data: &[u8], day: DayDate) -> Result<(), MatchError> {
        if data.is_empty() {
            return Err(MatchError::Receive {
                day,
                message: "empty payload".to_string(),
            });
        }
        self.retained.lock().insert(day, data.to_vec());
        tracing::debug!(%day, bytes = data.len(), "Retained key batch");
        Ok(())
    }

    fn finalize(&self, now: DateTime<Utc>) -> Result<(), MatchError> {
        self.prune(now);

        if !self.timing.should_detect(now) {
            tracing::debug!("Detection limit reached, deferring matching session");
            return Ok(());
        }

        let batches: Vec<DayBatch> = self
            .retained
            .lock()
            .iter()
            .map(|(day, data)| DayBatch {
                day: *day,
                data: data.clone(),
            })
            .collect();

        let matches = self.detector.detect(&batches)?;
        self.timing.add_detection(now)?;

        if let Some(ref log) = self.transparency {
            log.record_detection();
        }
        tracing::info!(days = batches.len(), matches, "Exposure detection session finished");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::DetectionTimingManager;
    use chrono::{Duration, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingDetector {
        sessions: AtomicUsize,
        last_days: Mutex<Vec<DayDate>>,
    }

    impl ExposureDetector for CountingDetector {
        fn detect(&self, batches: &[DayBatch]) -> Result<usize, MatchError> {
            self.sessions.fetch_add(1, Ordering::SeqCst);
            *self.last_days.lock() = batches.iter().map(|b| b.day).collect();
            Ok(0)
        }
    }

    struct FailingDetector;

    impl ExposureDetector for FailingDetector {
        fn detect(&self, _batches: &[DayBatch]) -> Result<usize, MatchError> {
            Err(MatchError::Detector("key store locked".to_string()))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_finalize_runs_detector_over_retained_days() {
        let detector = Arc::new(CountingDetector::default());
        let timing = Arc::new(DetectionTimingManager::default());
        let matcher = BatchMatcher::new(detector.clone(), timing.clone(), 10);

        let today = DayDate::from_timestamp(now());
        matcher.receive(&[1], today.days_before(1)).unwrap();
        matcher.receive(&[2], today).unwrap();
        matcher.finalize(now()).unwrap();

        assert_eq!(detector.sessions.load(Ordering::SeqCst), 1);
        assert_eq!(*detector.last_days.lock(), vec![today.days_before(1), today]);
        assert_eq!(timing.detections(), vec![now()]);
    }

    #[test]
    fn test_days_outside_retention_are_dropped() {
        let detector = Arc::new(CountingDetector::default());
        let timing = Arc::new(DetectionTimingManager::default());
        let matcher = BatchMatcher::new(detector, timing, 2);

        let today = DayDate::from_timestamp(now());
        matcher.receive(&[1], today.days_before(2)).unwrap();
        matcher.receive(&[1], today.days_before(1)).unwrap();
        matcher.finalize(now()).unwrap();

        assert_eq!(matcher.retained_days(), vec![today.days_before(1)]);
    }

    #[test]
    fn test_finalize_respects_detection_limit() {
        let detector = Arc::new(CountingDetector::default());
        let timing = Arc::new(DetectionTimingManager::new(1));
        let matcher = BatchMatcher::new(detector.clone(), timing, 10);

        matcher.finalize(now()).unwrap();
        matcher.finalize(now() + Duration::hours(1)).unwrap();

        assert_eq!(detector.sessions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_detector_failure_is_not_recorded() {
        let timing = Arc::new(DetectionTimingManager::default());
        let matcher = BatchMatcher::new(Arc::new(FailingDetector), timing.clone(), 10);

        let err = matcher.finalize(now()).unwrap_err();
        assert!(matches!(err, MatchError::Detector(_)));
        assert!(timing.detections().is_empty());
    }

    #[test]
    fn test_empty_payload_is_rejected() {
        let matcher = BatchMatcher::new(
            Arc::new(CountingDetector::default()),
            Arc::new(DetectionTimingManager::default()),
            10,
        );
        assert!(matcher.receive(&[], DayDate::from_timestamp(now())).is_err());
    }
}
