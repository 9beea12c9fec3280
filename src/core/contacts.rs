//! Contact detection from raw handshake signal strength.
//!
//! For each identifier the factory compares one-minute window means against
//! the identifier's own epoch-wide mean. A window counts toward a contact when
//! it is both a spike relative to that baseline and below the absolute
//! proximity threshold. Only counts leave this module, never RSSI values.

use crate::core::day::DayDate;
use crate::core::epoch::{EpochClock, FixedEpochClock};
use crate::core::types::{Contact, EphId, HandshakeModel};
use crate::core::windowing::fill_windows;
use crate::transparency::SharedTransparencyLog;
use chrono::{DateTime, Duration, Utc};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

/// Samples at or below this strength (dBm) are treated as noise.
pub const BAD_RSSI_THRESHOLD: f64 = -85.0;

/// Minimum ratio of window mean to epoch mean for a window to match.
pub const EVENT_THRESHOLD: f64 = 0.8;

/// A window mean must be strictly below this strength (dBm) to match.
pub const CONTACT_RSSI_THRESHOLD: f64 = -80.0;

/// Length of one averaging window in seconds.
pub const WINDOW_LENGTH_SECS: i64 = 60;

/// Turns handshakes into contacts.
pub struct ContactFactory {
    clock: Box<dyn EpochClock>,
    transparency: Option<SharedTransparencyLog>,
}

impl ContactFactory {
    /// Create a factory using the given epoch boundaries.
    pub fn new(clock: impl EpochClock + 'static) -> Self {
        Self {
            clock: Box::new(clock),
            transparency: None,
        }
    }

    /// Count created contacts in the given transparency log.
    pub fn with_transparency_log(mut self, log: SharedTransparencyLog) -> Self {
        self.transparency = Some(log);
        self
    }

    /// Derive contacts from a batch of handshakes.
    ///
    /// `contact_threshold` belongs to the upstream de-duplication policy and
    /// does not influence window matching here. Output is ordered by
    /// identifier.
    pub fn contacts(&self, handshakes: &[HandshakeModel], contact_threshold: u32) -> Vec<Contact> {
        let mut groups: BTreeMap<EphId, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
        for handshake in handshakes {
            let samples = groups.entry(handshake.eph_id).or_default();
            if let Some(rssi) = handshake.rssi {
                if rssi > BAD_RSSI_THRESHOLD {
                    samples.push((handshake.timestamp, rssi));
                }
            }
        }

        let contacts: Vec<Contact> = groups
            .into_iter()
            .filter_map(|(eph_id, samples)| self.contact_for_group(eph_id, samples))
            .collect();

        tracing::debug!(
            handshakes = handshakes.len(),
            contacts = contacts.len(),
            contact_threshold,
            "Derived contacts from handshakes"
        );

        if let Some(ref log) = self.transparency {
            log.record_contacts_created(contacts.len() as u64);
        }

        contacts
    }

    fn contact_for_group(
        &self,
        eph_id: EphId,
        mut samples: Vec<(DateTime<Utc>, f64)>,
    ) -> Option<Contact> {
        if samples.is_empty() {
            return None;
        }
        samples.sort_by_key(|(timestamp, _)| *timestamp);

        let epoch_mean = samples.iter().map(|(_, rssi)| *rssi).mean();
        let first_seen = samples[0].0;

        let window_length = Duration::seconds(WINDOW_LENGTH_SECS);
        let epoch_start = self.clock.epoch_start(first_seen);
        let window_count =
            self.clock.epoch_duration().num_seconds() / window_length.num_seconds();

        let matching_windows = fill_windows(epoch_start, window_count, window_length, &samples)
            .iter()
            .filter_map(|window| window.mean())
            .filter(|&window_mean| is_matching_window(window_mean, epoch_mean))
            .count();

        if matching_windows == 0 {
            return None;
        }

        Some(Contact::new(
            eph_id,
            DayDate::from_timestamp(first_seen),
            matching_windows as u32,
        ))
    }
}

impl Default for ContactFactory {
    fn default() -> Self {
        Self::new(FixedEpochClock::default())
    }
}

/// Derive contacts using the default 15-minute epoch clock.
pub fn contacts(handshakes: &[HandshakeModel], contact_threshold: u32) -> Vec<Contact> {
    ContactFactory::default().contacts(handshakes, contact_threshold)
}

fn is_matching_window(window_mean: f64, epoch_mean: f64) -> bool {
    window_mean / epoch_mean > EVENT_THRESHOLD && window_mean < CONTACT_RSSI_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transparency::create_shared_log;
    use chrono::TimeZone;

    fn epoch_start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    fn eph(n: u8) -> EphId {
        EphId::new([n; 16])
    }

    /// Two handshakes in the middle of each listed minute window.
    fn handshakes_in_windows(id: EphId, windows: &[(i64, f64)]) -> Vec<HandshakeModel> {
        windows
            .iter()
            .flat_map(|&(minute, rssi)| {
                [20, 40].into_iter().map(move |second| {
                    HandshakeModel::new(
                        id,
                        epoch_start() + Duration::minutes(minute) + Duration::seconds(second),
                        Some(rssi),
                    )
                })
            })
            .collect()
    }

    #[test]
    fn test_empty_input_gives_no_contacts() {
        assert!(contacts(&[], 1).is_empty());
    }

    #[test]
    fn test_single_qualifying_window() {
        let mut windows: Vec<(i64, f64)> = (0..15).map(|m| (m, -70.0)).collect();
        windows[7] = (7, -82.0);
        let handshakes = handshakes_in_windows(eph(1), &windows);

        let result = contacts(&handshakes, 1);

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].window_count(), 1);
        assert_eq!(*result[0].eph_id(), eph(1));
        assert_eq!(result[0].date(), DayDate::from_timestamp(epoch_start()));
        assert_eq!(result[0].id(), None);
        assert_eq!(result[0].associated_known_case(), None);
    }

    #[test]
    fn test_strong_signal_everywhere_gives_no_contact() {
        let windows: Vec<(i64, f64)> = (0..15).map(|m| (m, -60.0 - m as f64)).collect();
        let handshakes = handshakes_in_windows(eph(2), &windows);

        assert!(contacts(&handshakes, 1).is_empty());
    }

    #[test]
    fn test_window_mean_at_threshold_does_not_match() {
        let handshakes = handshakes_in_windows(eph(3), &[(0, -80.0), (1, -80.0)]);
        assert!(contacts(&handshakes, 1).is_empty());
    }

    #[test]
    fn test_noise_and_missing_rssi_are_discarded() {
        let id = eph(4);
        let handshakes = vec![
            HandshakeModel::new(id, epoch_start() + Duration::seconds(30), None),
            HandshakeModel::new(id, epoch_start() + Duration::seconds(40), Some(-85.0)),
            HandshakeModel::new(id, epoch_start() + Duration::seconds(50), Some(-95.0)),
        ];
        assert!(contacts(&handshakes, 1).is_empty());
    }

    #[test]
    fn test_all_weak_windows_count() {
        let windows: Vec<(i64, f64)> = (0..4).map(|m| (m, -83.0)).collect();
        let handshakes = handshakes_in_windows(eph(5), &windows);

        let result = contacts(&handshakes, 1);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].window_count(), 4);
    }

    #[test]
    fn test_sample_on_window_end_belongs_to_that_window() {
        let id = eph(6);
        // 12:02:00 closes window 1 (12:01, 12:02], so the weak sample sits
        // alone in window 1 while window 2 only sees the strong one.
        let handshakes = vec![
            HandshakeModel::new(id, epoch_start() + Duration::seconds(30), Some(-70.0)),
            HandshakeModel::new(id, epoch_start() + Duration::minutes(2), Some(-84.0)),
            HandshakeModel::new(id, epoch_start() + Duration::seconds(150), Some(-70.0)),
        ];

        let result = contacts(&handshakes, 1);
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].window_count(), 1);
    }

    #[test]
    fn test_groups_are_independent() {
        let mut handshakes = handshakes_in_windows(eph(8), &[(0, -70.0), (1, -70.0)]);
        handshakes.extend(handshakes_in_windows(eph(9), &[(0, -82.0), (1, -83.0)]));
        handshakes.reverse();

        let result = contacts(&handshakes, 1);
        assert_eq!(result.len(), 1);
        assert_eq!(*result[0].eph_id(), eph(9));
        assert_eq!(result[0].window_count(), 2);
    }

    #[test]
    fn test_contacts_are_counted_in_transparency_log() {
        let log = create_shared_log();
        let factory = ContactFactory::default().with_transparency_log(log.clone());
        let handshakes = handshakes_in_windows(eph(10), &[(0, -82.0)]);

        factory.contacts(&handshakes, 1);
        assert_eq!(log.stats().contacts_created, 1);
    }
}
