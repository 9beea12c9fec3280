//! Day batch planning.

use crate::core::DayDate;
use crate::sync::LastSyncTimestamps;
use chrono::{DateTime, Utc};

/// Days that must be fetched at `now`, oldest first.
///
/// The window covers the last `days_to_check` calendar days, today
/// included. Today is always pending because its batch is still being
/// published. An earlier day is pending until it has been synced at or after
/// its own end.
pub fn pending_days(
    now: DateTime<Utc>,
    last_sync: &LastSyncTimestamps,
    days_to_check: u32,
) -> Vec<DayDate> {
    let today = DayDate::from_timestamp(now);

    (0..i64::from(days_to_check))
        .rev()
        .map(|offset| today.days_before(offset))
        .filter(|day| {
            *day == today
                || last_sync
                    .get(day)
                    .map_or(true, |synced_at| *synced_at < day.end())
        })
        .collect()
}

/// Drop entries for days that have left the checked window at `now`.
pub fn prune_timestamps(
    timestamps: &mut LastSyncTimestamps,
    now: DateTime<Utc>,
    days_to_check: u32,
) {
    let span = i64::from(days_to_check.saturating_sub(1));
    let oldest = DayDate::from_timestamp(now).days_before(span);
    timestamps.retain(|day, _| *day >= oldest);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap()
    }

    #[test]
    fn test_first_sync_plans_every_day_oldest_first() {
        let days = pending_days(now(), &LastSyncTimestamps::new(), 10);

        assert_eq!(days.len(), 10);
        assert_eq!(days[0], DayDate::from_ymd(2024, 3, 1).unwrap());
        assert_eq!(days[9], DayDate::from_timestamp(now()));
        assert!(days.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_today_is_always_pending() {
        let today = DayDate::from_timestamp(now());
        let mut last_sync = LastSyncTimestamps::new();
        for offset in 0..3 {
            last_sync.insert(today.days_before(offset), now());
        }

        assert_eq!(pending_days(now(), &last_sync, 3), vec![today]);
    }

    #[test]
    fn test_day_synced_before_its_end_is_refetched() {
        let today = DayDate::from_timestamp(now());
        let yesterday = today.days_before(1);
        let mut last_sync = LastSyncTimestamps::new();
        last_sync.insert(yesterday, yesterday.end() - Duration::minutes(1));

        assert_eq!(pending_days(now(), &last_sync, 2), vec![yesterday, today]);

        last_sync.insert(yesterday, yesterday.end());
        assert_eq!(pending_days(now(), &last_sync, 2), vec![today]);
    }

    #[test]
    fn test_prune_drops_days_outside_window() {
        let today = DayDate::from_timestamp(now());
        let mut timestamps = LastSyncTimestamps::new();
        for offset in 0..15 {
            timestamps.insert(today.days_before(offset), now());
        }

        prune_timestamps(&mut timestamps, now(), 10);

        assert_eq!(timestamps.len(), 10);
        assert_eq!(timestamps.keys().next(), Some(&today.days_before(9)));
        assert!(timestamps.contains_key(&today));
    }

    #[test]
    fn test_zero_days_to_check() {
        assert!(pending_days(now(), &LastSyncTimestamps::new(), 0).is_empty());
    }
}
