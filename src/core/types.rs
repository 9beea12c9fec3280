//! Handshake and contact records.
//!
//! Handshakes are what the Bluetooth layer hands us; contacts are what the
//! contact factory derives from them. Neither carries location data.

use crate::core::day::DayDate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length in bytes of an ephemeral identifier.
pub const EPH_ID_LENGTH: usize = 16;

/// A rotating pseudonymous identifier broadcast during one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EphId(pub [u8; EPH_ID_LENGTH]);

impl EphId {
    pub fn new(bytes: [u8; EPH_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Build an identifier from a slice, if it has the right length.
    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        let array: [u8; EPH_ID_LENGTH] = bytes.try_into().ok()?;
        Some(Self(array))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for EphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// One observed advertisement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandshakeModel {
    /// Identifier seen in the advertisement
    pub eph_id: EphId,
    /// When the advertisement was received
    pub timestamp: DateTime<Utc>,
    /// Received signal strength in dBm, if the radio reported one
    pub rssi: Option<f64>,
}

impl HandshakeModel {
    pub fn new(eph_id: EphId, timestamp: DateTime<Utc>, rssi: Option<f64>) -> Self {
        Self {
            eph_id,
            timestamp,
            rssi,
        }
    }
}

/// Sustained, sufficiently strong proximity to one identifier on one day.
///
/// Created only by the contact factory. Fields are read-only so a contact
/// cannot change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    id: Option<i64>,
    eph_id: EphId,
    date: DayDate,
    window_count: u32,
    associated_known_case: Option<i64>,
}

impl Contact {
    pub(crate) fn new(eph_id: EphId, date: DayDate, window_count: u32) -> Self {
        Self {
            id: None,
            eph_id,
            date,
            window_count,
            associated_known_case: None,
        }
    }

    /// Identifier assigned by the contact store, `None` until persisted.
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    pub fn eph_id(&self) -> &EphId {
        &self.eph_id
    }

    pub fn date(&self) -> DayDate {
        self.date
    }

    /// Number of one-minute windows that qualified as proximity.
    pub fn window_count(&self) -> u32 {
        self.window_count
    }

    /// Known case this contact was matched against, if any.
    pub fn associated_known_case(&self) -> Option<i64> {
        self.associated_known_case
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eph_id_from_slice() {
        assert!(EphId::from_slice(&[0u8; 16]).is_some());
        assert!(EphId::from_slice(&[0u8; 15]).is_none());
    }

    #[test]
    fn test_eph_id_display_is_hex() {
        let mut bytes = [0u8; 16];
        bytes[0] = 0xab;
        bytes[15] = 0x01;
        let shown = EphId::new(bytes).to_string();
        assert_eq!(shown.len(), 32);
        assert!(shown.starts_with("ab"));
        assert!(shown.ends_with("01"));
    }

    #[test]
    fn test_new_contact_is_unpersisted() {
        let contact = Contact::new(
            EphId::new([7u8; 16]),
            DayDate::from_ymd(2024, 3, 10).unwrap(),
            3,
        );
        assert_eq!(contact.id(), None);
        assert_eq!(contact.associated_known_case(), None);
        assert_eq!(contact.window_count(), 3);
    }
}
