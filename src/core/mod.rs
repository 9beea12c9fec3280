//! Core data model and contact detection.
//!
//! This module contains:
//! - Calendar day normalization used for all day-keyed bookkeeping
//! - Handshake and contact records
//! - Epoch boundaries and one-minute signal windows
//! - The contact factory

pub mod contacts;
pub mod day;
pub mod epoch;
pub mod types;
pub mod windowing;

// Re-export commonly used types
pub use contacts::{
    contacts, ContactFactory, BAD_RSSI_THRESHOLD, CONTACT_RSSI_THRESHOLD, EVENT_THRESHOLD,
};
pub use day::DayDate;
pub use epoch::{Epoch, EpochClock, FixedEpochClock};
pub use types::{Contact, EphId, HandshakeModel};
pub use windowing::{fill_windows, SignalWindow};
