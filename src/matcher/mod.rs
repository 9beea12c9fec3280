//! Matching of downloaded key batches against local observations.
//!
//! The synchronizer drives a [`Matcher`] with one `receive` per fetched day
//! and one `finalize` per round. [`BatchMatcher`] is the default
//! implementation: it retains batches and runs a throttled detection session
//! on finalize.

pub mod batch;
pub mod timing;

pub use batch::{BatchMatcher, DayBatch, ExposureDetector};
pub use timing::{DetectionTiming, DetectionTimingManager};

use crate::core::DayDate;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors raised while matching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MatchError {
    /// A day's payload could not be ingested
    #[error("failed to ingest batch for {day}: {message}")]
    Receive { day: DayDate, message: String },
    /// The matching session could not be finalized
    #[error("failed to finalize matching session: {0}")]
    Finalize(String),
    /// The detection-timing store is unavailable
    #[error("detection timing unavailable: {0}")]
    Timing(String),
    /// The exposure detector failed
    #[error("exposure detection failed: {0}")]
    Detector(String),
}

/// Consumer of downloaded key batches.
///
/// Within a round `receive` is called at most once per day, oldest day
/// first, and `finalize` exactly once after every `receive` succeeded.
pub trait Matcher: Send + Sync {
    /// Ingest the raw payload published for `day`.
    fn receive(&self, data: &[u8], day: DayDate) -> Result<(), MatchError>;

    /// Close the matching session for the round started at `now`.
    fn finalize(&self, now: DateTime<Utc>) -> Result<(), MatchError>;
}
