//! Known-case synchronization.
//!
//! This module contains:
//! - The day batch planner deciding which days to fetch
//! - The sync store contract and its memory and file implementations
//! - The synchronizer running one fetch-then-finalize round at a time

pub mod planner;
pub mod store;
pub mod synchronizer;

use crate::core::DayDate;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// When each day was last synced successfully.
pub type LastSyncTimestamps = BTreeMap<DayDate, DateTime<Utc>>;

// Re-export commonly used types
pub use planner::{pending_days, prune_timestamps};
pub use store::{FileSyncStore, MemorySyncStore, StoreError, SyncStore};
pub use synchronizer::{KnownCaseSynchronizer, RoundPhase, SyncError, SyncReport, SyncResult};
