//! Privacy-preserving transparency log.
//!
//! This module tracks and exposes statistics about synchronization and
//! matching without storing any identifiers, keys, or signal values.

use crate::config::Config;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Activity counters for the current session.
#[derive(Debug)]
pub struct TransparencyLog {
    /// Number of key batch requests sent to the remote service
    requests_issued: AtomicU64,
    /// Number of days marked as synced
    days_synced: AtomicU64,
    /// Number of sync rounds that finished successfully
    rounds_completed: AtomicU64,
    /// Number of sync rounds that ended in an error
    rounds_failed: AtomicU64,
    /// Number of sync rounds cancelled by the caller
    rounds_cancelled: AtomicU64,
    /// Number of exposure detection sessions run
    detections: AtomicU64,
    /// Number of contacts derived from handshakes
    contacts_created: AtomicU64,
    /// Session start time
    session_start: DateTime<Utc>,
    /// Path for persisting stats
    persist_path: Option<PathBuf>,
}

impl TransparencyLog {
    /// Create a new transparency log.
    pub fn new() -> Self {
        Self {
            requests_issued: AtomicU64::new(0),
            days_synced: AtomicU64::new(0),
            rounds_completed: AtomicU64::new(0),
            rounds_failed: AtomicU64::new(0),
            rounds_cancelled: AtomicU64::new(0),
            detections: AtomicU64::new(0),
            contacts_created: AtomicU64::new(0),
            session_start: Utc::now(),
            persist_path: None,
        }
    }

    /// Create a transparency log with persistence.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self::new();
        log.persist_path = Some(path);

        if let Err(e) = log.load() {
            tracing::warn!("Could not load previous transparency stats: {e}");
        }

        log
    }

    /// Create a transparency log persisted at the configured path.
    pub fn from_config(config: &Config) -> Self {
        Self::with_persistence(config.transparency_path())
    }

    pub fn record_request(&self) {
        self.requests_issued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_day_synced(&self) {
        self.days_synced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round_completed(&self) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round_failed(&self) {
        self.rounds_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_round_cancelled(&self) {
        self.rounds_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detection(&self) {
        self.detections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_contacts_created(&self, count: u64) {
        self.contacts_created.fetch_add(count, Ordering::Relaxed);
    }

    /// Get the current statistics.
    pub fn stats(&self) -> TransparencyStats {
        TransparencyStats {
            requests_issued: self.requests_issued.load(Ordering::Relaxed),
            days_synced: self.days_synced.load(Ordering::Relaxed),
            rounds_completed: self.rounds_completed.load(Ordering::Relaxed),
            rounds_failed: self.rounds_failed.load(Ordering::Relaxed),
            rounds_cancelled: self.rounds_cancelled.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            contacts_created: self.contacts_created.load(Ordering::Relaxed),
            session_start: self.session_start,
            session_duration_secs: (Utc::now() - self.session_start).num_seconds().max(0) as u64,
        }
    }

    /// Get a summary string for display.
    pub fn summary(&self) -> String {
        let stats = self.stats();
        format!(
            "Session Statistics:\n\
             - Key batch requests: {}\n\
             - Days synced: {}\n\
             - Sync rounds completed: {} (failed: {}, cancelled: {})\n\
             - Exposure detections: {}\n\
             - Contacts derived: {}\n\
             - Session duration: {} seconds\n\
             \n\
             Privacy Guarantee:\n\
             - Raw proximity data never leaves this device\n\
             - Only published keys are downloaded\n\
             - Matching runs locally",
            stats.requests_issued,
            stats.days_synced,
            stats.rounds_completed,
            stats.rounds_failed,
            stats.rounds_cancelled,
            stats.detections,
            stats.contacts_created,
            stats.session_duration_secs
        )
    }

    /// Save stats to disk.
    pub fn save(&self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }

            let stats = self.stats();
            let persisted = PersistedStats {
                requests_issued: stats.requests_issued,
                days_synced: stats.days_synced,
                rounds_completed: stats.rounds_completed,
                rounds_failed: stats.rounds_failed,
                rounds_cancelled: stats.rounds_cancelled,
                detections: stats.detections,
                contacts_created: stats.contacts_created,
                last_updated: Utc::now(),
            };

            let json = serde_json::to_string_pretty(&persisted).map_err(std::io::Error::other)?;

            std::fs::write(path, json)?;
        }
        Ok(())
    }

    /// Load stats from disk.
    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let persisted: PersistedStats =
                    serde_json::from_str(&content).map_err(std::io::Error::other)?;

                self.requests_issued.store(persisted.requests_issued, Ordering::Relaxed);
                self.days_synced.store(persisted.days_synced, Ordering::Relaxed);
                self.rounds_completed.store(persisted.rounds_completed, Ordering::Relaxed);
                self.rounds_failed.store(persisted.rounds_failed, Ordering::Relaxed);
                self.rounds_cancelled.store(persisted.rounds_cancelled, Ordering::Relaxed);
                self.detections.store(persisted.detections, Ordering::Relaxed);
                self.contacts_created.store(persisted.contacts_created, Ordering::Relaxed);
            }
        }
        Ok(())
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.requests_issued.store(0, Ordering::Relaxed);
        self.days_synced.store(0, Ordering::Relaxed);
        self.rounds_completed.store(0, Ordering::Relaxed);
        self.rounds_failed.store(0, Ordering::Relaxed);
        self.rounds_cancelled.store(0, Ordering::Relaxed);
        self.detections.store(0, Ordering::Relaxed);
        self.contacts_created.store(0, Ordering::Relaxed);
    }
}

impl Default for TransparencyLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of transparency statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransparencyStats {
    pub requests_issued: u64,
    pub days_synced: u64,
    pub rounds_completed: u64,
    pub rounds_failed: u64,
    pub rounds_cancelled: u64,
    pub detections: u64,
    pub contacts_created: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Stats format for persistence.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedStats {
    requests_issued: u64,
    days_synced: u64,
    rounds_completed: u64,
    rounds_failed: u64,
    rounds_cancelled: u64,
    detections: u64,
    contacts_created: u64,
    last_updated: DateTime<Utc>,
}

/// Thread-safe shared transparency log.
pub type SharedTransparencyLog = Arc<TransparencyLog>;

/// Create a new shared transparency log.
pub fn create_shared_log() -> SharedTransparencyLog {
    Arc::new(TransparencyLog::new())
}

/// Create a new shared transparency log with persistence.
pub fn create_shared_log_with_persistence(path: PathBuf) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::with_persistence(path))
}

/// Create a new shared transparency log persisted at the configured path.
pub fn create_shared_log_from_config(config: &Config) -> SharedTransparencyLog {
    Arc::new(TransparencyLog::from_config(config))
}
