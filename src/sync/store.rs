//! Persistence of sync bookkeeping.

use crate::config::{Config, NetworkingParameters};
use crate::sync::LastSyncTimestamps;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Errors from the sync store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// Storage for per-day sync timestamps and networking parameters.
///
/// Writes must be visible to the next read from the same process.
pub trait SyncStore: Send + Sync {
    fn last_sync_timestamps(&self) -> LastSyncTimestamps;

    fn set_last_sync_timestamps(&self, timestamps: LastSyncTimestamps) -> Result<(), StoreError>;

    fn networking_parameters(&self) -> NetworkingParameters;
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemorySyncStore {
    timestamps: Mutex<LastSyncTimestamps>,
    parameters: NetworkingParameters,
}

impl MemorySyncStore {
    pub fn new(parameters: NetworkingParameters) -> Self {
        Self {
            timestamps: Mutex::new(LastSyncTimestamps::new()),
            parameters,
        }
    }
}

impl SyncStore for MemorySyncStore {
    fn last_sync_timestamps(&self) -> LastSyncTimestamps {
        self.timestamps.lock().clone()
    }

    fn set_last_sync_timestamps(&self, timestamps: LastSyncTimestamps) -> Result<(), StoreError> {
        *self.timestamps.lock() = timestamps;
        Ok(())
    }

    fn networking_parameters(&self) -> NetworkingParameters {
        self.parameters.clone()
    }
}

/// On-disk format of [`FileSyncStore`].
#[derive(Debug, Default, Serialize, Deserialize)]
struct PersistedSyncState {
    last_sync_timestamps: LastSyncTimestamps,
}

/// JSON file store.
///
/// The file is rewritten on every update; the cached copy serves reads.
#[derive(Debug)]
pub struct FileSyncStore {
    path: PathBuf,
    timestamps: Mutex<LastSyncTimestamps>,
    parameters: NetworkingParameters,
}

impl FileSyncStore {
    /// Open the store at `path`, loading existing state if present.
    pub fn open(path: PathBuf, parameters: NetworkingParameters) -> Result<Self, StoreError> {
        let timestamps = if path.exists() {
            let content =
                std::fs::read_to_string(&path).map_err(|e| StoreError::Io(e.to_string()))?;
            let state: PersistedSyncState = serde_json::from_str(&content)
                .map_err(|e| StoreError::Serialize(e.to_string()))?;
            state.last_sync_timestamps
        } else {
            LastSyncTimestamps::new()
        };

        Ok(Self {
            path,
            timestamps: Mutex::new(timestamps),
            parameters,
        })
    }

    /// Open the store at the configured sync state path.
    pub fn from_config(config: &Config) -> Result<Self, StoreError> {
        config
            .ensure_directories()
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Self::open(config.sync_state_path(), config.networking.clone())
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|name| name.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SyncStore for FileSyncStore {
    fn last_sync_timestamps(&self) -> LastSyncTimestamps {
        self.timestamps.lock().clone()
    }

    fn set_last_sync_timestamps(&self, timestamps: LastSyncTimestamps) -> Result<(), StoreError> {
        let mut cached = self.timestamps.lock();

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }
        let state = PersistedSyncState {
            last_sync_timestamps: timestamps,
        };
        let json = serde_json::to_string_pretty(&state)
            .map_err(|e| StoreError::Serialize(e.to_string()))?;

        // Replace by rename so an interrupted write never truncates the state.
        let staging = self.staging_path();
        std::fs::write(&staging, json).map_err(|e| StoreError::Io(e.to_string()))?;
        std::fs::rename(&staging, &self.path).map_err(|e| StoreError::Io(e.to_string()))?;

        *cached = state.last_sync_timestamps;
        Ok(())
    }

    fn networking_parameters(&self) -> NetworkingParameters {
        self.parameters.clone()
    }
}
