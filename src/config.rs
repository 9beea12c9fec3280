//! Configuration for the proximity tracing core.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Default number of trailing days checked on every sync.
pub const DEFAULT_DAYS_TO_CHECK: u32 = 10;

/// Default publication granularity of the key service.
pub const DEFAULT_BATCH_LENGTH: Duration = Duration::from_secs(2 * 60 * 60);

/// Default cap on exposure detection sessions per rolling day.
pub const DEFAULT_MAX_DETECTIONS_PER_DAY: usize = 20;

/// Main configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Networking behavior of the synchronizer
    pub networking: NetworkingParameters,

    /// Endpoint of the application's key service, if configured
    pub descriptor: Option<SyncDescriptor>,

    /// Path for storing sync state and transparency logs
    pub data_path: PathBuf,

    /// Maximum exposure detection sessions in any 24 hours
    pub max_detections_per_day: usize,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proximity-core");

        Self {
            networking: NetworkingParameters::default(),
            descriptor: None,
            data_path: data_dir,
            max_detections_per_day: DEFAULT_MAX_DETECTIONS_PER_DAY,
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a specific file, falling back to defaults
    /// when it does not exist.
    pub fn load_from(path: &std::path::Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let content =
                std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
            let config: Config =
                serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file.
    pub fn save_to(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Serialize(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::Io(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("proximity-core")
            .join("config.json")
    }

    /// Path of the persisted sync timestamps.
    pub fn sync_state_path(&self) -> PathBuf {
        self.data_path.join("sync_state.json")
    }

    /// Path of the persisted transparency counters.
    pub fn transparency_path(&self) -> PathBuf {
        self.data_path.join("transparency.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }
}

/// Networking options read by the synchronizer at the start of each round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkingParameters {
    /// How many trailing days, today included, are checked on each sync
    pub days_to_check: u32,

    /// Publication granularity of the key service
    #[serde(with = "duration_serde")]
    pub batch_length: Duration,
}

impl Default for NetworkingParameters {
    fn default() -> Self {
        Self {
            days_to_check: DEFAULT_DAYS_TO_CHECK,
            batch_length: DEFAULT_BATCH_LENGTH,
        }
    }
}

impl NetworkingParameters {
    /// The first batch boundary strictly after `now`.
    ///
    /// Boundaries are multiples of `batch_length` since the Unix epoch. A
    /// zero batch length yields `now`.
    pub fn next_batch_release(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let length_ms = self.batch_length.as_millis() as i64;
        if length_ms <= 0 {
            return now;
        }
        let now_ms = now.timestamp_millis();
        let next_ms = (now_ms.div_euclid(length_ms) + 1) * length_ms;
        Utc.timestamp_millis_opt(next_ms).single().unwrap_or(now)
    }
}

/// Identifies an application's key service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncDescriptor {
    /// Application identifier
    pub app_id: String,
    /// Base URL for fetching published key batches
    pub bucket_base_url: String,
    /// Base URL for reporting own keys
    pub report_base_url: String,
}

impl SyncDescriptor {
    pub fn new(
        app_id: impl Into<String>,
        bucket_base_url: impl Into<String>,
        report_base_url: impl Into<String>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            bucket_base_url: bucket_base_url.into(),
            report_base_url: report_base_url.into(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Serialize error: {0}")]
    Serialize(String),
}

/// Serde support for Duration.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.networking.days_to_check, 10);
        assert_eq!(config.networking.batch_length, Duration::from_secs(7200));
        assert_eq!(config.max_detections_per_day, 20);
        assert!(config.descriptor.is_none());
    }

    #[test]
    fn test_networking_parameters_serialize_seconds() {
        let params = NetworkingParameters::default();
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["batch_length"], 7200);
        assert_eq!(json["days_to_check"], 10);
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.networking.days_to_check = 14;
        config.descriptor = Some(SyncDescriptor::new(
            "org.example.app",
            "https://bucket.example.org",
            "https://report.example.org",
        ));
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.networking.days_to_check, 14);
        assert_eq!(loaded.descriptor, config.descriptor);
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = Config::load_from(&dir.path().join("absent.json")).unwrap();
        assert_eq!(loaded.networking, NetworkingParameters::default());
    }

    #[test]
    fn test_next_batch_release() {
        let params = NetworkingParameters::default();
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 9, 30, 0).unwrap();
        assert_eq!(
            params.next_batch_release(now),
            Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap()
        );

        let on_boundary = Utc.with_ymd_and_hms(2024, 3, 10, 10, 0, 0).unwrap();
        assert_eq!(
            params.next_batch_release(on_boundary),
            Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
        );
    }
}
