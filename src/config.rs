//! Configuration for the STOPme agent.
//!
//! The pipeline consumes these values; it never owns or reloads them. The
//! configuration is stored as JSON in the platform config directory and every
//! section falls back to its defaults when missing, so partial files load.

use crate::actuator::audio::Language;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration for the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Ids of the two wrist sensors
    pub devices: DevicePairConfig,

    /// Stream alignment tolerances
    pub sync: SyncConfig,

    /// Sliding window and calibration protocol
    pub buffer: BufferConfig,

    /// Capacity of the classification event channel
    pub event_queue_size: usize,

    /// Actuator selection
    pub policy: PolicyConfig,

    /// Event consumption and cooldown
    pub dispatcher: DispatcherConfig,

    /// Language of the audio feedback clips
    pub language: Language,

    pub audio: AudioConfig,

    /// Reconnection behaviour of device sessions
    pub retry: RetryConfig,

    /// Path for storing transparency stats
    pub data_path: PathBuf,

    /// Default tracing filter when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stopme");

        Self {
            devices: DevicePairConfig::default(),
            sync: SyncConfig::default(),
            buffer: BufferConfig::default(),
            event_queue_size: 3,
            policy: PolicyConfig::default(),
            dispatcher: DispatcherConfig::default(),
            language: Language::default(),
            audio: AudioConfig::default(),
            retry: RetryConfig::default(),
            data_path: data_dir,
            log_filter: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, or defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let config: Config =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("stopme")
            .join("config.json")
    }

    /// Ensure all required directories exist.
    pub fn ensure_directories(&self) -> Result<(), ConfigError> {
        std::fs::create_dir_all(&self.data_path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer.window_size == 0 {
            return Err(ConfigError::Invalid("buffer.window_size must be > 0".into()));
        }
        if self.policy.attempts == 0 {
            return Err(ConfigError::Invalid("policy.attempts must be > 0".into()));
        }
        if self.devices.left_id == self.devices.right_id {
            return Err(ConfigError::Invalid(format!(
                "left and right wrist share the same id '{}'",
                self.devices.left_id
            )));
        }
        Ok(())
    }
}

/// Ids under which the listeners report the two wrists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicePairConfig {
    pub left_id: String,
    pub right_id: String,
}

impl Default for DevicePairConfig {
    fn default() -> Self {
        Self {
            left_id: "bc_left".to_string(),
            right_id: "bc_right".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Maximum tolerated difference between the wrists' newest timestamps
    pub max_skew_ms: u64,
    /// Evict a wrist's triplet older than this (0 disables)
    pub stale_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_skew_ms: 25,
            stale_ms: 0,
        }
    }
}

impl SyncConfig {
    pub fn max_skew_secs(&self) -> f64 {
        self.max_skew_ms as f64 / 1000.0
    }

    pub fn stale_secs(&self) -> f64 {
        self.stale_ms as f64 / 1000.0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Rows per window
    pub window_size: usize,
    /// Rows dropped between consecutive windows (<= 0 clears the buffer)
    #[serde(alias = "overlap")]
    pub hop_size: i64,
    /// Windows skipped before the one-time calibration window
    pub calibration_windows: u32,
    pub gate_actuation_during_calibration: bool,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            window_size: 150,
            hop_size: 75,
            calibration_windows: 3,
            gate_actuation_during_calibration: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Activations on the same actuator before rotating
    pub attempts: u32,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self { attempts: 5 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Minimum time between actuations while the same active tag persists
    #[serde(rename = "cooldown_ms", with = "duration_ms_serde")]
    pub cooldown: Duration,
    /// Bounded wait on the event channel
    #[serde(rename = "poll_timeout_ms", with = "duration_ms_serde")]
    pub poll_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            cooldown: Duration::from_secs(5),
            poll_timeout: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Directory holding the feedback clips
    pub base_path: PathBuf,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            base_path: PathBuf::from("assets").join("audio"),
        }
    }
}

/// Fast-then-slow reconnection schedule for device sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub fast_retry_attempts: u32,
    #[serde(rename = "retry_interval_ms", with = "duration_ms_serde")]
    pub retry_interval: Duration,
    #[serde(rename = "retry_sleep_ms", with = "duration_ms_serde")]
    pub retry_sleep: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            fast_retry_attempts: 5,
            retry_interval: Duration::from_secs(5),
            retry_sleep: Duration::from_secs(60),
        }
    }
}

impl RetryConfig {
    /// Delay before the next connection attempt, given how many have failed.
    pub fn delay_after(&self, failed_attempts: u32) -> Duration {
        if failed_attempts < self.fast_retry_attempts {
            self.retry_interval
        } else {
            self.retry_sleep
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Serialize error: {0}")]
    SerializeError(String),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Serde support for Duration as whole milliseconds.
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.buffer.window_size, 150);
        assert_eq!(config.buffer.hop_size, 75);
        assert_eq!(config.buffer.calibration_windows, 3);
        assert!(config.buffer.gate_actuation_during_calibration);
        assert_eq!(config.sync.max_skew_ms, 25);
        assert_eq!(config.sync.stale_ms, 0);
        assert_eq!(config.policy.attempts, 5);
        assert_eq!(config.dispatcher.cooldown, Duration::from_secs(5));
        assert_eq!(config.language, Language::Eng);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{ "buffer": { "window_size": 100, "overlap": 50 }, "language": "ita" }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.buffer.window_size, 100);
        assert_eq!(config.buffer.hop_size, 50);
        assert_eq!(config.buffer.calibration_windows, 3);
        assert_eq!(config.language, Language::Ita);
        assert_eq!(config.sync.max_skew_ms, 25);
        assert_eq!(config.devices.left_id, "bc_left");
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let config = Config::default();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["dispatcher"]["cooldown_ms"], 5000);
        assert_eq!(value["dispatcher"]["poll_timeout_ms"], 500);
        assert_eq!(value["retry"]["retry_sleep_ms"], 60_000);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = Config::default();
        config.buffer.window_size = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.devices.right_id = config.devices.left_id.clone();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_save_and_load_roundtrip_on_disk() {
        let path = std::env::temp_dir()
            .join(format!("stopme-config-test-{}", uuid::Uuid::new_v4()))
            .join("config.json");

        let mut config = Config::default();
        config.sync.stale_ms = 100;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.sync.stale_ms, 100);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("stopme-does-not-exist").join("config.json");
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.event_queue_size, 3);
    }

    #[test]
    fn test_retry_schedule() {
        let retry = RetryConfig::default();
        assert_eq!(retry.delay_after(0), Duration::from_secs(5));
        assert_eq!(retry.delay_after(4), Duration::from_secs(5));
        assert_eq!(retry.delay_after(5), Duration::from_secs(60));
    }
}
