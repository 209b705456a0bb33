//! Configuration management for the exercise recorder
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! `EXERCISE_RECORDER__SECTION__KEY` environment variables.

use crate::errors::RecorderError;
use crate::media::format;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderConfig {
    pub capture: CaptureConfig,
    pub recording: RecordingConfig,
    pub storage: StorageConfig,
}

/// Quality hints passed to the capture backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub frame_rate: u32,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    /// Audio sample rate in Hz
    pub sample_rate: u32,
    pub channels: u16,
}

/// Session and encoder behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Interval at which encoders hand over a slice of output
    pub timeslice_ms: u64,
    /// Elapsed-timer refresh interval
    pub tick_ms: u64,
    pub video_bitrate: u32,
    /// JPEG quality for the motion-JPEG baseline (1-100)
    pub jpeg_quality: u8,
    /// Record video and audio as two independent tracks
    pub split_tracks: bool,
    pub require_label: bool,
    pub require_kind: bool,
    /// Video MIME types in preference order
    pub video_formats: Vec<String>,
    /// Audio MIME types in preference order
    pub audio_formats: Vec<String>,
}

/// Where and how the exercise library is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    pub directory: String,
    /// Single key holding the serialized collection
    pub key: String,
    pub quota_bytes: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            capture: CaptureConfig {
                ideal_width: 1280,
                ideal_height: 720,
                frame_rate: 30,
                echo_cancellation: true,
                noise_suppression: true,
                sample_rate: 44100,
                channels: 1,
            },
            recording: RecordingConfig {
                timeslice_ms: 100,
                tick_ms: 1000,
                video_bitrate: 2_500_000,
                jpeg_quality: 80,
                split_tracks: true,
                require_label: true,
                require_kind: false,
                video_formats: vec![
                    format::H264_MP4.to_string(),
                    format::MOTION_JPEG.to_string(),
                ],
                audio_formats: vec![format::WAV.to_string(), format::OGG_OPUS.to_string()],
            },
            storage: StorageConfig {
                directory: "./exercise-data".to_string(),
                key: "exercises".to_string(),
                quota_bytes: 256 * 1024 * 1024,
            },
        }
    }
}

impl RecorderConfig {
    pub const ENV_PREFIX: &'static str = "EXERCISE_RECORDER";

    /// Load configuration from defaults, an optional TOML file and the environment
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RecorderError> {
        let path = path.as_ref();
        let defaults = config::Config::try_from(&Self::default())
            .map_err(|e| RecorderError::Config(format!("Failed to build defaults: {}", e)))?;

        let settings = config::Config::builder()
            .add_source(defaults)
            .add_source(
                config::File::new(&path.to_string_lossy(), config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix(Self::ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| RecorderError::Config(format!("Failed to read config: {}", e)))?;

        let loaded: RecorderConfig = settings
            .try_deserialize()
            .map_err(|e| RecorderError::Config(format!("Failed to parse config: {}", e)))?;
        loaded.validate().map_err(RecorderError::Config)?;

        log::info!("Loaded configuration (file: {:?})", path);
        Ok(loaded)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RecorderError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| RecorderError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, toml_string)?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Get default config file path
    pub fn default_path() -> PathBuf {
        PathBuf::from("exercise-recorder.toml")
    }

    /// Load from default location, falling back to defaults on any error
    pub fn load_or_default() -> Self {
        Self::load(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    pub fn storage_dir(&self) -> PathBuf {
        PathBuf::from(&self.storage.directory)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.capture.ideal_width == 0 || self.capture.ideal_height == 0 {
            return Err("Invalid ideal resolution".to_string());
        }
        if self.capture.frame_rate == 0 || self.capture.frame_rate > 240 {
            return Err("Invalid frame rate (must be 1-240)".to_string());
        }
        if self.capture.sample_rate == 0 {
            return Err("Sample rate must be positive".to_string());
        }
        if self.capture.channels != 1 && self.capture.channels != 2 {
            return Err("Audio channels must be 1 or 2".to_string());
        }

        if self.recording.timeslice_ms == 0 {
            return Err("Timeslice must be positive".to_string());
        }
        if self.recording.tick_ms == 0 {
            return Err("Timer tick must be positive".to_string());
        }
        if self.recording.timeslice_ms > self.recording.tick_ms {
            return Err("Timeslice must not exceed the timer tick".to_string());
        }
        if self.recording.jpeg_quality == 0 || self.recording.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }

        if self.storage.key.trim().is_empty() {
            return Err("Storage key must not be empty".to_string());
        }
        if self.storage.quota_bytes == 0 {
            return Err("Storage quota must be positive".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RecorderConfig::default();
        assert_eq!(config.capture.ideal_width, 1280);
        assert_eq!(config.capture.ideal_height, 720);
        assert_eq!(config.capture.sample_rate, 44100);
        assert_eq!(config.recording.timeslice_ms, 100);
        assert_eq!(config.recording.tick_ms, 1000);
        assert_eq!(config.storage.key, "exercises");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut bad = RecorderConfig::default();
        bad.capture.ideal_width = 0;
        assert!(bad.validate().is_err());

        let mut bad = RecorderConfig::default();
        bad.recording.timeslice_ms = 2000;
        assert!(bad.validate().is_err());

        let mut bad = RecorderConfig::default();
        bad.storage.key = "  ".to_string();
        assert!(bad.validate().is_err());

        let mut bad = RecorderConfig::default();
        bad.capture.channels = 6;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recorder.toml");

        let mut config = RecorderConfig::default();
        config.recording.require_kind = true;
        config.storage.quota_bytes = 4096;
        config.save_to_file(&path).unwrap();

        let loaded = RecorderConfig::load(&path).unwrap();
        assert!(loaded.recording.require_kind);
        assert_eq!(loaded.storage.quota_bytes, 4096);
        assert_eq!(loaded.recording.video_formats, config.recording.video_formats);
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.toml");
        fs::write(&path, "[recording]\ntimeslice_ms = 250\n").unwrap();

        let loaded = RecorderConfig::load(&path).unwrap();
        assert_eq!(loaded.recording.timeslice_ms, 250);
        assert_eq!(loaded.recording.tick_ms, 1000);
        assert_eq!(loaded.capture.ideal_width, 1280);
    }

    #[test]
    fn test_invalid_file_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        fs::write(&path, "[recording]\njpeg_quality = 0\n").unwrap();

        assert!(matches!(
            RecorderConfig::load(&path),
            Err(RecorderError::Config(_))
        ));
    }

    #[test]
    fn test_config_toml_format() {
        let toml_string = toml::to_string_pretty(&RecorderConfig::default()).unwrap();
        assert!(toml_string.contains("[capture]"));
        assert!(toml_string.contains("[recording]"));
        assert!(toml_string.contains("[storage]"));
        assert!(toml_string.contains("timeslice_ms"));
    }

    #[test]
    fn test_load_nonexistent_file() {
        let loaded = RecorderConfig::load("nonexistent_recorder_config.toml").unwrap();
        assert_eq!(loaded.capture.frame_rate, 30);
    }
}
