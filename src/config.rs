//! Session configuration
//!
//! Every field has a default, so an empty JSON object is a valid config.

use crate::capture::StreamConstraints;
use crate::detection::PollStrategy;
use crate::overlay::OverlayStyle;
use crate::recorder::default_mime_types;
use crate::upload::UploadSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming a JSON config file
pub const CONFIG_ENV: &str = "CHARISMA_CONFIG";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    /// What to request from the capture device
    pub constraints: StreamConstraints,
    pub detection_interval_ms: u64,
    pub poll_strategy: PollStrategy,
    /// Recorder flush period
    pub timeslice_ms: u64,
    /// Encodings to try, most preferred first
    pub mime_types: Vec<String>,
    pub overlay: OverlayStyle,
    pub upload: UploadSettings,
    /// Length of the demo interview
    pub demo_seconds: u64,
    /// Where the demo writes the recording and an overlay snapshot
    pub output_dir: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            constraints: StreamConstraints::default(),
            detection_interval_ms: 100,
            poll_strategy: PollStrategy::default(),
            timeslice_ms: 1000,
            mime_types: default_mime_types(),
            overlay: OverlayStyle::default(),
            upload: UploadSettings::default(),
            demo_seconds: 5,
            output_dir: None,
        }
    }
}

impl SessionConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_json::from_str(&content)?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load from `CHARISMA_CONFIG` if set, defaults otherwise
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(Path::new(&path)),
            None => Ok(Self::default()),
        }
    }

    pub fn detection_interval(&self) -> Duration {
        Duration::from_millis(self.detection_interval_ms.max(1))
    }

    pub fn timeslice(&self) -> Duration {
        Duration::from_millis(self.timeslice_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::FacingMode;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.detection_interval(), Duration::from_millis(100));
        assert_eq!(config.timeslice(), Duration::from_millis(1000));
        assert_eq!(config.mime_types[0], "video/webm;codecs=vp9");
        assert_eq!(config.constraints.video.ideal_width, 1280);
        assert_eq!(config.constraints.video.ideal_height, 720);
        assert_eq!(config.constraints.video.facing_mode, FacingMode::User);
        assert!(config.constraints.audio);
    }

    #[test]
    fn test_empty_object_is_default() {
        let config: SessionConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"detectionIntervalMs": 250, "pollStrategy": "interval", "demoSeconds": 2, "upload": {{"tickMs": 50}}}}"#
        )
        .unwrap();

        let config = SessionConfig::load(file.path()).unwrap();
        assert_eq!(config.detection_interval_ms, 250);
        assert_eq!(config.poll_strategy, PollStrategy::Interval);
        assert_eq!(config.demo_seconds, 2);
        assert_eq!(config.upload.tick_ms, 50);
        assert_eq!(config.upload.analysis_delay_ms, 1500);
        assert_eq!(config.timeslice_ms, 1000);
    }

    #[test]
    fn test_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{not json").unwrap();
        assert!(matches!(
            SessionConfig::load(file.path()),
            Err(ConfigError::Json(_))
        ));
        assert!(matches!(
            SessionConfig::load(Path::new("/nonexistent/charisma.json")),
            Err(ConfigError::Io(_))
        ));
    }
}
