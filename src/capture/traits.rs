//! Capture trait definitions
//!
//! Platform-agnostic seams for acquiring a camera/microphone stream.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, watch};

/// Errors raised while acquiring or releasing capture devices
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceAccessError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Capability not supported: {0}")]
    Unsupported(String),

    #[error("Platform error: {0}")]
    Platform(String),
}

/// Video resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which camera the caller would like
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FacingMode {
    /// Front-facing camera
    User,
    /// Rear-facing camera
    Environment,
}

/// Requested video properties. Values are preferences, not hard limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoConstraints {
    pub ideal_width: u32,
    pub ideal_height: u32,
    pub facing_mode: FacingMode,
}

impl Default for VideoConstraints {
    fn default() -> Self {
        Self {
            ideal_width: 1280,
            ideal_height: 720,
            facing_mode: FacingMode::User,
        }
    }
}

/// Device capability request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StreamConstraints {
    pub video: VideoConstraints,
    pub audio: bool,
}

impl Default for StreamConstraints {
    fn default() -> Self {
        Self {
            video: VideoConstraints::default(),
            audio: true,
        }
    }
}

/// Kind of media carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Video,
    Audio,
}

/// Snapshot of a single device track
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackInfo {
    pub kind: TrackKind,
    pub label: String,
    pub live: bool,
}

/// Information about a camera/webcam
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraInfo {
    /// Unique device ID
    pub id: String,

    /// Device name
    pub name: String,
}

/// A decoded video frame in tightly packed RGBA
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    /// Monotonic frame number within the stream, starting at 0
    pub sequence: u64,
    /// Time since the stream produced its first frame
    pub timestamp: Duration,
}

impl VideoFrame {
    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }
}

/// Live camera/microphone stream handed out by [`MediaDevices`].
///
/// The stream exclusively owns its device tracks. Dropping it must release
/// them; `stop_tracks` releases them eagerly.
#[async_trait]
pub trait MediaStream: Send + Sync {
    /// Stream identifier
    fn id(&self) -> &str;

    /// Current track snapshot
    fn tracks(&self) -> Vec<TrackInfo>;

    /// Resolves once the first frame is available and reports its native size
    async fn loaded_metadata(&self) -> Resolution;

    /// Latest decoded frame, for consumers that only care about "now"
    fn latest_frame(&self) -> watch::Receiver<Option<VideoFrame>>;

    /// Every frame in order, for encoders
    fn subscribe_frames(&self) -> broadcast::Receiver<VideoFrame>;

    /// Stop every track and free the hardware. Safe to call repeatedly.
    fn stop_tracks(&self) -> Result<(), DeviceAccessError>;

    /// Whether any track is still live
    fn is_live(&self) -> bool {
        self.tracks().iter().any(|t| t.live)
    }
}

/// Grants access to capture hardware
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Request exclusive access to a stream satisfying `constraints`
    async fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, DeviceAccessError>;

    /// Enumerate cameras, if the backend can
    fn cameras(&self) -> Vec<CameraInfo> {
        Vec::new()
    }
}
