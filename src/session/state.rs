//! Session state and events

use crate::capture::{DeviceAccessError, Resolution};
use crate::detection::Detection;
use crate::overlay::DetectionStatus;
use crate::recorder::{Artifact, ArtifactInfo};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Shown when the camera cannot be acquired
pub const CAMERA_ALERT: &str =
    "Unable to access camera. Please ensure you have granted camera permissions.";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("A session is already active or starting")]
    AlreadyActive,

    #[error("Start was cancelled by stop")]
    Cancelled,

    #[error("Device access failed: {0}")]
    DeviceAccess(#[from] DeviceAccessError),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Lifecycle of a capture session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Idle,
    /// Waiting on device grant, metadata or model load
    Starting,
    Active,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Events broadcast to display observers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Interview started
    Started {
        session_id: Uuid,
        resolution: Resolution,
    },
    /// Interview stopped
    Stopped { session_id: Uuid, duration_ms: f64 },
    /// User-facing alert
    Alert(String),
    /// Result of one detection tick
    FaceStatus {
        status: DetectionStatus,
        detections: Vec<Detection>,
    },
    /// Elapsed time, once per second
    TimerTick { seconds: u64, display: String },
    /// Recorder running with the chosen encoding
    RecordingStarted { mime_type: String },
    /// Artifact assembled
    RecordingFinalized {
        session_id: Uuid,
        artifact: ArtifactInfo,
    },
    /// Session carries on without a recording, or nothing was recorded
    RecordingUnavailable { reason: String },
}

/// Which stream the preview is showing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviewBinding {
    stream_id: Option<String>,
    resolution: Option<Resolution>,
}

impl PreviewBinding {
    pub fn bind(&mut self, stream_id: &str) {
        self.stream_id = Some(stream_id.to_string());
        self.resolution = None;
    }

    /// Record the stream's native size once metadata has loaded
    pub fn set_resolution(&mut self, resolution: Resolution) {
        if self.stream_id.is_some() {
            self.resolution = Some(resolution);
        }
    }

    pub fn clear(&mut self) {
        self.stream_id = None;
        self.resolution = None;
    }

    pub fn is_bound(&self) -> bool {
        self.stream_id.is_some()
    }

    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    pub fn resolution(&self) -> Option<Resolution> {
        self.resolution
    }
}

/// Resolves with the session's artifact once the recorder has finished
pub struct ArtifactReceiver {
    rx: oneshot::Receiver<Option<Arc<Artifact>>>,
}

impl ArtifactReceiver {
    pub(crate) fn new(rx: oneshot::Receiver<Option<Arc<Artifact>>>) -> Self {
        Self { rx }
    }

    /// `None` when nothing was recorded
    pub async fn wait(self) -> Option<Arc<Artifact>> {
        self.rx.await.ok().flatten()
    }
}

/// Returned by `CaptureSession::stop` when a session was active
pub struct StoppedSession {
    pub session_id: Uuid,
    pub duration_ms: f64,
    pub artifact: ArtifactReceiver,
}

/// Serializable snapshot for front ends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub session_id: Option<Uuid>,
    pub elapsed: String,
    pub status: String,
    pub recording_mime_type: Option<String>,
}
