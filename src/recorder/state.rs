//! Recorder state and output types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::oneshot;
use uuid::Uuid;

/// Recorder errors
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("No supported encoding among {0:?}")]
    UnsupportedEncoding(Vec<String>),

    #[error("Recorder initialization failed: {0}")]
    InitFailed(String),

    #[error("Not recording")]
    NotRecording,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Recorder lifecycle, mirroring `MediaRecorder.state`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    /// Not recording (never started, stopped, or stream ended)
    Inactive,
    /// Collecting segments
    Recording,
}

impl Default for RecorderState {
    fn default() -> Self {
        Self::Inactive
    }
}

/// The assembled recording of one session
#[derive(Debug, Clone)]
pub struct Artifact {
    pub id: Uuid,
    /// Container type, without codec parameters (e.g. `video/webm`)
    pub mime_type: String,
    pub data: Vec<u8>,
    /// Number of segments concatenated into `data`
    pub segment_count: usize,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// Concatenate `segments` in order. `None` when nothing was collected.
    pub fn assemble(segments: Vec<Vec<u8>>, mime_type: &str) -> Option<Self> {
        if segments.is_empty() {
            return None;
        }

        let segment_count = segments.len();
        let data = segments.concat();
        Some(Self {
            id: Uuid::new_v4(),
            mime_type: mime_type.to_string(),
            data,
            segment_count,
            created_at: Utc::now(),
        })
    }

    /// Size in bytes
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// File extension for the container
    pub fn extension(&self) -> &'static str {
        match self.mime_type.as_str() {
            "video/mp4" => "mp4",
            "video/quicktime" => "mov",
            _ => "webm",
        }
    }

    /// Suggested file name, e.g. `interview-20240101_120000.webm`
    pub fn file_name(&self) -> String {
        format!(
            "interview-{}.{}",
            self.created_at.format("%Y%m%d_%H%M%S"),
            self.extension()
        )
    }

    pub fn info(&self) -> ArtifactInfo {
        ArtifactInfo {
            id: self.id,
            mime_type: self.mime_type.clone(),
            size: self.size(),
            segment_count: self.segment_count,
            created_at: self.created_at,
        }
    }
}

/// Serializable artifact summary for front ends
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactInfo {
    pub id: Uuid,
    pub mime_type: String,
    pub size: usize,
    pub segment_count: usize,
    pub created_at: DateTime<Utc>,
}

/// Resolves once the recorder has finished assembling its artifact
pub struct PendingArtifact {
    rx: oneshot::Receiver<Option<Artifact>>,
}

impl PendingArtifact {
    pub(crate) fn new(rx: oneshot::Receiver<Option<Artifact>>) -> Self {
        Self { rx }
    }

    /// Wait for assembly. `None` if nothing was recorded or the recorder
    /// went away without finishing.
    pub async fn wait(self) -> Option<Artifact> {
        self.rx.await.ok().flatten()
    }
}
