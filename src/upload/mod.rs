//! Upload handoff
//!
//! A finished recording is handed to an `UploadHandoff` once assembled. The
//! bundled `SimulatedUpload` only reports progress; no bytes leave the process.

pub mod simulated;
pub mod validate;

use crate::recorder::Artifact;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

pub use simulated::{SimulatedUpload, UploadSettings};
pub use validate::{
    allowed_file, secure_filename, stored_file_name, validate_resume, validate_video,
    MAX_RESUME_BYTES, MAX_VIDEO_BYTES, RESUME_EXTENSIONS, VIDEO_EXTENSIONS,
};

/// Upload errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UploadError {
    #[error("Unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("File too large: {size} bytes (limit {limit})")]
    TooLarge { size: u64, limit: u64 },

    #[error("File is empty")]
    EmptyFile,

    #[error("No recording available")]
    MissingArtifact,
}

/// Upload phase reported to observers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStage {
    Uploading,
    Processing,
    Complete,
    /// Nothing was recorded
    Skipped,
    /// The recording failed validation
    Rejected,
}

/// Progress update
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub stage: UploadStage,
    /// 0.0 - 100.0
    pub percent: f32,
    pub message: String,
    pub file_name: Option<String>,
}

impl UploadProgress {
    pub fn uploading(percent: f32, file_name: &str) -> Self {
        Self {
            stage: UploadStage::Uploading,
            percent,
            message: format!("Uploading... {}%", percent.round() as u32),
            file_name: Some(file_name.to_string()),
        }
    }

    pub fn processing(file_name: &str) -> Self {
        Self {
            stage: UploadStage::Processing,
            percent: 100.0,
            message: "Upload complete! Processing your interview...".to_string(),
            file_name: Some(file_name.to_string()),
        }
    }

    pub fn complete(file_name: &str) -> Self {
        Self {
            stage: UploadStage::Complete,
            percent: 100.0,
            message: "Analysis complete! View your feedback.".to_string(),
            file_name: Some(file_name.to_string()),
        }
    }

    pub fn skipped() -> Self {
        Self {
            stage: UploadStage::Skipped,
            percent: 0.0,
            message: UploadError::MissingArtifact.to_string(),
            file_name: None,
        }
    }

    pub fn rejected(error: &UploadError, file_name: &str) -> Self {
        Self {
            stage: UploadStage::Rejected,
            percent: 0.0,
            message: error.to_string(),
            file_name: Some(file_name.to_string()),
        }
    }

    /// Whether no further updates follow this one
    pub fn is_final(&self) -> bool {
        matches!(
            self.stage,
            UploadStage::Complete | UploadStage::Skipped | UploadStage::Rejected
        )
    }
}

/// Receives the artifact of a stopped session
#[async_trait]
pub trait UploadHandoff: Send + Sync {
    /// Called once per stopped session; `None` when nothing was recorded.
    async fn deliver(&self, artifact: Option<Arc<Artifact>>);
}
