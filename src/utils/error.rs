//! Error types and handling
//!
//! Wraps each module's error for callers that deal with more than one of
//! them, and maps to a code/message pair for front ends.

use crate::capture::DeviceAccessError;
use crate::config::ConfigError;
use crate::detection::DetectionEngineError;
use crate::overlay::OverlayError;
use crate::recorder::RecorderError;
use crate::session::SessionError;
use crate::upload::UploadError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Device(#[from] DeviceAccessError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionEngineError),

    #[error("Recording error: {0}")]
    Recording(#[from] RecorderError),

    #[error("Overlay error: {0}")]
    Overlay(#[from] OverlayError),

    #[error("Upload error: {0}")]
    Upload(#[from] UploadError),
}

/// Error response for frontend
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Device(DeviceAccessError::PermissionDenied(_))
            | AppError::Session(SessionError::DeviceAccess(DeviceAccessError::PermissionDenied(_))) => {
                "PERMISSION_DENIED"
            }
            AppError::Device(_) | AppError::Session(SessionError::DeviceAccess(_)) => "DEVICE_ERROR",
            AppError::Session(_) => "SESSION_ERROR",
            AppError::Detection(_) => "DETECTION_ERROR",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::Overlay(_) => "OVERLAY_ERROR",
            AppError::Upload(_) => "UPLOAD_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
