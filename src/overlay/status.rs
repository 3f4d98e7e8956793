//! Face detection status indicator

use serde::{Deserialize, Serialize};

/// What the status pill next to the preview shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "state", content = "faces")]
pub enum DetectionStatus {
    /// No session running
    Inactive,
    /// Session running, nothing found on the last tick
    NoFace,
    /// Faces found on the last tick
    Detected(usize),
}

impl DetectionStatus {
    pub fn from_count(count: usize) -> Self {
        if count == 0 {
            Self::NoFace
        } else {
            Self::Detected(count)
        }
    }

    /// Whether the indicator dot is lit
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Detected(_))
    }

    pub fn label(&self) -> String {
        match self {
            Self::Inactive => "Face Detection: Inactive".to_string(),
            Self::NoFace => "No Face Detected".to_string(),
            Self::Detected(n) => format!("Face Detected: {n}"),
        }
    }
}

impl Default for DetectionStatus {
    fn default() -> Self {
        Self::Inactive
    }
}
