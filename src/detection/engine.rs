//! Detection engine seam
//!
//! The face detector is an opaque external capability. This module only fixes
//! the shape of what goes in (a frame) and what comes out (boxes + scores).

use crate::capture::{Resolution, VideoFrame};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised by a detection engine
#[derive(Error, Debug, Clone)]
pub enum DetectionEngineError {
    #[error("Detection model not loaded")]
    ModelNotLoaded,

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),
}

/// Axis-aligned bounding box in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// The x-coordinate of the top-left corner.
    pub x: f32,
    /// The y-coordinate of the top-left corner.
    pub y: f32,
    /// The width of the box.
    pub width: f32,
    /// The height of the box.
    pub height: f32,
}

impl BoundingBox {
    pub const fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Map the box from one image size to another.
    pub fn scaled(&self, from: Resolution, to: Resolution) -> Self {
        if from == to || from.width == 0 || from.height == 0 {
            return *self;
        }
        let sx = to.width as f32 / from.width as f32;
        let sy = to.height as f32 / from.height as f32;
        Self {
            x: self.x * sx,
            y: self.y * sy,
            width: self.width * sx,
            height: self.height * sy,
        }
    }
}

/// One detected face
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Detection {
    pub bounding_box: BoundingBox,
    /// Score in `[0, 1]`
    pub confidence: f32,
}

impl Detection {
    pub fn new(bounding_box: BoundingBox, confidence: f32) -> Self {
        Self {
            bounding_box,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Confidence as a whole percentage, as shown on the overlay label
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence.clamp(0.0, 1.0) * 100.0).round() as u32
    }

    pub fn scaled(&self, from: Resolution, to: Resolution) -> Self {
        Self {
            bounding_box: self.bounding_box.scaled(from, to),
            confidence: self.confidence,
        }
    }
}

/// Per-tick snapshot. Empty means no face this tick.
pub type DetectionResult = Vec<Detection>;

/// A face detector. Must tolerate being called roughly ten times a second.
#[async_trait]
pub trait FaceDetector: Send + Sync {
    /// Warm up the engine (fetch weights, compile graphs). Called once per
    /// session before the first `detect`.
    async fn load(&self) -> Result<(), DetectionEngineError> {
        Ok(())
    }

    /// Detect faces in `frame`. Box coordinates are in frame pixels.
    async fn detect(&self, frame: &VideoFrame) -> Result<DetectionResult, DetectionEngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scaling_maps_between_sizes() {
        let bbox = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        let scaled = bbox.scaled(Resolution::new(320, 240), Resolution::new(640, 480));
        assert_eq!(scaled, BoundingBox::new(20.0, 40.0, 60.0, 80.0));
    }

    #[test]
    fn test_scaling_ignores_empty_source() {
        let bbox = BoundingBox::new(1.0, 2.0, 3.0, 4.0);
        assert_eq!(bbox.scaled(Resolution::new(0, 0), Resolution::new(640, 480)), bbox);
    }

    #[test]
    fn test_confidence_is_clamped_and_rounded() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0);
        assert_eq!(Detection::new(bbox, 0.904).confidence_percent(), 90);
        assert_eq!(Detection::new(bbox, 0.906).confidence_percent(), 91);
        assert_eq!(Detection::new(bbox, 1.7).confidence, 1.0);
    }
}
