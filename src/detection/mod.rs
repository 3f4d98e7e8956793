//! Face detection
//!
//! - `FaceDetector` trait for the external detection engine
//! - `DetectionLoop` polling the engine while a session is active
//! - `ScriptedDetector` replaying canned results

pub mod detection_loop;
pub mod engine;
pub mod scripted;

pub use detection_loop::{DetectionContext, DetectionLoop, PollStrategy};
pub use engine::{BoundingBox, Detection, DetectionEngineError, DetectionResult, FaceDetector};
pub use scripted::ScriptedDetector;
