//! Interview capture session
//!
//! - `CaptureSession` coordinating camera, detection, recording and timer
//! - `SessionEvent` broadcast to display observers

pub mod coordinator;
pub mod state;

pub use coordinator::CaptureSession;
pub use state::{
    ArtifactReceiver, PreviewBinding, SessionError, SessionEvent, SessionResult, SessionSnapshot,
    SessionState, StoppedSession, CAMERA_ALERT,
};
