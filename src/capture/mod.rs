//! Capture backends
//!
//! This module provides camera and microphone acquisition behind the
//! `MediaDevices` / `MediaStream` traits.

pub mod synthetic;
pub mod traits;

#[cfg(feature = "native")]
pub mod native;

pub use synthetic::{SyntheticDevices, SyntheticOptions};
pub use traits::{
    CameraInfo, DeviceAccessError, FacingMode, MediaDevices, MediaStream, Resolution,
    StreamConstraints, TrackInfo, TrackKind, VideoConstraints, VideoFrame,
};
