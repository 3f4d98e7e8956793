//! Recording system module
//!
//! - `MediaEncoder` trait for encoder backends (synthetic, FFmpeg)
//! - `MediaRecorder` collecting segments into one `Artifact`
//! - Encoding selection with ordered fallbacks

pub mod encoder;
pub mod ffmpeg;
pub mod media_recorder;
pub mod state;
pub mod synthetic;

pub use encoder::{
    container_type, default_mime_types, select_mime_type, EncoderControl, EncoderSession,
    MediaEncoder, StopSignal, DEFAULT_MIME_TYPES,
};
pub use ffmpeg::FfmpegEncoder;
pub use media_recorder::MediaRecorder;
pub use state::{Artifact, ArtifactInfo, PendingArtifact, RecorderError, RecorderState};
pub use synthetic::SyntheticEncoder;
