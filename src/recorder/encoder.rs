//! Encoder backend seam and encoding selection

use super::state::RecorderError;
use crate::capture::MediaStream;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Encodings tried in order when none are configured
pub const DEFAULT_MIME_TYPES: [&str; 3] = ["video/webm;codecs=vp9", "video/webm", "video/mp4"];

pub fn default_mime_types() -> Vec<String> {
    DEFAULT_MIME_TYPES.iter().map(|s| s.to_string()).collect()
}

/// Strip codec parameters: `video/webm;codecs=vp9` -> `video/webm`
pub fn container_type(mime_type: &str) -> &str {
    mime_type.split(';').next().unwrap_or(mime_type).trim()
}

/// First candidate the backend can produce
pub fn select_mime_type<'a>(encoder: &dyn MediaEncoder, candidates: &'a [String]) -> Option<&'a str> {
    candidates
        .iter()
        .map(String::as_str)
        .find(|mime| encoder.is_type_supported(mime))
}

/// Lets the recorder ask a running encoder to flush and close its output
pub trait EncoderControl: Send {
    fn stop(&mut self) -> Result<(), RecorderError>;
}

/// A running encoder. `segments` closes once the encoder has flushed
/// everything after a stop request (or after the stream ended).
pub struct EncoderSession {
    pub segments: mpsc::Receiver<Vec<u8>>,
    pub control: Box<dyn EncoderControl>,
}

/// Turns a live stream into container bytes
pub trait MediaEncoder: Send + Sync {
    /// Whether `mime_type` can be produced on this platform
    fn is_type_supported(&self, mime_type: &str) -> bool;

    /// Start encoding `stream`, flushing a segment roughly every `timeslice`
    fn start(
        &self,
        stream: &dyn MediaStream,
        mime_type: &str,
        timeslice: Duration,
    ) -> Result<EncoderSession, RecorderError>;
}

/// `EncoderControl` backed by a oneshot. Dropping it also stops the encoder.
pub struct StopSignal(Option<oneshot::Sender<()>>);

impl StopSignal {
    pub fn new() -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self(Some(tx)), rx)
    }
}

impl EncoderControl for StopSignal {
    fn stop(&mut self) -> Result<(), RecorderError> {
        match self.0.take() {
            // Receiver already gone means the encoder finished on its own.
            Some(tx) => {
                let _ = tx.send(());
                Ok(())
            }
            None => Err(RecorderError::NotRecording),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recorder::SyntheticEncoder;

    #[test]
    fn test_container_type() {
        assert_eq!(container_type("video/webm;codecs=vp9"), "video/webm");
        assert_eq!(container_type("video/mp4"), "video/mp4");
    }

    #[test]
    fn test_selection_falls_back_in_order() {
        let candidates = default_mime_types();

        let all = SyntheticEncoder::new();
        assert_eq!(select_mime_type(&all, &candidates), Some("video/webm;codecs=vp9"));

        let webm_only = SyntheticEncoder::supporting(&["video/webm"]);
        assert_eq!(select_mime_type(&webm_only, &candidates), Some("video/webm"));

        let mp4_only = SyntheticEncoder::supporting(&["video/mp4"]);
        assert_eq!(select_mime_type(&mp4_only, &candidates), Some("video/mp4"));

        let none = SyntheticEncoder::supporting(&[]);
        assert_eq!(select_mime_type(&none, &candidates), None);
    }

    #[test]
    fn test_stop_signal_fires_once() {
        let (mut signal, mut rx) = StopSignal::new();
        signal.stop().unwrap();
        assert!(rx.try_recv().is_ok());
        assert!(matches!(signal.stop(), Err(RecorderError::NotRecording)));
    }
}
