//! Synthetic encoder
//!
//! Produces a deterministic byte stream (container signature followed by one
//! small record per frame) so recording can be exercised without codecs.

use super::encoder::{
    container_type, EncoderSession, MediaEncoder, StopSignal, DEFAULT_MIME_TYPES,
};
use super::state::RecorderError;
use crate::capture::{MediaStream, VideoFrame};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};

const WEBM_SIGNATURE: [u8; 4] = [0x1a, 0x45, 0xdf, 0xa3];
const MP4_SIGNATURE: [u8; 8] = [0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p'];

pub struct SyntheticEncoder {
    supported: Vec<String>,
    fail_on_start: bool,
    sessions: AtomicUsize,
}

impl SyntheticEncoder {
    /// Supports every default encoding
    pub fn new() -> Self {
        Self::supporting(&DEFAULT_MIME_TYPES)
    }

    /// Supports exactly `mime_types`
    pub fn supporting(mime_types: &[&str]) -> Self {
        Self {
            supported: mime_types.iter().map(|s| s.to_string()).collect(),
            fail_on_start: false,
            sessions: AtomicUsize::new(0),
        }
    }

    /// Claims support but fails to construct, like a broken platform encoder
    pub fn failing() -> Self {
        Self {
            fail_on_start: true,
            ..Self::new()
        }
    }

    /// Encoder sessions started so far
    pub fn sessions(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaEncoder for SyntheticEncoder {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.iter().any(|t| t == mime_type)
    }

    fn start(
        &self,
        stream: &dyn MediaStream,
        mime_type: &str,
        timeslice: Duration,
    ) -> Result<EncoderSession, RecorderError> {
        if self.fail_on_start {
            return Err(RecorderError::InitFailed(format!(
                "synthetic encoder refused {mime_type}"
            )));
        }

        let header = match container_type(mime_type) {
            "video/mp4" => MP4_SIGNATURE.to_vec(),
            _ => WEBM_SIGNATURE.to_vec(),
        };

        let (segments_tx, segments_rx) = mpsc::channel(32);
        let (control, stop_rx) = StopSignal::new();
        let frames = stream.subscribe_frames();
        self.sessions.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(encode(
            frames,
            header,
            timeslice.max(Duration::from_millis(1)),
            segments_tx,
            stop_rx,
        ));

        Ok(EncoderSession {
            segments: segments_rx,
            control: Box::new(control),
        })
    }
}

async fn encode(
    mut frames: broadcast::Receiver<VideoFrame>,
    header: Vec<u8>,
    timeslice: Duration,
    segments: mpsc::Sender<Vec<u8>>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut pending = header;
    let mut flush = tokio::time::interval(timeslice);
    // The first tick completes immediately.
    flush.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            frame = frames.recv() => match frame {
                Ok(frame) => {
                    pending.extend_from_slice(&frame.sequence.to_le_bytes());
                    pending.extend_from_slice(&(frame.timestamp.as_millis() as u64).to_le_bytes());
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Synthetic encoder skipped {} frames", skipped);
                }
                Err(RecvError::Closed) => break,
            },
            _ = flush.tick() => {
                if !pending.is_empty() && segments.send(std::mem::take(&mut pending)).await.is_err() {
                    return;
                }
            }
        }
    }

    if !pending.is_empty() {
        let _ = segments.send(pending).await;
    }
}
