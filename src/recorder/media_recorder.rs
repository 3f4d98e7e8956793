//! Media recorder
//!
//! Collects encoder segments for the lifetime of one stream and assembles them
//! into a single artifact once the encoder has been stopped.

use super::encoder::{container_type, select_mime_type, EncoderControl, EncoderSession, MediaEncoder};
use super::state::{Artifact, PendingArtifact, RecorderError, RecorderState};
use crate::capture::MediaStream;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

pub struct MediaRecorder {
    mime_type: String,
    state: Arc<Mutex<RecorderState>>,
    control: Option<Box<dyn EncoderControl>>,
    artifact_rx: Option<oneshot::Receiver<Option<Artifact>>>,
    segments: Arc<AtomicUsize>,
    bytes: Arc<AtomicUsize>,
}

impl MediaRecorder {
    /// Start recording `stream` with the first supported candidate encoding
    pub fn start(
        encoder: &dyn MediaEncoder,
        stream: &dyn MediaStream,
        candidates: &[String],
        timeslice: Duration,
    ) -> Result<Self, RecorderError> {
        let mime_type = select_mime_type(encoder, candidates)
            .ok_or_else(|| RecorderError::UnsupportedEncoding(candidates.to_vec()))?
            .to_string();

        let EncoderSession { segments, control } = encoder.start(stream, &mime_type, timeslice)?;

        let state = Arc::new(Mutex::new(RecorderState::Recording));
        let segment_count = Arc::new(AtomicUsize::new(0));
        let bytes = Arc::new(AtomicUsize::new(0));
        let (artifact_tx, artifact_rx) = oneshot::channel();

        tokio::spawn(collect(
            segments,
            container_type(&mime_type).to_string(),
            state.clone(),
            segment_count.clone(),
            bytes.clone(),
            artifact_tx,
        ));

        tracing::info!("Recording started ({}, {:?} timeslice)", mime_type, timeslice);

        Ok(Self {
            mime_type,
            state,
            control: Some(control),
            artifact_rx: Some(artifact_rx),
            segments: segment_count,
            bytes,
        })
    }

    /// Selected encoding, including codec parameters
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn state(&self) -> RecorderState {
        *self.state.lock()
    }

    /// Segments collected so far
    pub fn segments_collected(&self) -> usize {
        self.segments.load(Ordering::SeqCst)
    }

    /// Bytes collected so far
    pub fn bytes_collected(&self) -> usize {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Ask the encoder to finish. Returns immediately; the artifact is
    /// assembled once the encoder has flushed its last segment.
    pub fn stop(&mut self) -> Result<PendingArtifact, RecorderError> {
        let artifact_rx = self.artifact_rx.take().ok_or(RecorderError::NotRecording)?;

        if let Some(mut control) = self.control.take() {
            if let Err(e) = control.stop() {
                // The encoder may already have ended with the stream.
                tracing::debug!("Encoder stop: {}", e);
            }
        }

        *self.state.lock() = RecorderState::Inactive;
        Ok(PendingArtifact::new(artifact_rx))
    }
}

async fn collect(
    mut segments: mpsc::Receiver<Vec<u8>>,
    container: String,
    state: Arc<Mutex<RecorderState>>,
    segment_count: Arc<AtomicUsize>,
    bytes: Arc<AtomicUsize>,
    artifact_tx: oneshot::Sender<Option<Artifact>>,
) {
    let mut recorded_chunks = Vec::new();

    while let Some(segment) = segments.recv().await {
        if segment.is_empty() {
            continue;
        }
        segment_count.fetch_add(1, Ordering::SeqCst);
        bytes.fetch_add(segment.len(), Ordering::SeqCst);
        recorded_chunks.push(segment);
    }

    *state.lock() = RecorderState::Inactive;

    let artifact = Artifact::assemble(recorded_chunks, &container);
    match &artifact {
        Some(artifact) => tracing::info!(
            "Recording completed, size: {} bytes in {} segments",
            artifact.size(),
            artifact.segment_count
        ),
        None => tracing::warn!("Recording completed without any data"),
    }

    // Nobody waiting is fine: the recorder was dropped without stop().
    let _ = artifact_tx.send(artifact);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{MediaDevices, StreamConstraints, SyntheticDevices};
    use crate::recorder::encoder::default_mime_types;
    use crate::recorder::SyntheticEncoder;

    async fn stream() -> Box<dyn MediaStream> {
        SyntheticDevices::with_resolution(16, 16)
            .get_user_media(&StreamConstraints::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_records_until_stopped() {
        let stream = stream().await;
        let encoder = SyntheticEncoder::new();
        let mut recorder = MediaRecorder::start(
            &encoder,
            stream.as_ref(),
            &default_mime_types(),
            Duration::from_millis(20),
        )
        .unwrap();
        assert_eq!(recorder.state(), RecorderState::Recording);
        assert_eq!(recorder.mime_type(), "video/webm;codecs=vp9");

        tokio::time::sleep(Duration::from_millis(100)).await;
        let pending = recorder.stop().unwrap();
        assert_eq!(recorder.state(), RecorderState::Inactive);

        let artifact = pending.wait().await.unwrap();
        assert_eq!(artifact.mime_type, "video/webm");
        assert!(artifact.size() > 0);
        assert_eq!(artifact.size(), recorder.bytes_collected());
        assert_eq!(artifact.segment_count, recorder.segments_collected());
    }

    #[tokio::test]
    async fn test_second_stop_is_rejected() {
        let stream = stream().await;
        let encoder = SyntheticEncoder::new();
        let mut recorder = MediaRecorder::start(
            &encoder,
            stream.as_ref(),
            &default_mime_types(),
            Duration::from_millis(20),
        )
        .unwrap();
        let _pending = recorder.stop().unwrap();
        assert!(matches!(recorder.stop(), Err(RecorderError::NotRecording)));
    }

    #[tokio::test]
    async fn test_unsupported_everywhere() {
        let stream = stream().await;
        let encoder = SyntheticEncoder::supporting(&["video/x-matroska"]);
        let result = MediaRecorder::start(
            &encoder,
            stream.as_ref(),
            &default_mime_types(),
            Duration::from_millis(20),
        );
        assert!(matches!(result, Err(RecorderError::UnsupportedEncoding(_))));
    }

    #[tokio::test]
    async fn test_fallback_encoding_produces_artifact() {
        let stream = stream().await;
        let encoder = SyntheticEncoder::supporting(&["video/webm"]);
        let mut recorder = MediaRecorder::start(
            &encoder,
            stream.as_ref(),
            &default_mime_types(),
            Duration::from_millis(10),
        )
        .unwrap();
        assert_eq!(recorder.mime_type(), "video/webm");

        tokio::time::sleep(Duration::from_millis(50)).await;
        let artifact = recorder.stop().unwrap().wait().await.unwrap();
        assert_eq!(artifact.mime_type, "video/webm");
        assert!(artifact.size() > 0);
    }

    /// Emits one segment, then closes as if the encoder process had exited
    struct EndsEarly;

    impl MediaEncoder for EndsEarly {
        fn is_type_supported(&self, _mime_type: &str) -> bool {
            true
        }

        fn start(
            &self,
            _stream: &dyn MediaStream,
            _mime_type: &str,
            _timeslice: Duration,
        ) -> Result<EncoderSession, RecorderError> {
            let (tx, segments) = mpsc::channel(4);
            tx.try_send(vec![1, 2, 3, 4])
                .map_err(|e| RecorderError::InitFailed(e.to_string()))?;
            let (control, _stop_rx) = crate::recorder::StopSignal::new();
            Ok(EncoderSession {
                segments,
                control: Box::new(control),
            })
        }
    }

    #[tokio::test]
    async fn test_encoder_ending_early_keeps_artifact() {
        let stream = stream().await;
        let mut recorder = MediaRecorder::start(
            &EndsEarly,
            stream.as_ref(),
            &default_mime_types(),
            Duration::from_millis(20),
        )
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(recorder.state(), RecorderState::Inactive);

        let artifact = recorder.stop().unwrap().wait().await.unwrap();
        assert_eq!(artifact.size(), 4);
        assert_eq!(artifact.segment_count, 1);
    }
}
