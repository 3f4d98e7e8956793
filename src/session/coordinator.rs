//! Capture session coordinator
//!
//! Owns the camera stream, the detection loop, the recorder, the elapsed
//! timer and the overlay for one interview at a time.
//!
//! All mutable state sits behind one lock that is never held across an
//! await. `start` takes a generation number before its first await and
//! re-checks it afterwards; `stop` bumps the generation, so a start that is
//! still waiting on the device, metadata or the model gives up and releases
//! whatever it acquired.

use super::state::{
    ArtifactReceiver, PreviewBinding, SessionError, SessionEvent, SessionResult, SessionSnapshot,
    SessionState, StoppedSession, CAMERA_ALERT,
};
use crate::capture::{MediaDevices, MediaStream, Resolution};
use crate::config::SessionConfig;
use crate::detection::{DetectionContext, DetectionLoop, FaceDetector};
use crate::overlay::{DetectionStatus, OverlayCanvas};
use crate::recorder::{Artifact, MediaEncoder, MediaRecorder, PendingArtifact, RecorderState};
use crate::timer::ElapsedTimer;
use crate::upload::UploadHandoff;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, oneshot, watch};
use uuid::Uuid;

#[derive(Default)]
struct SessionInner {
    state: SessionState,
    generation: u64,
    session_id: Option<Uuid>,
    started_at: Option<Instant>,
    started_wall: Option<DateTime<Utc>>,
    stream: Option<Box<dyn MediaStream>>,
    recorder: Option<MediaRecorder>,
    detection: Option<DetectionLoop>,
    timer: ElapsedTimer,
    preview: PreviewBinding,
}

/// One interview capture session
pub struct CaptureSession {
    devices: Arc<dyn MediaDevices>,
    detector: Arc<dyn FaceDetector>,
    encoder: Arc<dyn MediaEncoder>,
    upload: Option<Arc<dyn UploadHandoff>>,
    config: SessionConfig,

    inner: Mutex<SessionInner>,
    /// Mirrors `SessionInner::generation` for in-flight starts to watch
    generation_tx: watch::Sender<u64>,

    overlay: Arc<Mutex<OverlayCanvas>>,
    status: Arc<watch::Sender<DetectionStatus>>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl CaptureSession {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        detector: Arc<dyn FaceDetector>,
        encoder: Arc<dyn MediaEncoder>,
        config: SessionConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        let (status, _) = watch::channel(DetectionStatus::Inactive);
        let (generation_tx, _) = watch::channel(0);

        Self {
            devices,
            detector,
            encoder,
            upload: None,
            overlay: Arc::new(Mutex::new(OverlayCanvas::new(config.overlay.clone()))),
            config,
            inner: Mutex::new(SessionInner::default()),
            generation_tx,
            status: Arc::new(status),
            event_tx,
        }
    }

    /// Hand every finished recording to `upload`
    pub fn with_upload(mut self, upload: Arc<dyn UploadHandoff>) -> Self {
        self.upload = Some(upload);
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    pub fn session_id(&self) -> Option<Uuid> {
        self.inner.lock().session_id
    }

    /// Wall-clock start of the active session
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().started_wall
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    pub fn status(&self) -> DetectionStatus {
        *self.status.borrow()
    }

    pub fn watch_status(&self) -> watch::Receiver<DetectionStatus> {
        self.status.subscribe()
    }

    pub fn overlay(&self) -> Arc<Mutex<OverlayCanvas>> {
        self.overlay.clone()
    }

    pub fn preview(&self) -> PreviewBinding {
        self.inner.lock().preview.clone()
    }

    pub fn elapsed_display(&self) -> String {
        self.inner.lock().timer.display()
    }

    pub fn has_stream(&self) -> bool {
        self.inner.lock().stream.is_some()
    }

    pub fn is_detecting(&self) -> bool {
        self.inner
            .lock()
            .detection
            .as_ref()
            .map(DetectionLoop::is_running)
            .unwrap_or(false)
    }

    /// Encoding of the running recorder
    pub fn recording_mime_type(&self) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .recorder
            .as_ref()
            .filter(|r| r.state() == RecorderState::Recording)
            .map(|r| r.mime_type().to_string())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let status = self.status().label();
        let inner = self.inner.lock();
        SessionSnapshot {
            state: inner.state,
            session_id: inner.session_id,
            elapsed: inner.timer.display(),
            status,
            recording_mime_type: inner
                .recorder
                .as_ref()
                .filter(|r| r.state() == RecorderState::Recording)
                .map(|r| r.mime_type().to_string()),
        }
    }

    /// Acquire the camera and begin the interview
    pub async fn start(&self) -> SessionResult<Uuid> {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.state != SessionState::Idle {
                return Err(SessionError::AlreadyActive);
            }
            inner.state = SessionState::Starting;
            inner.generation += 1;
            self.generation_tx.send_replace(inner.generation);
            inner.generation
        };

        tracing::info!("Starting interview");

        let granted = self
            .until_cancelled(generation, self.devices.get_user_media(&self.config.constraints))
            .await;
        let stream = match granted {
            None => return Err(SessionError::Cancelled),
            Some(Ok(stream)) => stream,
            Some(Err(e)) => {
                tracing::error!("Error accessing camera: {}", e);
                let mut inner = self.inner.lock();
                if inner.generation != generation {
                    return Err(SessionError::Cancelled);
                }
                inner.state = SessionState::Idle;
                let _ = self.event_tx.send(SessionEvent::Alert(CAMERA_ALERT.to_string()));
                return Err(e.into());
            }
        };

        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                drop(inner);
                return Err(Self::abandon(stream));
            }
            inner.preview.bind(stream.id());
        }

        let metadata = self.until_cancelled(generation, stream.loaded_metadata()).await;
        let Some(resolution) = metadata else {
            return Err(Self::abandon(stream));
        };

        let loaded = self.until_cancelled(generation, self.detector.load()).await;
        match loaded {
            None => return Err(Self::abandon(stream)),
            Some(Ok(())) => tracing::info!("Face detection models loaded"),
            Some(Err(e)) => tracing::error!("Error loading face detection models: {}", e),
        }

        self.commit(generation, stream, resolution)
    }

    /// Resolve `fut` unless `generation` is superseded first
    async fn until_cancelled<F: Future>(&self, generation: u64, fut: F) -> Option<F::Output> {
        tokio::select! {
            biased;
            _ = superseded(self.generation_tx.subscribe(), generation) => None,
            output = fut => self.is_current(generation).then_some(output),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.inner.lock().generation == generation
    }

    fn abandon(stream: Box<dyn MediaStream>) -> SessionError {
        tracing::info!("Start cancelled; releasing stream {}", stream.id());
        if let Err(e) = stream.stop_tracks() {
            tracing::warn!("Failed to release tracks: {}", e);
        }
        SessionError::Cancelled
    }

    /// Everything past the last await happens here, under the lock
    fn commit(
        &self,
        generation: u64,
        stream: Box<dyn MediaStream>,
        resolution: Resolution,
    ) -> SessionResult<Uuid> {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            drop(inner);
            return Err(Self::abandon(stream));
        }

        {
            let mut canvas = self.overlay.lock();
            canvas.resize(resolution.width, resolution.height);
            canvas.clear();
        }
        inner.preview.set_resolution(resolution);

        let session_id = Uuid::new_v4();
        inner.state = SessionState::Active;
        inner.session_id = Some(session_id);
        inner.started_at = Some(Instant::now());
        inner.started_wall = Some(Utc::now());

        inner.timer.start(self.event_tx.clone());

        inner.detection = Some(DetectionLoop::spawn(
            DetectionContext {
                detector: self.detector.clone(),
                frames: stream.latest_frame(),
                overlay: self.overlay.clone(),
                status: self.status.clone(),
                events: self.event_tx.clone(),
            },
            self.config.detection_interval(),
            self.config.poll_strategy,
        ));

        match MediaRecorder::start(
            self.encoder.as_ref(),
            stream.as_ref(),
            &self.config.mime_types,
            self.config.timeslice(),
        ) {
            Ok(recorder) => {
                let _ = self.event_tx.send(SessionEvent::RecordingStarted {
                    mime_type: recorder.mime_type().to_string(),
                });
                inner.recorder = Some(recorder);
            }
            Err(e) => {
                tracing::error!("Error starting recording: {}", e);
                let _ = self.event_tx.send(SessionEvent::RecordingUnavailable {
                    reason: e.to_string(),
                });
            }
        }

        inner.stream = Some(stream);

        let _ = self.event_tx.send(SessionEvent::Started {
            session_id,
            resolution,
        });
        tracing::info!("Interview started ({}, {})", session_id, resolution);
        Ok(session_id)
    }

    /// End the interview and release all hardware. Safe to call at any time.
    ///
    /// Returns `None` unless a session was active. The artifact is assembled
    /// and handed to the upload on a background task.
    pub fn stop(&self) -> Option<StoppedSession> {
        let mut inner = self.inner.lock();
        inner.generation += 1;
        self.generation_tx.send_replace(inner.generation);

        let was_active = inner.state == SessionState::Active;
        let stream = inner.stream.take();
        let mut recorder = inner.recorder.take();
        let detection = inner.detection.take();

        if let Some(stream) = stream.as_ref() {
            if let Err(e) = stream.stop_tracks() {
                tracing::warn!("Failed to release tracks: {}", e);
            }
        }

        // Taken even when the encoder already ended on its own: the collected
        // segments are still waiting on the recorder.
        let pending = recorder
            .as_mut()
            .and_then(|r| match r.stop() {
                Ok(pending) => Some(pending),
                Err(e) => {
                    tracing::warn!("Failed to stop recorder: {}", e);
                    None
                }
            });

        // The loop checks its flag under the overlay lock, so once it is
        // stopped the clear below cannot be painted over.
        if let Some(mut detection) = detection {
            detection.stop();
        }
        inner.preview.clear();
        self.overlay.lock().clear();
        self.status.send_replace(DetectionStatus::Inactive);

        inner.state = SessionState::Idle;
        inner.timer.stop();

        let session_id = inner.session_id.take();
        let started_at = inner.started_at.take();
        inner.started_wall = None;
        drop(inner);

        drop(stream);
        drop(recorder);

        if !was_active {
            tracing::debug!("Stop with no active session");
            return None;
        }
        let session_id = session_id?;
        let duration_ms = started_at
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0);

        let _ = self.event_tx.send(SessionEvent::Stopped {
            session_id,
            duration_ms,
        });
        tracing::info!("Interview stopped after {:.0}ms", duration_ms);

        let (artifact_tx, artifact_rx) = oneshot::channel();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(finalize(
                    session_id,
                    pending,
                    artifact_tx,
                    self.event_tx.clone(),
                    self.upload.clone(),
                ));
            }
            Err(_) => tracing::warn!("No runtime; recording of {} discarded", session_id),
        }

        Some(StoppedSession {
            session_id,
            duration_ms,
            artifact: ArtifactReceiver::new(artifact_rx),
        })
    }
}

async fn superseded(mut generation_rx: watch::Receiver<u64>, generation: u64) {
    let _ = generation_rx.wait_for(|g| *g != generation).await;
}

/// Wait for the recorder, publish the artifact, then hand it to the upload
async fn finalize(
    session_id: Uuid,
    pending: Option<PendingArtifact>,
    artifact_tx: oneshot::Sender<Option<Arc<Artifact>>>,
    events: broadcast::Sender<SessionEvent>,
    upload: Option<Arc<dyn UploadHandoff>>,
) {
    let artifact = match pending {
        Some(pending) => pending.wait().await.map(Arc::new),
        None => None,
    };

    match artifact.as_ref() {
        Some(artifact) => {
            tracing::info!("Recording completed, size: {}", artifact.size());
            let _ = events.send(SessionEvent::RecordingFinalized {
                session_id,
                artifact: artifact.info(),
            });
        }
        None => {
            tracing::info!("Session {} produced no recording", session_id);
            let _ = events.send(SessionEvent::RecordingUnavailable {
                reason: "No recording data was captured".to_string(),
            });
        }
    }

    let _ = artifact_tx.send(artifact.clone());

    if let Some(upload) = upload {
        tracing::info!("Interview stopped - starting automatic upload");
        upload.deliver(artifact).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{DeviceAccessError, SyntheticDevices, SyntheticOptions};
    use crate::detection::ScriptedDetector;
    use crate::recorder::SyntheticEncoder;
    use std::time::Duration;

    fn session(devices: SyntheticDevices) -> CaptureSession {
        CaptureSession::new(
            Arc::new(devices),
            Arc::new(ScriptedDetector::empty()),
            Arc::new(SyntheticEncoder::new()),
            SessionConfig {
                timeslice_ms: 20,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let session = session(SyntheticDevices::with_resolution(320, 240));
        session.start().await.unwrap();
        assert_eq!(session.start().await, Err(SessionError::AlreadyActive));
        assert!(session.stop().is_some());
    }

    #[tokio::test]
    async fn test_stop_while_idle() {
        let session = session(SyntheticDevices::with_resolution(320, 240));
        assert!(session.stop().is_none());
        assert!(session.stop().is_none());
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_denied_camera_alerts() {
        let devices = Arc::new(SyntheticDevices::denying(DeviceAccessError::PermissionDenied(
            "NotAllowedError".to_string(),
        )));
        let session = CaptureSession::new(
            devices.clone(),
            Arc::new(ScriptedDetector::empty()),
            Arc::new(SyntheticEncoder::new()),
            SessionConfig::default(),
        );
        let mut events = session.subscribe();

        let result = session.start().await;
        assert!(matches!(result, Err(SessionError::DeviceAccess(_))));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(devices.live_tracks(), 0);
        assert!(!session.preview().is_bound());

        match events.recv().await.unwrap() {
            SessionEvent::Alert(message) => assert_eq!(message, CAMERA_ALERT),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_start() {
        let devices = Arc::new(SyntheticDevices::new(SyntheticOptions {
            grant_delay: Duration::from_millis(100),
            ..Default::default()
        }));
        let session = Arc::new(CaptureSession::new(
            devices.clone(),
            Arc::new(ScriptedDetector::empty()),
            Arc::new(SyntheticEncoder::new()),
            SessionConfig::default(),
        ));

        let starter = {
            let session = session.clone();
            tokio::spawn(async move { session.start().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(session.state(), SessionState::Starting);

        assert!(session.stop().is_none());
        assert_eq!(starter.await.unwrap(), Err(SessionError::Cancelled));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(devices.live_tracks(), 0);
        assert!(!session.has_stream());
    }

    #[tokio::test]
    async fn test_refusal_after_stop_raises_no_alert() {
        let devices = Arc::new(SyntheticDevices::new(SyntheticOptions {
            deny: Some(DeviceAccessError::PermissionDenied("NotAllowedError".to_string())),
            grant_delay: Duration::from_millis(100),
            ..Default::default()
        }));
        let session = Arc::new(CaptureSession::new(
            devices,
            Arc::new(ScriptedDetector::empty()),
            Arc::new(SyntheticEncoder::new()),
            SessionConfig::default(),
        ));
        let mut events = session.subscribe();

        let starter = {
            let session = session.clone();
            tokio::spawn(async move { session.start().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(session.stop().is_none());

        assert_eq!(starter.await.unwrap(), Err(SessionError::Cancelled));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(events.try_recv().is_err());
        assert_eq!(session.state(), SessionState::Idle);
    }
}
