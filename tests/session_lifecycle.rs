use async_trait::async_trait;
use charisma_lib::capture::{MediaStream, SyntheticDevices, SyntheticOptions};
use charisma_lib::config::SessionConfig;
use charisma_lib::detection::{BoundingBox, Detection, DetectionEngineError, PollStrategy, ScriptedDetector};
use charisma_lib::overlay::{DetectionStatus, OverlayShape};
use charisma_lib::recorder::{
    Artifact, EncoderSession, MediaEncoder, RecorderError, StopSignal, SyntheticEncoder,
};
use charisma_lib::session::{CaptureSession, SessionError, SessionEvent, SessionState};
use charisma_lib::upload::UploadHandoff;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

fn config(detection_interval_ms: u64) -> SessionConfig {
    SessionConfig {
        detection_interval_ms,
        timeslice_ms: 50,
        ..Default::default()
    }
}

fn face(x: f32, y: f32, w: f32, h: f32, score: f32) -> Detection {
    Detection::new(BoundingBox::new(x, y, w, h), score)
}

async fn next_face_status(
    events: &mut broadcast::Receiver<SessionEvent>,
) -> (DetectionStatus, Vec<Detection>) {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let SessionEvent::FaceStatus { status, detections } = events.recv().await.unwrap() {
                return (status, detections);
            }
        }
    })
    .await
    .expect("no detection tick")
}

/// Records every delivered artifact
#[derive(Default)]
struct CollectingUpload {
    delivered: Mutex<Vec<Option<Arc<Artifact>>>>,
    notify: Notify,
}

#[async_trait]
impl UploadHandoff for CollectingUpload {
    async fn deliver(&self, artifact: Option<Arc<Artifact>>) {
        self.delivered.lock().push(artifact);
        self.notify.notify_one();
    }
}

/// Encoder whose output closes right after start, optionally after one segment
struct EndsEarly {
    segment: Option<Vec<u8>>,
}

impl MediaEncoder for EndsEarly {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        mime_type == "video/webm"
    }

    fn start(
        &self,
        _stream: &dyn MediaStream,
        _mime_type: &str,
        _timeslice: Duration,
    ) -> Result<EncoderSession, RecorderError> {
        let (tx, segments) = tokio::sync::mpsc::channel(1);
        if let Some(segment) = &self.segment {
            tx.try_send(segment.clone())
                .map_err(|e| RecorderError::InitFailed(e.to_string()))?;
        }
        let (control, _) = StopSignal::new();
        Ok(EncoderSession {
            segments,
            control: Box::new(control),
        })
    }
}

#[tokio::test]
async fn test_end_to_end_640x480() {
    let devices = Arc::new(SyntheticDevices::with_resolution(640, 480));
    let detector = Arc::new(ScriptedDetector::new(vec![
        Ok(vec![face(10.0, 10.0, 50.0, 50.0, 0.9)]),
        Ok(Vec::new()),
    ]));
    let upload = Arc::new(CollectingUpload::default());
    let session = CaptureSession::new(
        devices.clone(),
        detector,
        Arc::new(SyntheticEncoder::new()),
        config(200),
    )
    .with_upload(upload.clone());
    let mut events = session.subscribe();

    session.start().await.unwrap();
    assert!(session.is_active());
    {
        let overlay = session.overlay();
        let canvas = overlay.lock();
        assert_eq!((canvas.width(), canvas.height()), (640, 480));
    }

    let (status, detections) = next_face_status(&mut events).await;
    assert_eq!(status, DetectionStatus::Detected(1));
    assert_eq!(detections[0].bounding_box, BoundingBox::new(10.0, 10.0, 50.0, 50.0));
    {
        let overlay = session.overlay();
        let canvas = overlay.lock();
        assert_eq!(canvas.box_count(), 1);
        assert!(canvas.shapes().iter().any(
            |shape| matches!(shape, OverlayShape::Label { text, .. } if text.as_str() == "90%")
        ));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlay.png");
        canvas.save_png(&path).unwrap();
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    let (status, _) = next_face_status(&mut events).await;
    assert_eq!(status, DetectionStatus::NoFace);
    {
        let overlay = session.overlay();
        let canvas = overlay.lock();
        assert_eq!(canvas.box_count(), 0);
        assert!(canvas.is_blank());
    }

    let stopped = session.stop().expect("session was active");
    assert!(!session.is_active());
    assert_eq!(devices.live_tracks(), 0);
    assert_eq!(session.status(), DetectionStatus::Inactive);
    assert!(session.overlay().lock().is_blank());

    let artifact = stopped.artifact.wait().await.expect("artifact");
    assert!(artifact.size() > 0);
    assert_eq!(artifact.mime_type, "video/webm");

    tokio::time::timeout(Duration::from_secs(5), upload.notify.notified())
        .await
        .expect("upload not called");
    let delivered = upload.delivered.lock();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].as_ref().map(|a| a.size()), Some(artifact.size()));
}

#[tokio::test]
async fn test_repeated_cycles_release_everything() {
    let devices = Arc::new(SyntheticDevices::with_resolution(320, 240));
    let detector = Arc::new(ScriptedDetector::empty());
    let session = CaptureSession::new(
        devices.clone(),
        detector.clone(),
        Arc::new(SyntheticEncoder::new()),
        config(20),
    );

    for _ in 0..3 {
        session.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(session.is_detecting());

        assert!(session.stop().is_some());
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_active());
        assert!(!session.is_detecting());
        assert!(!session.has_stream());
        assert!(!session.preview().is_bound());
        assert_eq!(devices.live_tracks(), 0);
        assert_eq!(session.elapsed_display(), "00:00");

        let calls = detector.calls();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(detector.calls(), calls, "detection tick after stop");
    }
    assert_eq!(devices.streams_opened(), 3);
}

#[tokio::test]
async fn test_stop_without_session_is_noop() {
    let upload = Arc::new(CollectingUpload::default());
    let session = CaptureSession::new(
        Arc::new(SyntheticDevices::default()),
        Arc::new(ScriptedDetector::empty()),
        Arc::new(SyntheticEncoder::new()),
        config(100),
    )
    .with_upload(upload.clone());

    assert!(session.stop().is_none());
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(upload.delivered.lock().is_empty());
}

#[tokio::test]
async fn test_stop_during_grant_leaves_no_stream() {
    let devices = Arc::new(SyntheticDevices::new(SyntheticOptions {
        resolution: Some(charisma_lib::capture::Resolution::new(320, 240)),
        grant_delay: Duration::from_millis(150),
        ..Default::default()
    }));
    let session = Arc::new(CaptureSession::new(
        devices.clone(),
        Arc::new(ScriptedDetector::empty()),
        Arc::new(SyntheticEncoder::new()),
        config(50),
    ));

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.start().await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(session.stop().is_none());

    assert_eq!(pending.await.unwrap(), Err(SessionError::Cancelled));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(devices.live_tracks(), 0);
    assert!(!session.has_stream());
    assert_eq!(session.state(), SessionState::Idle);

    // A fresh start after the cancelled one works normally.
    session.start().await.unwrap();
    assert!(session.is_active());
    assert!(session.stop().is_some());
    assert_eq!(devices.live_tracks(), 0);
}

#[tokio::test]
async fn test_stop_while_waiting_for_first_frame() {
    let devices = Arc::new(SyntheticDevices::new(SyntheticOptions {
        resolution: Some(charisma_lib::capture::Resolution::new(320, 240)),
        first_frame_delay: Duration::from_secs(30),
        ..Default::default()
    }));
    let session = Arc::new(CaptureSession::new(
        devices.clone(),
        Arc::new(ScriptedDetector::empty()),
        Arc::new(SyntheticEncoder::new()),
        config(50),
    ));

    let pending = {
        let session = session.clone();
        tokio::spawn(async move { session.start().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(devices.live_tracks(), 2);

    assert!(session.stop().is_none());
    assert_eq!(pending.await.unwrap(), Err(SessionError::Cancelled));
    assert_eq!(devices.live_tracks(), 0);
}

#[tokio::test]
async fn test_detection_calls_never_overlap() {
    let detector = Arc::new(
        ScriptedDetector::cycling(vec![Ok(vec![face(0.0, 0.0, 10.0, 10.0, 0.5)])])
            .with_latency(Duration::from_millis(60)),
    );

    for strategy in [PollStrategy::Reschedule, PollStrategy::Interval] {
        let session = CaptureSession::new(
            Arc::new(SyntheticDevices::with_resolution(160, 120)),
            detector.clone(),
            Arc::new(SyntheticEncoder::new()),
            SessionConfig {
                poll_strategy: strategy,
                ..config(5)
            },
        );
        session.start().await.unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        session.stop();
    }

    assert!(detector.calls() >= 4);
    assert_eq!(detector.max_in_flight(), 1);
}

#[tokio::test]
async fn test_consecutive_empty_ticks_read_no_face() {
    let session = CaptureSession::new(
        Arc::new(SyntheticDevices::with_resolution(160, 120)),
        Arc::new(ScriptedDetector::new(vec![
            Ok(vec![face(1.0, 1.0, 20.0, 20.0, 0.8)]),
            Err(DetectionEngineError::Inference("glitch".to_string())),
        ])),
        Arc::new(SyntheticEncoder::new()),
        config(10),
    );
    let mut events = session.subscribe();
    session.start().await.unwrap();

    let (first, _) = next_face_status(&mut events).await;
    assert_eq!(first, DetectionStatus::Detected(1));

    for _ in 0..5 {
        let (status, detections) = next_face_status(&mut events).await;
        assert_eq!(status, DetectionStatus::NoFace);
        assert_eq!(status.label(), "No Face Detected");
        assert!(detections.is_empty());
    }
    assert_eq!(session.status(), DetectionStatus::NoFace);
    session.stop();
    assert_eq!(session.status().label(), "Face Detection: Inactive");
}

#[tokio::test]
async fn test_recorder_falls_back_to_second_choice() {
    let session = CaptureSession::new(
        Arc::new(SyntheticDevices::with_resolution(320, 240)),
        Arc::new(ScriptedDetector::empty()),
        Arc::new(SyntheticEncoder::supporting(&["video/webm"])),
        config(100),
    );
    let mut events = session.subscribe();

    session.start().await.unwrap();
    assert_eq!(session.recording_mime_type().as_deref(), Some("video/webm"));
    tokio::time::sleep(Duration::from_millis(120)).await;

    let stopped = session.stop().unwrap();
    let artifact = stopped.artifact.wait().await.expect("artifact");
    assert_eq!(artifact.mime_type, "video/webm");
    assert_eq!(artifact.extension(), "webm");
    assert_eq!(&artifact.data[..4], &[0x1a, 0x45, 0xdf, 0xa3]);

    let mut saw_started = false;
    while let Ok(event) = events.try_recv() {
        if let SessionEvent::RecordingStarted { mime_type } = event {
            assert_eq!(mime_type, "video/webm");
            saw_started = true;
        }
    }
    assert!(saw_started);
}

#[tokio::test]
async fn test_recorder_failure_keeps_session_running() {
    let devices = Arc::new(SyntheticDevices::with_resolution(320, 240));
    let upload = Arc::new(CollectingUpload::default());
    let session = CaptureSession::new(
        devices.clone(),
        Arc::new(ScriptedDetector::empty()),
        Arc::new(SyntheticEncoder::failing()),
        config(20),
    )
    .with_upload(upload.clone());
    let mut events = session.subscribe();

    session.start().await.unwrap();
    assert!(session.is_active());
    assert!(session.recording_mime_type().is_none());

    let (status, _) = next_face_status(&mut events).await;
    assert_eq!(status, DetectionStatus::NoFace);

    let stopped = session.stop().unwrap();
    assert!(stopped.artifact.wait().await.is_none());
    assert_eq!(devices.live_tracks(), 0);

    tokio::time::timeout(Duration::from_secs(5), upload.notify.notified())
        .await
        .expect("upload not called");
    assert!(upload.delivered.lock()[0].is_none());
}

#[tokio::test]
async fn test_model_load_failure_is_not_fatal() {
    let session = CaptureSession::new(
        Arc::new(SyntheticDevices::with_resolution(320, 240)),
        Arc::new(ScriptedDetector::empty().with_load_error(DetectionEngineError::ModelNotLoaded)),
        Arc::new(SyntheticEncoder::new()),
        config(50),
    );

    session.start().await.unwrap();
    assert!(session.is_active());
    assert!(session.snapshot().session_id.is_some());
    session.stop();
}

#[tokio::test]
async fn test_encoder_ending_before_stop_still_delivers() {
    let upload = Arc::new(CollectingUpload::default());
    let session = CaptureSession::new(
        Arc::new(SyntheticDevices::with_resolution(320, 240)),
        Arc::new(ScriptedDetector::empty()),
        Arc::new(EndsEarly {
            segment: Some(vec![0x1a, 0x45, 0xdf, 0xa3]),
        }),
        config(50),
    )
    .with_upload(upload.clone());

    session.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let stopped = session.stop().unwrap();
    let artifact = stopped.artifact.wait().await.expect("artifact");
    assert_eq!(artifact.size(), 4);
    assert_eq!(artifact.segment_count, 1);
    assert_eq!(artifact.mime_type, "video/webm");

    tokio::time::timeout(Duration::from_secs(5), upload.notify.notified())
        .await
        .expect("upload not called");
    let delivered = upload.delivered.lock();
    assert_eq!(delivered[0].as_ref().map(|a| a.size()), Some(4));
}

#[tokio::test]
async fn test_encoder_dying_without_data_hands_off_nothing() {
    let devices = Arc::new(SyntheticDevices::with_resolution(320, 240));
    let upload = Arc::new(CollectingUpload::default());
    let session = CaptureSession::new(
        devices.clone(),
        Arc::new(ScriptedDetector::empty()),
        Arc::new(EndsEarly { segment: None }),
        config(20),
    )
    .with_upload(upload.clone());
    let mut events = session.subscribe();

    session.start().await.unwrap();
    assert_eq!(session.state(), SessionState::Active);
    let (status, _) = next_face_status(&mut events).await;
    assert_eq!(status, DetectionStatus::NoFace);

    let stopped = session.stop().unwrap();
    assert!(stopped.artifact.wait().await.is_none());
    assert_eq!(devices.live_tracks(), 0);

    let unavailable = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let SessionEvent::RecordingUnavailable { reason } = events.recv().await.unwrap() {
                return reason;
            }
        }
    })
    .await
    .expect("no unavailable event");
    assert_eq!(unavailable, "No recording data was captured");

    tokio::time::timeout(Duration::from_secs(5), upload.notify.notified())
        .await
        .expect("upload not called");
    assert!(upload.delivered.lock()[0].is_none());
}
