//! Charisma - practice interview capture.
//!
//! Acquires the camera, overlays live face detection, records the session
//! and hands the recording to an upload flow when the interview ends.

pub mod capture;
pub mod config;
pub mod detection;
pub mod overlay;
pub mod questions;
pub mod recorder;
pub mod session;
pub mod timer;
pub mod upload;
pub mod utils;

use capture::MediaDevices;
use config::SessionConfig;
use detection::{BoundingBox, Detection, ScriptedDetector};
use questions::QuestionDeck;
use recorder::{FfmpegEncoder, MediaEncoder, SyntheticEncoder};
use session::{CaptureSession, SessionEvent};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use upload::{SimulatedUpload, UploadProgress};
use utils::AppResult;

/// Run one demo interview
pub async fn run() -> AppResult<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "charisma=debug,charisma_lib=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Charisma v{}", env!("CARGO_PKG_VERSION"));

    let config = SessionConfig::from_env()?;
    let devices = devices();
    let encoder = encoder();
    // No face model ships with the crate: alternate a centred face with an
    // empty frame so the overlay has something to draw.
    let detector = Arc::new(ScriptedDetector::cycling(vec![
        Ok(vec![Detection::new(BoundingBox::new(480.0, 200.0, 320.0, 320.0), 0.93)]),
        Ok(vec![Detection::new(BoundingBox::new(470.0, 190.0, 330.0, 330.0), 0.88)]),
        Ok(Vec::new()),
    ]));

    let upload = Arc::new(SimulatedUpload::new(config.upload.clone()));
    let mut progress = upload.subscribe();

    let mut session = CaptureSession::new(devices, detector, encoder, config.clone());
    if config.upload.enabled {
        session = session.with_upload(upload.clone());
    }

    let mut events = session.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            log_event(&event);
        }
    });

    let mut deck = QuestionDeck::default();
    session.start().await?;
    tracing::info!("Question: {}", deck.current());

    let half = Duration::from_secs(config.demo_seconds.max(1)) / 2;
    tokio::time::sleep(half).await;
    tracing::info!("Question: {}", deck.advance());
    tokio::time::sleep(half).await;

    // Snapshot before stop clears the overlay.
    if let Some(dir) = &config.output_dir {
        std::fs::create_dir_all(dir)?;
        session.overlay().lock().save_png(&dir.join("overlay.png"))?;
    }

    let Some(stopped) = session.stop() else {
        return Ok(());
    };

    match stopped.artifact.wait().await {
        Some(artifact) => {
            tracing::info!(
                "Recorded {} bytes of {} in {} segments",
                artifact.size(),
                artifact.mime_type,
                artifact.segment_count
            );
            if let Some(dir) = &config.output_dir {
                let path = dir.join(artifact.file_name());
                std::fs::write(&path, &artifact.data)?;
                tracing::info!("Saved recording to {:?}", path);
            }
        }
        None => tracing::warn!("Nothing was recorded"),
    }

    if config.upload.enabled {
        while let Ok(update) = progress.recv().await {
            let done = update.is_final();
            log_progress(&update);
            if done {
                break;
            }
        }
    }

    Ok(())
}

#[cfg(feature = "native")]
fn devices() -> Arc<dyn MediaDevices> {
    Arc::new(capture::native::NativeDevices::new())
}

#[cfg(not(feature = "native"))]
fn devices() -> Arc<dyn MediaDevices> {
    Arc::new(capture::SyntheticDevices::default())
}

fn encoder() -> Arc<dyn MediaEncoder> {
    let ffmpeg = FfmpegEncoder::new(30);
    if ffmpeg.is_available() {
        Arc::new(ffmpeg)
    } else {
        tracing::info!("Using synthetic encoder");
        Arc::new(SyntheticEncoder::new())
    }
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::Started {
            session_id,
            resolution,
        } => tracing::info!("Session {} live at {}", session_id, resolution),
        SessionEvent::Stopped {
            session_id,
            duration_ms,
        } => tracing::info!("Session {} ended after {:.1}s", session_id, duration_ms / 1000.0),
        SessionEvent::Alert(message) => tracing::warn!("{}", message),
        SessionEvent::FaceStatus { status, .. } => tracing::debug!("{}", status.label()),
        SessionEvent::TimerTick { display: shown, .. } => tracing::info!("{}", shown),
        SessionEvent::RecordingStarted { mime_type } => tracing::info!("Recording as {}", mime_type),
        SessionEvent::RecordingFinalized { artifact, .. } => {
            tracing::info!("Recording ready: {} bytes", artifact.size)
        }
        SessionEvent::RecordingUnavailable { reason } => {
            tracing::warn!("Recording unavailable: {}", reason)
        }
    }
}

fn log_progress(progress: &UploadProgress) {
    tracing::info!("[{:?}] {}", progress.stage, progress.message);
}
