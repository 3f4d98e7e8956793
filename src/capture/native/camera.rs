//! Camera capture using nokhwa
//!
//! The camera lives on its own thread; frames are decoded to RGBA and
//! published on the stream's channels.

use crate::capture::traits::{CameraInfo, DeviceAccessError, Resolution, VideoConstraints, VideoFrame};
use nokhwa::pixel_format::RgbAFormat;
use nokhwa::utils::{
    ApiBackend, CameraFormat, CameraIndex, FrameFormat, RequestedFormat, RequestedFormatType,
};
use nokhwa::Camera;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{broadcast, oneshot, watch};

/// Get list of available cameras
pub fn list_cameras() -> Vec<CameraInfo> {
    match nokhwa::query(ApiBackend::Auto) {
        Ok(cameras) => cameras
            .into_iter()
            .map(|info| CameraInfo {
                id: match info.index() {
                    CameraIndex::Index(i) => i.to_string(),
                    CameraIndex::String(s) => s.to_string(),
                },
                name: info.human_name().to_string(),
            })
            .collect(),
        Err(e) => {
            tracing::warn!("Failed to enumerate cameras: {:?}", e);
            Vec::new()
        }
    }
}

pub(super) struct CameraFeed {
    pub latest_tx: watch::Sender<Option<VideoFrame>>,
    pub frames_tx: broadcast::Sender<VideoFrame>,
    pub running: Arc<AtomicBool>,
}

/// Open the camera on a dedicated thread. `granted` reports the native
/// resolution once the stream is open, or why it could not be opened.
pub(super) fn spawn_camera(
    index: CameraIndex,
    constraints: VideoConstraints,
    fps: u32,
    feed: CameraFeed,
    granted: oneshot::Sender<Result<Resolution, DeviceAccessError>>,
) {
    std::thread::spawn(move || {
        let requested = RequestedFormat::new::<RgbAFormat>(RequestedFormatType::Closest(
            CameraFormat::new(
                nokhwa::utils::Resolution::new(constraints.ideal_width, constraints.ideal_height),
                FrameFormat::MJPEG,
                fps,
            ),
        ));

        let mut camera = match Camera::new(index.clone(), requested) {
            Ok(camera) => camera,
            Err(e) => {
                tracing::error!("Failed to open camera {:?}: {:?}", index, e);
                let _ = granted.send(Err(DeviceAccessError::PermissionDenied(e.to_string())));
                return;
            }
        };

        if let Err(e) = camera.open_stream() {
            tracing::error!("Failed to open camera stream: {:?}", e);
            let _ = granted.send(Err(DeviceAccessError::Platform(e.to_string())));
            return;
        }

        let format = camera.camera_format();
        let native = Resolution::new(format.resolution().width(), format.resolution().height());
        tracing::info!(
            "Camera opened: {} @ {}fps, {:?} (requested {}x{})",
            native,
            format.frame_rate(),
            format.format(),
            constraints.ideal_width,
            constraints.ideal_height
        );

        if granted.send(Ok(native)).is_err() {
            // The request was abandoned while the camera was opening.
            let _ = camera.stop_stream();
            return;
        }

        let started = Instant::now();
        let mut sequence = 0u64;
        while feed.running.load(Ordering::SeqCst) {
            let decoded = match camera.frame().and_then(|f| f.decode_image::<RgbAFormat>()) {
                Ok(image) => image,
                Err(e) => {
                    tracing::debug!("Failed to capture frame: {:?}", e);
                    continue;
                }
            };

            let frame = VideoFrame {
                width: decoded.width(),
                height: decoded.height(),
                data: decoded.into_raw().into(),
                sequence,
                timestamp: started.elapsed(),
            };
            let _ = feed.frames_tx.send(frame.clone());
            feed.latest_tx.send_replace(Some(frame));
            sequence += 1;
        }

        if let Err(e) = camera.stop_stream() {
            tracing::warn!("Error stopping camera stream: {:?}", e);
        }
        tracing::info!(
            "Camera released after {} frames in {:.1}s",
            sequence,
            started.elapsed().as_secs_f64()
        );
    });
}
