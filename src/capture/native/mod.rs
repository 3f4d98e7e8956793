//! Native capture backend
//!
//! Camera frames come from nokhwa, the microphone from cpal. Audio is held
//! open (so the permission and the device indicator behave like a browser
//! grant) but is not recorded.

mod camera;
mod microphone;

pub use camera::list_cameras;

use super::traits::{
    CameraInfo, DeviceAccessError, MediaDevices, MediaStream, Resolution, StreamConstraints,
    TrackInfo, TrackKind, VideoFrame,
};
use async_trait::async_trait;
use camera::{spawn_camera, CameraFeed};
use microphone::Microphone;
use nokhwa::utils::CameraIndex;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot, watch};

pub struct NativeDevices {
    camera_index: u32,
    fps: u32,
}

impl NativeDevices {
    pub fn new() -> Self {
        Self {
            camera_index: 0,
            fps: 30,
        }
    }

    /// Use the camera at `index` as reported by `cameras()`
    pub fn with_camera(mut self, index: u32) -> Self {
        self.camera_index = index;
        self
    }

    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps.max(1);
        self
    }
}

impl Default for NativeDevices {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaDevices for NativeDevices {
    async fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, DeviceAccessError> {
        if list_cameras().is_empty() {
            return Err(DeviceAccessError::DeviceNotFound("No cameras found".to_string()));
        }

        let (latest_tx, latest_rx) = watch::channel(None);
        let (frames_tx, _) = broadcast::channel(8);
        let (granted_tx, granted_rx) = oneshot::channel();

        // Owned from here on so that dropping this future stops the camera thread.
        let mut stream = NativeStream::new(latest_rx, frames_tx.clone());

        spawn_camera(
            CameraIndex::Index(self.camera_index),
            constraints.video.clone(),
            self.fps,
            CameraFeed {
                latest_tx,
                frames_tx,
                running: stream.running.clone(),
            },
            granted_tx,
        );

        let resolution = match granted_rx.await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(DeviceAccessError::Platform(
                    "camera thread exited".to_string(),
                ))
            }
        };
        stream.push_track(TrackInfo {
            kind: TrackKind::Video,
            label: format!("Camera {}", self.camera_index),
            live: true,
        });

        if constraints.audio {
            let mic = tokio::task::spawn_blocking(Microphone::open)
                .await
                .map_err(|e| DeviceAccessError::Platform(e.to_string()))??;
            stream.push_track(TrackInfo {
                kind: TrackKind::Audio,
                label: mic.label().to_string(),
                live: true,
            });
            stream.microphone = Some(mic);
        }

        tracing::info!("Native stream granted at {}", resolution);
        Ok(Box::new(stream))
    }

    fn cameras(&self) -> Vec<CameraInfo> {
        list_cameras()
    }
}

pub struct NativeStream {
    id: String,
    tracks: Mutex<Vec<TrackInfo>>,
    running: Arc<AtomicBool>,
    microphone: Option<Microphone>,
    latest_rx: watch::Receiver<Option<VideoFrame>>,
    frames_tx: broadcast::Sender<VideoFrame>,
}

impl NativeStream {
    fn new(
        latest_rx: watch::Receiver<Option<VideoFrame>>,
        frames_tx: broadcast::Sender<VideoFrame>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks: Mutex::new(Vec::new()),
            running: Arc::new(AtomicBool::new(true)),
            microphone: None,
            latest_rx,
            frames_tx,
        }
    }

    fn push_track(&self, track: TrackInfo) {
        self.tracks.lock().push(track);
    }

    /// Peak microphone level so far, if audio was requested
    pub fn audio_peak(&self) -> Option<f32> {
        self.microphone.as_ref().map(Microphone::peak_level)
    }
}

#[async_trait]
impl MediaStream for NativeStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<TrackInfo> {
        self.tracks.lock().clone()
    }

    async fn loaded_metadata(&self) -> Resolution {
        let mut rx = self.latest_rx.clone();
        let resolution = match rx.wait_for(|f| f.is_some()).await {
            Ok(frame) => (*frame).as_ref().map(VideoFrame::resolution),
            Err(_) => None,
        };
        match resolution {
            Some(resolution) => resolution,
            // The camera thread ended before the first frame; metadata never loads.
            None => std::future::pending().await,
        }
    }

    fn latest_frame(&self) -> watch::Receiver<Option<VideoFrame>> {
        self.latest_rx.clone()
    }

    fn subscribe_frames(&self) -> broadcast::Receiver<VideoFrame> {
        self.frames_tx.subscribe()
    }

    fn stop_tracks(&self) -> Result<(), DeviceAccessError> {
        self.running.store(false, Ordering::SeqCst);
        if let Some(mic) = &self.microphone {
            mic.stop();
        }
        for track in self.tracks.lock().iter_mut() {
            track.live = false;
        }
        Ok(())
    }
}

impl Drop for NativeStream {
    fn drop(&mut self) {
        let _ = self.stop_tracks();
    }
}
