//! Synthetic capture devices
//!
//! A fake camera and microphone producing a generated test pattern. Used by
//! the demo binary when no native backend is compiled in, and by tests that
//! need to observe hardware acquisition and release.

use super::traits::{
    DeviceAccessError, MediaDevices, MediaStream, Resolution, StreamConstraints, TrackInfo,
    TrackKind, VideoFrame,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Behaviour knobs for [`SyntheticDevices`]
#[derive(Debug, Clone)]
pub struct SyntheticOptions {
    /// Native camera size. `None` grants the ideal size from the constraints.
    pub resolution: Option<Resolution>,
    /// Frames per second
    pub fps: u32,
    /// Refuse every request with this error
    pub deny: Option<DeviceAccessError>,
    /// Simulated permission prompt latency
    pub grant_delay: Duration,
    /// Delay between the grant and the first frame
    pub first_frame_delay: Duration,
}

impl Default for SyntheticOptions {
    fn default() -> Self {
        Self {
            resolution: None,
            fps: 30,
            deny: None,
            grant_delay: Duration::ZERO,
            first_frame_delay: Duration::ZERO,
        }
    }
}

/// Fake device provider
pub struct SyntheticDevices {
    options: SyntheticOptions,
    live_tracks: Arc<AtomicUsize>,
    streams_opened: AtomicUsize,
}

impl SyntheticDevices {
    pub fn new(options: SyntheticOptions) -> Self {
        Self {
            options,
            live_tracks: Arc::new(AtomicUsize::new(0)),
            streams_opened: AtomicUsize::new(0),
        }
    }

    /// Grant a fixed camera size
    pub fn with_resolution(width: u32, height: u32) -> Self {
        Self::new(SyntheticOptions {
            resolution: Some(Resolution::new(width, height)),
            ..Default::default()
        })
    }

    /// Refuse every request
    pub fn denying(error: DeviceAccessError) -> Self {
        Self::new(SyntheticOptions {
            deny: Some(error),
            ..Default::default()
        })
    }

    /// Tracks currently holding (fake) hardware across every stream handed out
    pub fn live_tracks(&self) -> usize {
        self.live_tracks.load(Ordering::SeqCst)
    }

    /// Number of streams granted so far
    pub fn streams_opened(&self) -> usize {
        self.streams_opened.load(Ordering::SeqCst)
    }
}

impl Default for SyntheticDevices {
    fn default() -> Self {
        Self::new(SyntheticOptions::default())
    }
}

#[async_trait]
impl MediaDevices for SyntheticDevices {
    async fn get_user_media(
        &self,
        constraints: &StreamConstraints,
    ) -> Result<Box<dyn MediaStream>, DeviceAccessError> {
        if !self.options.grant_delay.is_zero() {
            tokio::time::sleep(self.options.grant_delay).await;
        }

        if let Some(err) = &self.options.deny {
            tracing::debug!("Synthetic device refusing access: {}", err);
            return Err(err.clone());
        }

        let resolution = self.options.resolution.unwrap_or(Resolution::new(
            constraints.video.ideal_width,
            constraints.video.ideal_height,
        ));

        self.streams_opened.fetch_add(1, Ordering::SeqCst);
        let stream = SyntheticStream::open(
            resolution,
            self.options.fps.max(1),
            constraints.audio,
            self.options.first_frame_delay,
            self.live_tracks.clone(),
        );

        tracing::debug!("Synthetic stream {} granted at {}", stream.id, resolution);
        Ok(Box::new(stream))
    }
}

/// A generated stream with one video track and an optional audio track
pub struct SyntheticStream {
    id: String,
    resolution: Resolution,
    tracks: Mutex<Vec<TrackInfo>>,
    live_tracks: Arc<AtomicUsize>,
    released: AtomicBool,
    latest_rx: watch::Receiver<Option<VideoFrame>>,
    frames_tx: broadcast::Sender<VideoFrame>,
    generator: Mutex<Option<JoinHandle<()>>>,
}

impl SyntheticStream {
    fn open(
        resolution: Resolution,
        fps: u32,
        audio: bool,
        first_frame_delay: Duration,
        live_tracks: Arc<AtomicUsize>,
    ) -> Self {
        let mut tracks = vec![TrackInfo {
            kind: TrackKind::Video,
            label: "Synthetic Camera".to_string(),
            live: true,
        }];
        if audio {
            tracks.push(TrackInfo {
                kind: TrackKind::Audio,
                label: "Synthetic Microphone".to_string(),
                live: true,
            });
        }
        live_tracks.fetch_add(tracks.len(), Ordering::SeqCst);

        let (latest_tx, latest_rx) = watch::channel(None);
        let (frames_tx, _) = broadcast::channel(64);

        let generator = tokio::spawn(generate_frames(
            resolution,
            fps,
            first_frame_delay,
            latest_tx,
            frames_tx.clone(),
        ));

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            resolution,
            tracks: Mutex::new(tracks),
            live_tracks,
            released: AtomicBool::new(false),
            latest_rx,
            frames_tx,
            generator: Mutex::new(Some(generator)),
        }
    }
}

async fn generate_frames(
    resolution: Resolution,
    fps: u32,
    first_frame_delay: Duration,
    latest_tx: watch::Sender<Option<VideoFrame>>,
    frames_tx: broadcast::Sender<VideoFrame>,
) {
    if !first_frame_delay.is_zero() {
        tokio::time::sleep(first_frame_delay).await;
    }

    let pattern = test_pattern(resolution);
    let started = Instant::now();
    let mut ticker = tokio::time::interval(Duration::from_secs(1) / fps);
    let mut sequence = 0u64;

    loop {
        ticker.tick().await;
        let frame = VideoFrame {
            width: resolution.width,
            height: resolution.height,
            data: pattern.clone(),
            sequence,
            timestamp: started.elapsed(),
        };
        // No subscribers is fine; the recorder may not be running.
        let _ = frames_tx.send(frame.clone());
        latest_tx.send_replace(Some(frame));
        sequence += 1;
    }
}

/// Horizontal gradient, enough to be recognisable in a snapshot
fn test_pattern(resolution: Resolution) -> Arc<[u8]> {
    let width = resolution.width.max(1);
    let mut data = Vec::with_capacity((resolution.width * resolution.height * 4) as usize);
    for _ in 0..resolution.height {
        for x in 0..resolution.width {
            let shade = (x * 255 / width) as u8;
            data.extend_from_slice(&[shade, shade / 2, 255 - shade, 255]);
        }
    }
    data.into()
}

#[async_trait]
impl MediaStream for SyntheticStream {
    fn id(&self) -> &str {
        &self.id
    }

    fn tracks(&self) -> Vec<TrackInfo> {
        self.tracks.lock().clone()
    }

    async fn loaded_metadata(&self) -> Resolution {
        let mut rx = self.latest_rx.clone();
        let resolution = match rx.wait_for(|frame| frame.is_some()).await {
            Ok(frame) => (*frame)
                .as_ref()
                .map(VideoFrame::resolution)
                .unwrap_or(self.resolution),
            // Generator gone before the first frame: the stream was stopped.
            Err(_) => self.resolution,
        };
        resolution
    }

    fn latest_frame(&self) -> watch::Receiver<Option<VideoFrame>> {
        self.latest_rx.clone()
    }

    fn subscribe_frames(&self) -> broadcast::Receiver<VideoFrame> {
        self.frames_tx.subscribe()
    }

    fn stop_tracks(&self) -> Result<(), DeviceAccessError> {
        if self.released.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Some(generator) = self.generator.lock().take() {
            generator.abort();
        }

        let mut tracks = self.tracks.lock();
        for track in tracks.iter_mut().filter(|t| t.live) {
            track.live = false;
            self.live_tracks.fetch_sub(1, Ordering::SeqCst);
        }

        tracing::debug!("Synthetic stream {} released", self.id);
        Ok(())
    }
}

impl Drop for SyntheticStream {
    fn drop(&mut self) {
        let _ = self.stop_tracks();
    }
}
