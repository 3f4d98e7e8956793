//! FFmpeg encoder
//!
//! Pipes raw RGBA frames into an `ffmpeg` child process and streams the
//! encoded container back from its stdout. WebM (VP9/VP8) and fragmented MP4
//! (H.264) are supported so the output can be consumed while it is written.

use super::encoder::{EncoderSession, MediaEncoder, StopSignal};
use super::state::RecorderError;
use crate::capture::{MediaStream, VideoFrame};
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, ChildStdout, Command};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};

/// Output arguments for each supported encoding
fn codec_args(mime_type: &str) -> Option<&'static [&'static str]> {
    let args: &'static [&'static str] = match mime_type {
        "video/webm;codecs=vp9" => &[
            "-c:v", "libvpx-vp9",
            "-deadline", "realtime",
            "-cpu-used", "8",
            "-row-mt", "1",
            "-f", "webm",
        ],
        "video/webm" | "video/webm;codecs=vp8" => &[
            "-c:v", "libvpx",
            "-deadline", "realtime",
            "-cpu-used", "8",
            "-f", "webm",
        ],
        "video/mp4" => &[
            "-c:v", "libx264",
            "-preset", "veryfast",
            "-pix_fmt", "yuv420p",
            "-movflags", "frag_keyframe+empty_moov+default_base_moof",
            "-f", "mp4",
        ],
        _ => return None,
    };
    Some(args)
}

pub struct FfmpegEncoder {
    binary: String,
    fps: u32,
    available: OnceLock<bool>,
}

impl FfmpegEncoder {
    pub fn new(fps: u32) -> Self {
        Self::with_binary("ffmpeg", fps)
    }

    pub fn with_binary(binary: impl Into<String>, fps: u32) -> Self {
        Self {
            binary: binary.into(),
            fps: fps.max(1),
            available: OnceLock::new(),
        }
    }

    /// Whether the ffmpeg binary can be run. Probed once.
    pub fn is_available(&self) -> bool {
        *self.available.get_or_init(|| {
            let ok = std::process::Command::new(&self.binary)
                .arg("-version")
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .map(|status| status.success())
                .unwrap_or(false);
            if !ok {
                tracing::warn!("FFmpeg not found at {:?}; recording unavailable", self.binary);
            }
            ok
        })
    }
}

impl MediaEncoder for FfmpegEncoder {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        codec_args(mime_type).is_some() && self.is_available()
    }

    fn start(
        &self,
        stream: &dyn MediaStream,
        mime_type: &str,
        timeslice: Duration,
    ) -> Result<EncoderSession, RecorderError> {
        let output_args = codec_args(mime_type).ok_or_else(|| {
            RecorderError::InitFailed(format!("unsupported encoding {mime_type}"))
        })?;

        let latest = stream.latest_frame();
        let size = (*latest.borrow()).as_ref().map(|f| (f.width, f.height));
        let (width, height) = size
            .ok_or_else(|| RecorderError::InitFailed("stream has no frames yet".to_string()))?;

        let video_size = format!("{width}x{height}");
        let framerate = self.fps.to_string();
        let mut child = Command::new(&self.binary)
            .args([
                "-hide_banner",
                "-loglevel", "error",
                "-f", "rawvideo",
                "-pixel_format", "rgba",
                "-video_size", &video_size,
                "-framerate", &framerate,
                "-i", "-",
            ])
            .args(output_args)
            .arg("pipe:1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RecorderError::InitFailed("ffmpeg stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RecorderError::InitFailed("ffmpeg stdout unavailable".to_string()))?;

        tracing::info!(
            "Started FFmpeg encoder: {} @ {}fps, {}",
            video_size,
            self.fps,
            mime_type
        );

        let (segments_tx, segments_rx) = mpsc::channel(32);
        let (control, stop_rx) = StopSignal::new();
        let frame_len = (width as usize) * (height as usize) * 4;

        tokio::spawn(feed_frames(stream.subscribe_frames(), stdin, frame_len, stop_rx));
        tokio::spawn(async move {
            read_output(stdout, timeslice, segments_tx).await;
            match child.wait().await {
                Ok(status) if !status.success() => {
                    tracing::warn!("FFmpeg encoder exited with status {}", status)
                }
                Ok(_) => tracing::debug!("FFmpeg encoder finished"),
                Err(e) => tracing::warn!("Failed to wait for FFmpeg: {}", e),
            }
        });

        Ok(EncoderSession {
            segments: segments_rx,
            control: Box::new(control),
        })
    }
}

/// Write frames to ffmpeg until stopped; closing stdin lets ffmpeg finalize.
async fn feed_frames(
    mut frames: broadcast::Receiver<VideoFrame>,
    mut stdin: ChildStdin,
    frame_len: usize,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut written = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            frame = frames.recv() => match frame {
                Ok(frame) if frame.data.len() == frame_len => {
                    if let Err(e) = stdin.write_all(&frame.data).await {
                        tracing::warn!("FFmpeg stdin closed: {}", e);
                        break;
                    }
                    written += 1;
                }
                Ok(frame) => {
                    tracing::debug!("Skipping {}x{} frame: size changed", frame.width, frame.height);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("FFmpeg encoder dropped {} frames", skipped);
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    if let Err(e) = stdin.shutdown().await {
        tracing::debug!("Closing FFmpeg stdin: {}", e);
    }
    tracing::debug!("Fed {} frames to FFmpeg", written);
}

/// Forward encoder output, batched per timeslice
async fn read_output(mut stdout: ChildStdout, timeslice: Duration, segments: mpsc::Sender<Vec<u8>>) {
    let mut buf = vec![0u8; 64 * 1024];
    let mut pending = Vec::new();
    let mut flush = tokio::time::interval(timeslice.max(Duration::from_millis(1)));
    flush.tick().await;

    loop {
        tokio::select! {
            read = stdout.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => pending.extend_from_slice(&buf[..n]),
                Err(e) => {
                    tracing::warn!("Reading FFmpeg output failed: {}", e);
                    break;
                }
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
