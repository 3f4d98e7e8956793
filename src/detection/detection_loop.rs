//! Face detection polling loop
//!
//! Runs the detector against the latest preview frame while a session is
//! active and paints the results onto the overlay.

use super::engine::{Detection, FaceDetector};
use crate::capture::VideoFrame;
use crate::overlay::{DetectionStatus, OverlayCanvas};
use crate::session::state::SessionEvent;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// How ticks are scheduled. Either way a tick never starts before the
/// previous detection call has resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStrategy {
    /// Sleep for the interval after each completed tick
    #[default]
    Reschedule,
    /// Fixed-rate ticks; late ticks are pushed back rather than bunched
    Interval,
}

/// Everything a tick touches
#[derive(Clone)]
pub struct DetectionContext {
    pub detector: Arc<dyn FaceDetector>,
    pub frames: watch::Receiver<Option<VideoFrame>>,
    pub overlay: Arc<Mutex<OverlayCanvas>>,
    pub status: Arc<watch::Sender<DetectionStatus>>,
    pub events: broadcast::Sender<SessionEvent>,
}

/// Handle to a running detection loop
pub struct DetectionLoop {
    active: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
}

impl DetectionLoop {
    /// Spawn the loop on the current runtime
    pub fn spawn(context: DetectionContext, interval: Duration, strategy: PollStrategy) -> Self {
        let active = Arc::new(AtomicBool::new(true));
        let ticks = Arc::new(AtomicU64::new(0));

        tracing::debug!(
            "Starting face detection every {:?} ({:?})",
            interval,
            strategy
        );

        let handle = tokio::spawn(run(
            context,
            active.clone(),
            ticks.clone(),
            interval,
            strategy,
        ));

        Self {
            active,
            ticks,
            handle: Some(handle),
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Ticks whose result reached the overlay
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    /// Cancel the loop. No tick is painted after this returns.
    pub fn stop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            handle.abort();
            tracing::debug!("Face detection stopped after {} ticks", self.ticks());
        }
    }
}

impl Drop for DetectionLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(
    context: DetectionContext,
    active: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    period: Duration,
    strategy: PollStrategy,
) {
    let mut interval = match strategy {
        PollStrategy::Interval => {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            Some(interval)
        }
        PollStrategy::Reschedule => None,
    };

    while active.load(Ordering::SeqCst) {
        if let Some(interval) = interval.as_mut() {
            interval.tick().await;
            if !active.load(Ordering::SeqCst) {
                break;
            }
        }

        let frame = context.frames.borrow().clone();
        if let Some(frame) = frame {
            let detections = match context.detector.detect(&frame).await {
                Ok(detections) => detections,
                Err(e) => {
                    tracing::warn!("Face detection error: {}", e);
                    Vec::new()
                }
            };

            if !paint(&context, &active, &frame, detections) {
                tracing::debug!("Session stopped during detection, result discarded");
                break;
            }
            ticks.fetch_add(1, Ordering::SeqCst);
        }

        if interval.is_none() {
            tokio::time::sleep(period).await;
        }
    }
}

/// Repaint the overlay with one tick's result. Returns `false` without
/// touching anything if the session stopped while the detector was running.
fn paint(
    context: &DetectionContext,
    active: &AtomicBool,
    frame: &VideoFrame,
    detections: Vec<Detection>,
) -> bool {
    let mut canvas = context.overlay.lock();
    // Checked under the overlay lock: stop clears the canvas under the same
    // lock after clearing the flag.
    if !active.load(Ordering::SeqCst) {
        return false;
    }

    let target = crate::capture::Resolution::new(canvas.width(), canvas.height());
    let scaled: Vec<Detection> = detections
        .iter()
        .map(|d| d.scaled(frame.resolution(), target))
        .collect();
    canvas.render(&scaled);

    let status = DetectionStatus::from_count(scaled.len());
    context.status.send_replace(status);
    let _ = context.events.send(SessionEvent::FaceStatus {
        status,
        detections: scaled,
    });
    true
}
