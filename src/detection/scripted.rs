//! Scripted detector
//!
//! Replays a fixed list of per-tick outcomes. Stands in for a real engine in
//! the demo and in tests, and records how it was driven.

use super::engine::{DetectionEngineError, DetectionResult, FaceDetector};
use crate::capture::VideoFrame;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

type Outcome = Result<DetectionResult, DetectionEngineError>;

pub struct ScriptedDetector {
    script: Mutex<VecDeque<Outcome>>,
    /// Replay the script forever instead of going quiet once exhausted
    repeat: bool,
    latency: Duration,
    load_error: Option<DetectionEngineError>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedDetector {
    /// Play `script` once, then report no faces
    pub fn new(script: Vec<Outcome>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: false,
            latency: Duration::ZERO,
            load_error: None,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Play `script` round-robin for as long as the session runs
    pub fn cycling(script: Vec<Outcome>) -> Self {
        Self {
            repeat: true,
            ..Self::new(script)
        }
    }

    /// Never detects anything
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Simulated inference time per call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make `load` fail with `error`
    pub fn with_load_error(mut self, error: DetectionEngineError) -> Self {
        self.load_error = Some(error);
        self
    }

    /// Calls to `detect` so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of `detect` calls that were ever outstanding at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_outcome(&self) -> Outcome {
        let mut script = self.script.lock();
        match script.pop_front() {
            Some(outcome) => {
                if self.repeat {
                    script.push_back(outcome.clone());
                }
                outcome
            }
            None => Ok(Vec::new()),
        }
    }
}

/// Decrements the in-flight counter even if the call is cancelled mid-await
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl FaceDetector for ScriptedDetector {
    async fn load(&self) -> Result<(), DetectionEngineError> {
        match &self.load_error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn detect(&self, _frame: &VideoFrame) -> Result<DetectionResult, DetectionEngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.in_flight);
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        self.next_outcome()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BoundingBox, Detection};
    use std::sync::Arc;

    fn frame() -> VideoFrame {
        VideoFrame {
            width: 4,
            height: 4,
            data: Arc::from(vec![0u8; 64]),
            sequence: 0,
            timestamp: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_plays_script_then_goes_quiet() {
        let face = Detection::new(BoundingBox::new(1.0, 1.0, 2.0, 2.0), 0.5);
        let detector = ScriptedDetector::new(vec![
            Ok(vec![face]),
            Err(DetectionEngineError::Inference("boom".to_string())),
        ]);

        assert_eq!(detector.detect(&frame()).await.unwrap(), vec![face]);
        assert!(detector.detect(&frame()).await.is_err());
        assert!(detector.detect(&frame()).await.unwrap().is_empty());
        assert_eq!(detector.calls(), 3);
        assert_eq!(detector.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_cycling_repeats() {
        let face = Detection::new(BoundingBox::new(1.0, 1.0, 2.0, 2.0), 0.5);
        let detector = ScriptedDetector::cycling(vec![Ok(vec![face]), Ok(vec![])]);
        for _ in 0..3 {
            assert_eq!(detector.detect(&frame()).await.unwrap().len(), 1);
            assert!(detector.detect(&frame()).await.unwrap().is_empty());
        }
    }
}
