//! Simulated upload
//!
//! Walks a recording through upload, processing and analysis with
//! pseudo-random progress steps.

use super::validate::validate_video;
use super::{UploadHandoff, UploadProgress};
use crate::recorder::Artifact;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Progress pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadSettings {
    /// Auto-upload after a session stops
    pub enabled: bool,
    pub tick_ms: u64,
    /// Smallest progress step per tick, in percent
    pub min_step: f32,
    /// Largest progress step per tick, in percent
    pub max_step: f32,
    /// Pause between upload complete and analysis complete
    pub analysis_delay_ms: u64,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_ms: 200,
            min_step: 3.0,
            max_step: 15.0,
            analysis_delay_ms: 1500,
        }
    }
}

/// Floor for a progress step, so misconfigured pacing still finishes
const MIN_STEP: f32 = 0.5;

pub struct SimulatedUpload {
    settings: UploadSettings,
    events: broadcast::Sender<UploadProgress>,
    rng: Mutex<fastrand::Rng>,
}

impl SimulatedUpload {
    pub fn new(settings: UploadSettings) -> Self {
        Self::with_rng(settings, fastrand::Rng::new())
    }

    /// Reproducible progress steps
    pub fn with_seed(settings: UploadSettings, seed: u64) -> Self {
        Self::with_rng(settings, fastrand::Rng::with_seed(seed))
    }

    fn with_rng(settings: UploadSettings, rng: fastrand::Rng) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            settings,
            events,
            rng: Mutex::new(rng),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadProgress> {
        self.events.subscribe()
    }

    pub fn settings(&self) -> &UploadSettings {
        &self.settings
    }

    fn step(&self) -> f32 {
        let lo = self.settings.min_step.max(MIN_STEP);
        let hi = self.settings.max_step.max(lo);
        lo + self.rng.lock().f32() * (hi - lo)
    }

    fn emit(&self, progress: UploadProgress) {
        tracing::debug!("Upload: {}", progress.message);
        let _ = self.events.send(progress);
    }
}

impl Default for SimulatedUpload {
    fn default() -> Self {
        Self::new(UploadSettings::default())
    }
}

#[async_trait]
impl UploadHandoff for SimulatedUpload {
    async fn deliver(&self, artifact: Option<Arc<Artifact>>) {
        let Some(artifact) = artifact else {
            tracing::info!("Nothing recorded; upload skipped");
            self.emit(UploadProgress::skipped());
            return;
        };

        let file_name = artifact.file_name();
        if let Err(e) = validate_video(&artifact.mime_type, artifact.size() as u64) {
            tracing::warn!("Upload rejected for {}: {}", file_name, e);
            self.emit(UploadProgress::rejected(&e, &file_name));
            return;
        }

        tracing::info!("Uploading {} ({} bytes)", file_name, artifact.size());
        self.emit(UploadProgress::uploading(0.0, &file_name));

        let mut ticker = tokio::time::interval(Duration::from_millis(self.settings.tick_ms.max(1)));
        ticker.tick().await;

        let mut percent = 0.0f32;
        loop {
            ticker.tick().await;
            percent += self.step();
            if percent >= 100.0 {
                break;
            }
            self.emit(UploadProgress::uploading(percent, &file_name));
        }

        self.emit(UploadProgress::processing(&file_name));
        tokio::time::sleep(Duration::from_millis(self.settings.analysis_delay_ms)).await;
        self.emit(UploadProgress::complete(&file_name));

        tracing::info!("Upload of {} complete", file_name);
    }
}
