//! Microphone capture using cpal
//!
//! Holds the default input device open for the lifetime of the stream and
//! tracks the peak input level. Samples are not kept.

use crate::capture::traits::DeviceAccessError;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::SampleFormat;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

/// Handle to the microphone thread
pub(super) struct Microphone {
    running: Arc<AtomicBool>,
    peak: Arc<AtomicU32>,
    label: String,
}

impl Microphone {
    /// Open the default input device. Blocks until the stream is playing.
    pub fn open() -> Result<Self, DeviceAccessError> {
        let running = Arc::new(AtomicBool::new(true));
        let peak = Arc::new(AtomicU32::new(0));
        let (ready_tx, ready_rx) = mpsc::channel();

        let thread_running = running.clone();
        let thread_peak = peak.clone();
        // cpal streams are not Send on every platform, so the stream stays on
        // the thread that built it.
        std::thread::spawn(move || {
            let host = cpal::default_host();
            let Some(device) = host.default_input_device() else {
                let _ = ready_tx.send(Err(DeviceAccessError::DeviceNotFound(
                    "no default microphone".to_string(),
                )));
                return;
            };
            let label = device.name().unwrap_or_else(|_| "Microphone".to_string());

            let config = match device.default_input_config() {
                Ok(config) => config,
                Err(e) => {
                    let _ = ready_tx.send(Err(DeviceAccessError::Platform(e.to_string())));
                    return;
                }
            };

            let on_error = |err: cpal::StreamError| tracing::error!("Microphone stream error: {}", err);
            let stream = match config.sample_format() {
                SampleFormat::F32 => {
                    let peak = thread_peak.clone();
                    device.build_input_stream(
                        &config.into(),
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            let level = data.iter().fold(0.0f32, |m, s| m.max(s.abs()));
                            peak.fetch_max(level.to_bits(), Ordering::Relaxed);
                        },
                        on_error,
                        None,
                    )
                }
                SampleFormat::I16 => {
                    let peak = thread_peak.clone();
                    device.build_input_stream(
                        &config.into(),
                        move |data: &[i16], _: &cpal::InputCallbackInfo| {
                            let level = data
                                .iter()
                                .fold(0.0f32, |m, s| m.max((*s as f32 / i16::MAX as f32).abs()));
                            peak.fetch_max(level.to_bits(), Ordering::Relaxed);
                        },
                        on_error,
                        None,
                    )
                }
                other => {
                    let _ = ready_tx.send(Err(DeviceAccessError::Unsupported(format!(
                        "sample format {other:?}"
                    ))));
                    return;
                }
            };

            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = ready_tx.send(Err(DeviceAccessError::PermissionDenied(e.to_string())));
                    return;
                }
            };
            if let Err(e) = stream.play() {
                let _ = ready_tx.send(Err(DeviceAccessError::Platform(e.to_string())));
                return;
            }

            tracing::info!("Microphone stream started: {}", label);
            let _ = ready_tx.send(Ok(label));

            while thread_running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(100));
            }
            drop(stream);
            tracing::info!("Microphone released");
        });

        let label = ready_rx
            .recv()
            .map_err(|_| DeviceAccessError::Platform("microphone thread exited".to_string()))??;

        Ok(Self {
            running,
            peak,
            label,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Highest absolute sample seen so far, 0.0 - 1.0
    pub fn peak_level(&self) -> f32 {
        f32::from_bits(self.peak.load(Ordering::Relaxed))
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }
}

impl Drop for Microphone {
    fn drop(&mut self) {
        self.stop();
    }
}
