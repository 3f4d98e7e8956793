//! Interview elapsed-time display

use crate::session::state::SessionEvent;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// `MM:SS`, minutes not wrapped at the hour
pub fn format_elapsed(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

/// Counts whole seconds while a session runs and broadcasts each tick
pub struct ElapsedTimer {
    period: Duration,
    seconds: Arc<AtomicU64>,
    handle: Option<JoinHandle<()>>,
    events: Option<broadcast::Sender<SessionEvent>>,
}

impl ElapsedTimer {
    pub fn new() -> Self {
        Self::with_period(Duration::from_secs(1))
    }

    /// Tick every `period` instead of every second
    pub fn with_period(period: Duration) -> Self {
        Self {
            period,
            seconds: Arc::new(AtomicU64::new(0)),
            handle: None,
            events: None,
        }
    }

    /// Start from zero
    pub fn start(&mut self, events: broadcast::Sender<SessionEvent>) {
        self.stop();

        let seconds = self.seconds.clone();
        let period = self.period;
        let tx = events.clone();
        self.handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let elapsed = seconds.fetch_add(1, Ordering::SeqCst) + 1;
                let _ = tx.send(SessionEvent::TimerTick {
                    seconds: elapsed,
                    display: format_elapsed(elapsed),
                });
            }
        }));
        self.events = Some(events);
    }

    /// Stop ticking and reset the display to `00:00`
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.seconds.store(0, Ordering::SeqCst);
        if let Some(events) = self.events.take() {
            let _ = events.send(SessionEvent::TimerTick {
                seconds: 0,
                display: format_elapsed(0),
            });
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn seconds(&self) -> u64 {
        self.seconds.load(Ordering::SeqCst)
    }

    pub fn display(&self) -> String {
        format_elapsed(self.seconds())
    }
}

impl Default for ElapsedTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ElapsedTimer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}
