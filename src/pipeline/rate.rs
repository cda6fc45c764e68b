//! Per-window byte and frame accounting

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::utils::string::format_data_rate;

/// Totals of one completed window
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RateSnapshot {
    pub bytes: u64,
    pub frames: u32,
    pub window: Duration,
}

impl RateSnapshot {
    pub fn bytes_per_second(&self) -> f64 {
        let secs = self.window.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.bytes as f64 / secs
    }

    pub fn frames_per_second(&self) -> f64 {
        let secs = self.window.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.frames as f64 / secs
    }
}

impl fmt::Display for RateSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, {:.1} fps",
            format_data_rate(self.bytes_per_second()),
            self.frames_per_second()
        )
    }
}

#[derive(Default)]
struct Counters {
    bytes: u64,
    frames: u32,
}

/// Counters for the window in progress
///
/// Bytes and frames share one lock, so a frame and its bytes always land in
/// the same window.
pub struct RateWindow {
    counters: Mutex<Counters>,
}

impl RateWindow {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Count one frame of `size` bytes
    pub fn record(&self, size: usize) {
        let mut counters = self.counters.lock();
        counters.bytes += size as u64;
        counters.frames = counters.frames.saturating_add(1);
    }

    pub fn current_bytes(&self) -> u64 {
        self.counters.lock().bytes
    }

    pub fn current_frames(&self) -> u32 {
        self.counters.lock().frames
    }

    /// Close the current window and start a new one at zero
    pub fn roll(&self, window: Duration) -> RateSnapshot {
        let Counters { bytes, frames } = std::mem::take(&mut *self.counters.lock());
        RateSnapshot {
            bytes,
            frames,
            window,
        }
    }
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Rolls a [`RateWindow`] on a fixed period and publishes each snapshot
pub struct RateMonitor {
    window: Arc<RateWindow>,
    period: Duration,
    tx: watch::Sender<RateSnapshot>,
}

impl RateMonitor {
    pub fn new(window: Arc<RateWindow>, period: Duration) -> (Self, watch::Receiver<RateSnapshot>) {
        let (tx, rx) = watch::channel(RateSnapshot::default());
        (Self { window, period, tx }, rx)
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.period);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            let snapshot = self.window.roll(self.period);
            debug!("RateMonitor: {}", snapshot);
            if self.tx.send(snapshot).is_err() {
                break;
            }
        }
    }
}
