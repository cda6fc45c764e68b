//! Health monitoring and metrics for pipeline

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn now_micros() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

/// Health metrics for a pipeline
///
/// Tracks various counters and timestamps to monitor pipeline health.
/// All fields use atomic operations for thread-safe access.
pub struct PipelineHealth {
    /// Number of frames dropped due to backpressure
    pub frame_drops: AtomicU64,

    /// Number of frames that failed to encode or compress
    pub encode_failures: AtomicU64,

    /// Number of messages whose compressed stream was unreadable
    pub decompress_failures: AtomicU64,

    /// Number of messages rejected by header or length validation
    pub decode_failures: AtomicU64,

    /// Number of failed sends
    pub transport_errors: AtomicU64,

    /// Timestamp (as Unix microseconds) of the last successfully processed frame
    pub last_frame_time: AtomicU64,

    /// Number of frames successfully processed
    pub frames_processed: AtomicU64,

    /// Total bytes of data processed
    pub bytes_processed: AtomicU64,
}

impl PipelineHealth {
    /// Create a new health metrics instance
    pub fn new() -> Self {
        Self {
            frame_drops: AtomicU64::new(0),
            encode_failures: AtomicU64::new(0),
            decompress_failures: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            transport_errors: AtomicU64::new(0),
            last_frame_time: AtomicU64::new(now_micros()),
            frames_processed: AtomicU64::new(0),
            bytes_processed: AtomicU64::new(0),
        }
    }

    /// Record a dropped frame
    pub fn record_frame_drop(&self) {
        self.frame_drops.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encode_failure(&self) {
        self.encode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decompress_failure(&self) {
        self.decompress_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a decode failure
    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_transport_error(&self) {
        self.transport_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successfully processed frame
    pub fn record_frame(&self, size: usize) {
        self.last_frame_time.store(now_micros(), Ordering::Relaxed);
        self.frames_processed.fetch_add(1, Ordering::Relaxed);
        self.bytes_processed
            .fetch_add(size as u64, Ordering::Relaxed);
    }

    /// Get the number of frame drops
    pub fn frame_drops(&self) -> u64 {
        self.frame_drops.load(Ordering::Relaxed)
    }

    pub fn encode_failures(&self) -> u64 {
        self.encode_failures.load(Ordering::Relaxed)
    }

    pub fn decompress_failures(&self) -> u64 {
        self.decompress_failures.load(Ordering::Relaxed)
    }

    /// Get the number of decode failures
    pub fn decode_failures(&self) -> u64 {
        self.decode_failures.load(Ordering::Relaxed)
    }

    pub fn transport_errors(&self) -> u64 {
        self.transport_errors.load(Ordering::Relaxed)
    }

    /// Get the timestamp of the last frame (Unix microseconds)
    pub fn last_frame_time(&self) -> u64 {
        self.last_frame_time.load(Ordering::Relaxed)
    }

    /// Get the number of frames processed
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed.load(Ordering::Relaxed)
    }

    /// Get the total bytes processed
    pub fn bytes_processed(&self) -> u64 {
        self.bytes_processed.load(Ordering::Relaxed)
    }

    /// Calculate the frame drop rate as a percentage
    pub fn frame_drop_rate(&self) -> f64 {
        let drops = self.frame_drops();
        let processed = self.frames_processed();
        if processed == 0 {
            return 0.0;
        }
        (drops as f64 / processed as f64) * 100.0
    }

    /// Check if the pipeline has stalled (no frames for given duration)
    pub fn is_stalled(&self, threshold: Duration) -> bool {
        let elapsed_micros = now_micros().saturating_sub(self.last_frame_time());
        elapsed_micros > threshold.as_micros() as u64
    }

    /// Get a summary of health metrics
    pub fn summary(&self) -> HealthSummary {
        HealthSummary {
            frames_processed: self.frames_processed(),
            frame_drops: self.frame_drops(),
            encode_failures: self.encode_failures(),
            decompress_failures: self.decompress_failures(),
            decode_failures: self.decode_failures(),
            transport_errors: self.transport_errors(),
            bytes_processed: self.bytes_processed(),
            frame_drop_rate: self.frame_drop_rate(),
        }
    }
}

impl Default for PipelineHealth {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of health metrics
#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub frames_processed: u64,
    pub frame_drops: u64,
    pub encode_failures: u64,
    pub decompress_failures: u64,
    pub decode_failures: u64,
    pub transport_errors: u64,
    pub bytes_processed: u64,
    pub frame_drop_rate: f64,
}

impl std::fmt::Display for HealthSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Health: {} frames ({} drops, {:.2}%), {} encode failures, {} decompress failures, {} decode failures, {} transport errors, {} bytes",
            self.frames_processed,
            self.frame_drops,
            self.frame_drop_rate,
            self.encode_failures,
            self.decompress_failures,
            self.decode_failures,
            self.transport_errors,
            self.bytes_processed,
        )
    }
}

/// Health alert types
#[derive(Debug, Clone, PartialEq)]
pub enum HealthAlert {
    /// Pipeline has stalled (no frames for threshold duration)
    Stalled { duration: Duration },

    /// High frame drop rate detected
    HighDropRate { rate: f64 },

    /// New messages rejected by the receiver
    DecodeFailures { count: u64 },

    /// New failed sends
    TransportErrors { count: u64 },
}

impl std::fmt::Display for HealthAlert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HealthAlert::Stalled { duration } => {
                write!(f, "Pipeline stalled for {:?}", duration)
            }
            HealthAlert::HighDropRate { rate } => {
                write!(f, "High frame drop rate: {:.2}%", rate)
            }
            HealthAlert::DecodeFailures { count } => {
                write!(f, "Decode failures: {}", count)
            }
            HealthAlert::TransportErrors { count } => {
                write!(f, "Transport errors: {}", count)
            }
        }
    }
}

/// Health monitoring service
///
/// Periodically checks pipeline health and sends alerts when issues are detected.
pub struct HealthMonitor {
    health: Arc<PipelineHealth>,
    alert_tx: mpsc::Sender<HealthAlert>,
    check_interval: Duration,
    stall_threshold: Duration,
    drop_rate_threshold: f64,
}

impl HealthMonitor {
    /// Create a new health monitor
    pub fn new(health: Arc<PipelineHealth>, alert_tx: mpsc::Sender<HealthAlert>) -> Self {
        Self {
            health,
            alert_tx,
            check_interval: Duration::from_secs(5),
            stall_threshold: Duration::from_secs(5),
            drop_rate_threshold: 10.0, // 10% drop rate
        }
    }

    /// Configure the check interval
    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    /// Configure the stall threshold
    pub fn with_stall_threshold(mut self, threshold: Duration) -> Self {
        self.stall_threshold = threshold;
        self
    }

    /// Run until cancelled
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.check_interval);
        let mut last_decode_failures = 0u64;
        let mut last_transport_errors = 0u64;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            let mut alerts = Vec::new();

            if self.health.is_stalled(self.stall_threshold) {
                alerts.push(HealthAlert::Stalled {
                    duration: self.stall_threshold,
                });
            }

            let drop_rate = self.health.frame_drop_rate();
            if drop_rate > self.drop_rate_threshold {
                alerts.push(HealthAlert::HighDropRate { rate: drop_rate });
            }

            let decode_failures =
                self.health.decode_failures() + self.health.decompress_failures();
            if decode_failures > last_decode_failures {
                alerts.push(HealthAlert::DecodeFailures {
                    count: decode_failures - last_decode_failures,
                });
                last_decode_failures = decode_failures;
            }

            let transport_errors = self.health.transport_errors();
            if transport_errors > last_transport_errors {
                alerts.push(HealthAlert::TransportErrors {
                    count: transport_errors - last_transport_errors,
                });
                last_transport_errors = transport_errors;
            }

            for alert in alerts {
                if self.alert_tx.send(alert).await.is_err() {
                    return;
                }
            }
        }
    }
}

/// Log a health summary every `log_interval` and surface monitor alerts as warnings
pub fn spawn_health_reporting(
    label: &'static str,
    health: Arc<PipelineHealth>,
    log_interval: Duration,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let (alert_tx, mut alert_rx) = mpsc::channel(16);
        let monitor = HealthMonitor::new(health.clone(), alert_tx);
        let monitor_cancel = cancel.clone();
        tokio::spawn(async move { monitor.run(monitor_cancel).await });

        let mut interval = tokio::time::interval(log_interval);
        interval.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    log::info!("{} pipeline health: {}", label, health.summary());
                }
                Some(alert) = alert_rx.recv() => {
                    log::warn!("{} pipeline: {}", label, alert);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_metrics() {
        let health = PipelineHealth::new();

        // Record some frames
        health.record_frame(1000);
        health.record_frame(2000);
        health.record_frame(1500);

        assert_eq!(health.frames_processed(), 3);
        assert_eq!(health.bytes_processed(), 4500);
        assert_eq!(health.frame_drops(), 0);

        // Record some drops
        health.record_frame_drop();
        health.record_frame_drop();

        assert_eq!(health.frame_drops(), 2);
        assert!(health.frame_drop_rate() > 0.0);
    }

    #[test]
    fn test_failure_counters() {
        let health = PipelineHealth::new();
        health.record_encode_failure();
        health.record_decompress_failure();
        health.record_decode_failure();
        health.record_decode_failure();
        health.record_transport_error();

        let summary = health.summary();
        assert_eq!(summary.encode_failures, 1);
        assert_eq!(summary.decompress_failures, 1);
        assert_eq!(summary.decode_failures, 2);
        assert_eq!(summary.transport_errors, 1);
        assert!(summary.to_string().contains("2 decode failures"));
    }

    #[test]
    fn test_stall_detection() {
        let health = PipelineHealth::new();

        // Should not be stalled immediately
        assert!(!health.is_stalled(Duration::from_secs(1)));

        // Record a frame to update last_frame_time
        health.record_frame(1000);

        // Simulate stall by not recording frames
        std::thread::sleep(Duration::from_millis(150));

        // Should be stalled after 150ms if threshold is 100ms
        assert!(health.is_stalled(Duration::from_millis(100)));
    }

    #[tokio::test]
    async fn test_monitor_reports_new_failures() {
        let health = Arc::new(PipelineHealth::new());
        health.record_frame(10);
        health.record_decode_failure();
        health.record_transport_error();

        let (tx, mut rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();
        let monitor = HealthMonitor::new(health.clone(), tx)
            .with_check_interval(Duration::from_millis(10))
            .with_stall_threshold(Duration::from_secs(60));
        let task = tokio::spawn({
            let cancel = cancel.clone();
            async move { monitor.run(cancel).await }
        });

        assert_eq!(rx.recv().await, Some(HealthAlert::DecodeFailures { count: 1 }));
        assert_eq!(rx.recv().await, Some(HealthAlert::TransportErrors { count: 1 }));

        cancel.cancel();
        task.await.unwrap();
    }
}
