use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::utils::compress::Compression;

pub const DEFAULT_ICE_SERVERS: [&str; 5] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
    "stun:stun2.l.google.com:19302",
    "stun:stun3.l.google.com:19302",
    "stun:stun4.l.google.com:19302",
];

/// Runtime settings, handed explicitly to every component that needs them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub frame_rate: u32,
    pub width: u32,
    pub height: u32,
    pub compression: Compression,
    pub channel_label: String,
    pub rate_window_ms: u64,
    /// Bounded queue length between pipeline stages
    pub queue_depth: usize,
    /// Skip sending while the transport has more than this queued
    pub max_buffered_bytes: usize,
    /// Upper bound for a single message, compressed or not
    pub max_message_bytes: usize,
    pub health_log_interval_secs: u64,
    pub ice_servers: Vec<String>,
    pub include_loopback_candidates: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_rate: 60,
            width: 256,
            height: 192,
            compression: Compression::default(),
            channel_label: "WebRTCData".to_string(),
            rate_window_ms: 1000,
            queue_depth: 4,
            max_buffered_bytes: 8 << 20,
            max_message_bytes: 64 << 20,
            health_log_interval_secs: 30,
            ice_servers: DEFAULT_ICE_SERVERS.iter().map(|s| s.to_string()).collect(),
            include_loopback_candidates: false,
        }
    }
}

impl Config {
    /// Load from a JSON file; missing fields keep their defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn rate_window(&self) -> Duration {
        Duration::from_millis(self.rate_window_ms.max(1))
    }

    pub fn health_log_interval(&self) -> Duration {
        Duration::from_secs(self.health_log_interval_secs.max(1))
    }
}

/// Returns a version as specified in Cargo.toml
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

pub fn app_name() -> &'static str {
    env!("CARGO_PKG_NAME")
}
