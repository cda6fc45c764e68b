//! Encode stage for the sender pipeline
//!
//! Serializes and compresses the depth half of each synchronized pair.

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::capture::frame::SyncedPair;
use crate::encoder::{DepthEncoder, WireFrame};
use crate::pipeline::PipelineStage;
use crate::pipeline::health::PipelineHealth;

pub struct EncodeStage {
    encoder: DepthEncoder,
    health: Arc<PipelineHealth>,
    queue_depth: usize,
    input_rx: Option<mpsc::Receiver<SyncedPair>>,
    output_tx: Option<mpsc::Sender<WireFrame>>,
}

impl EncodeStage {
    pub fn new(encoder: DepthEncoder, health: Arc<PipelineHealth>, queue_depth: usize) -> Self {
        Self {
            encoder,
            health,
            queue_depth: queue_depth.max(1),
            input_rx: None,
            output_tx: None,
        }
    }

    /// Set the input channel
    pub fn set_input(&mut self, rx: mpsc::Receiver<SyncedPair>) {
        self.input_rx = Some(rx);
    }

    /// Get the output channel for compressed messages
    pub fn take_output(&mut self) -> mpsc::Receiver<WireFrame> {
        let (tx, rx) = mpsc::channel::<WireFrame>(self.queue_depth);
        self.output_tx = Some(tx);
        rx
    }
}

#[async_trait]
impl PipelineStage for EncodeStage {
    async fn run(&mut self) -> Result<()> {
        let mut input_rx = self
            .input_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("No input channel"))?;
        let output_tx = self
            .output_tx
            .take()
            .ok_or_else(|| anyhow::anyhow!("No output channel"))?;

        info!("EncodeStage: started ({})", self.encoder.compressor_name());
        let mut encoded = 0u64;
        let mut dropped = 0u64;

        while let Some(pair) = input_rx.recv().await {
            let frame = match self.encoder.encode(&pair.depth) {
                Ok(frame) => frame,
                Err(e) => {
                    self.health.record_encode_failure();
                    warn!("EncodeStage: frame at {} skipped: {}", pair.timestamp, e);
                    continue;
                }
            };
            encoded += 1;

            match output_tx.try_send(frame) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped += 1;
                    self.health.record_frame_drop();
                }
                Err(TrySendError::Closed(_)) => {
                    info!("EncodeStage: output channel closed");
                    break;
                }
            }
        }

        info!(
            "EncodeStage: finished ({} encoded, {} dropped)",
            encoded, dropped
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "EncodeStage"
    }
}
