//! Transmit stage for the sender pipeline
//!
//! Hands compressed messages to the transport. No retries: a frame that
//! can't go out now is stale by the time it could.

use anyhow::Result;
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::encoder::WireFrame;
use crate::pipeline::PipelineStage;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::rate::RateWindow;
use crate::utils::net::transport::{Transport, TransportError};

pub struct TransmitStage {
    transport: Arc<dyn Transport>,
    health: Arc<PipelineHealth>,
    rate: Arc<RateWindow>,
    max_buffered_bytes: usize,
    input_rx: Option<mpsc::Receiver<WireFrame>>,
}

impl TransmitStage {
    pub fn new(
        transport: Arc<dyn Transport>,
        health: Arc<PipelineHealth>,
        rate: Arc<RateWindow>,
        max_buffered_bytes: usize,
    ) -> Self {
        Self {
            transport,
            health,
            rate,
            max_buffered_bytes,
            input_rx: None,
        }
    }

    /// Set the input channel
    pub fn set_input(&mut self, rx: mpsc::Receiver<WireFrame>) {
        self.input_rx = Some(rx);
    }
}

#[async_trait]
impl PipelineStage for TransmitStage {
    async fn run(&mut self) -> Result<()> {
        let mut input_rx = self
            .input_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("No input channel"))?;

        info!("TransmitStage: started");
        let mut sent = 0u64;
        let mut dropped = 0u64;

        while let Some(frame) = input_rx.recv().await {
            let buffered = self.transport.buffered_amount().await;
            if buffered > self.max_buffered_bytes {
                dropped += 1;
                self.health.record_frame_drop();
                debug!("TransmitStage: {} bytes queued, dropping frame", buffered);
                continue;
            }

            let size = frame.size();
            match self.transport.send(frame.data).await {
                Ok(()) => {
                    sent += 1;
                    self.rate.record(size);
                    self.health.record_frame(size);
                }
                Err(TransportError::NotOpen) => {
                    self.health.record_transport_error();
                    debug!("TransmitStage: transport not open, frame discarded");
                }
                Err(e) => {
                    self.health.record_transport_error();
                    warn!("TransmitStage: {}", e);
                }
            }
        }

        info!(
            "TransmitStage: finished, {} frames transmitted, {} dropped",
            sent, dropped
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "TransmitStage"
    }
}
