//! Receive stage for the receiver pipeline
//!
//! Installs the transport's message handler and forwards every message into
//! a bounded queue. The handler runs on the transport's thread, so it never
//! waits: a full queue drops the message.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use log::info;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use crate::pipeline::PipelineStage;
use crate::pipeline::health::PipelineHealth;
use crate::utils::net::transport::{MessageHandler, Transport};

pub struct ReceiveStage {
    transport: Arc<dyn Transport>,
    health: Arc<PipelineHealth>,
    queue_depth: usize,
    cancel: CancellationToken,
    output_tx: Option<mpsc::Sender<Bytes>>,
}

impl ReceiveStage {
    pub fn new(
        transport: Arc<dyn Transport>,
        health: Arc<PipelineHealth>,
        queue_depth: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            health,
            queue_depth: queue_depth.max(1),
            cancel,
            output_tx: None,
        }
    }

    /// Get the message output channel
    pub fn take_output(&mut self) -> mpsc::Receiver<Bytes> {
        let (tx, rx) = mpsc::channel::<Bytes>(self.queue_depth);
        self.output_tx = Some(tx);
        rx
    }
}

#[async_trait]
impl PipelineStage for ReceiveStage {
    async fn run(&mut self) -> Result<()> {
        let output_tx = self
            .output_tx
            .take()
            .ok_or_else(|| anyhow::anyhow!("No output channel"))?;

        let received = Arc::new(AtomicU64::new(0));
        let handler: MessageHandler = {
            let health = self.health.clone();
            let received = received.clone();
            Arc::new(move |message: Bytes| {
                if received.fetch_add(1, Ordering::Relaxed) == 0 {
                    info!("ReceiveStage: first message received ({} bytes)", message.len());
                }
                if let Err(TrySendError::Full(_)) = output_tx.try_send(message) {
                    health.record_frame_drop();
                }
            })
        };
        self.transport.on_message(handler);

        info!("ReceiveStage: started");
        self.cancel.cancelled().await;

        // Replacing the handler releases the queue sender
        self.transport.on_message(Arc::new(|_: Bytes| {}));

        info!(
            "ReceiveStage: finished, {} messages received",
            received.load(Ordering::Relaxed)
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "ReceiveStage"
    }
}
