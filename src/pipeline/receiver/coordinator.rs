//! Receiver pipeline coordinator
//!
//! Chains receive → decode stages and manages their lifecycle.

use anyhow::Result;
use futures_util::future::join_all;
use log::{error, info};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::decoder::FrameReconstructor;
use crate::pipeline::health::{PipelineHealth, spawn_health_reporting};
use crate::pipeline::rate::{RateMonitor, RateSnapshot, RateWindow};
use crate::pipeline::receiver::decode_stage::DecodeStage;
use crate::pipeline::receiver::receive_stage::ReceiveStage;
use crate::pipeline::stage::spawn_stage;
use crate::pipeline::state::PipelineState;
use crate::utils::net::transport::Transport;

/// Coordinates the receiver pipeline: Network → Receive → Decode → Buffer
///
/// Consumers subscribe to reconstructed buffers through
/// [`ReceiverCoordinator::reconstructor`].
pub struct ReceiverCoordinator {
    config: Config,
    transport: Arc<dyn Transport>,
    health: Arc<PipelineHealth>,
    reconstructor: Arc<FrameReconstructor>,
    rate_monitor: Option<RateMonitor>,
    rate_rx: watch::Receiver<RateSnapshot>,
    state: PipelineState,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl ReceiverCoordinator {
    /// Create a new receiver coordinator
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Self {
        let health = Arc::new(PipelineHealth::new());
        let rate = Arc::new(RateWindow::new());
        let (rate_monitor, rate_rx) = RateMonitor::new(rate.clone(), config.rate_window());
        let reconstructor = Arc::new(FrameReconstructor::new(
            Arc::new(config.compression),
            config.max_message_bytes,
            rate,
            health.clone(),
        ));

        Self {
            config,
            transport,
            health,
            reconstructor,
            rate_monitor: Some(rate_monitor),
            rate_rx,
            state: PipelineState::Idle,
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Launch the receiver pipeline
    pub fn launch(&mut self) -> Result<()> {
        self.state.transition(PipelineState::Initializing)?;

        let mut receive_stage = ReceiveStage::new(
            self.transport.clone(),
            self.health.clone(),
            self.config.queue_depth,
            self.cancel.clone(),
        );
        let message_rx = receive_stage.take_output();

        let mut decode_stage = DecodeStage::new(self.reconstructor.clone(), self.cancel.clone());
        decode_stage.set_input(message_rx);

        self.tasks.push(spawn_stage(receive_stage));
        self.tasks.push(spawn_stage(decode_stage));

        if let Some(monitor) = self.rate_monitor.take() {
            let cancel = self.cancel.clone();
            self.tasks
                .push(tokio::spawn(async move { monitor.run(cancel).await }));
        }
        self.tasks.push(spawn_health_reporting(
            "Receiver",
            self.health.clone(),
            self.config.health_log_interval(),
            self.cancel.clone(),
        ));

        self.state.transition(PipelineState::running())?;
        info!("ReceiverCoordinator: pipeline launched");
        Ok(())
    }

    /// Reconstruction state and buffer listeners
    pub fn reconstructor(&self) -> &Arc<FrameReconstructor> {
        &self.reconstructor
    }

    /// Incoming byte rate, one snapshot per rate window
    pub fn rate_updates(&self) -> watch::Receiver<RateSnapshot> {
        self.rate_rx.clone()
    }

    /// Get the pipeline health metrics
    pub fn health(&self) -> &Arc<PipelineHealth> {
        &self.health
    }

    /// Get the current pipeline state
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Stop the pipeline
    pub async fn stop(&mut self) -> Result<()> {
        if self.state.is_stopped() {
            return Ok(());
        }
        if self.state == PipelineState::Idle {
            self.state = PipelineState::Stopped;
            return Ok(());
        }
        self.state.transition(PipelineState::Stopping)?;
        self.cancel.cancel();

        for result in join_all(self.tasks.drain(..)).await {
            if let Err(e) = result {
                error!("ReceiverCoordinator: task failed: {}", e);
            }
        }

        self.state.transition(PipelineState::Stopped)?;
        info!("ReceiverCoordinator: pipeline stopped ({})", self.health.summary());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::ReceiverState;
    use crate::utils::net::LoopbackTransport;
    use bytes::Bytes;
    use std::time::Duration;

    #[tokio::test]
    async fn test_rejects_bad_messages_and_stops() {
        let (a, b) = LoopbackTransport::pair(8);
        let mut receiver = ReceiverCoordinator::new(Config::default(), Arc::new(b));
        receiver.launch().unwrap();
        assert!(receiver.state().is_running());

        a.send(Bytes::from_static(&[0xff; 32])).await.unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while receiver.health().decompress_failures() == 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(receiver.reconstructor().state(), ReceiverState::Uninitialized);

        receiver.stop().await.unwrap();
        assert_eq!(*receiver.state(), PipelineState::Stopped);
        receiver.stop().await.unwrap();
    }
}
