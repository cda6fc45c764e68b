//! Sender pipeline coordinator
//!
//! Chains synchronizer → encode → transmit stages and manages their lifecycle.

use anyhow::Result;
use futures_util::future::join_all;
use log::{error, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture::frame::SyncedPair;
use crate::capture::traits::{FrameSource, PairListener};
use crate::config::Config;
use crate::encoder::DepthEncoder;
use crate::pipeline::health::{PipelineHealth, spawn_health_reporting};
use crate::pipeline::rate::{RateMonitor, RateSnapshot, RateWindow};
use crate::pipeline::sender::encode_stage::EncodeStage;
use crate::pipeline::sender::transmit_stage::TransmitStage;
use crate::pipeline::stage::spawn_stage;
use crate::pipeline::state::PipelineState;
use crate::utils::net::transport::Transport;

/// Listener id the sender registers with its frame source
pub const SENDER_LISTENER_ID: &str = "depth-sender";

/// Coordinates the sender pipeline: Synchronizer → Encode → Transmit
///
/// The synchronizer callback never blocks: pairs go into a bounded queue and
/// are dropped when it is full.
pub struct SenderCoordinator {
    config: Config,
    source: Arc<dyn FrameSource>,
    transport: Arc<dyn Transport>,
    health: Arc<PipelineHealth>,
    rate: Arc<RateWindow>,
    rate_monitor: Option<RateMonitor>,
    rate_rx: watch::Receiver<RateSnapshot>,
    state: PipelineState,
    paused: Arc<AtomicBool>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl SenderCoordinator {
    /// Create a new sender coordinator
    pub fn new(config: Config, source: Arc<dyn FrameSource>, transport: Arc<dyn Transport>) -> Self {
        let rate = Arc::new(RateWindow::new());
        let (rate_monitor, rate_rx) = RateMonitor::new(rate.clone(), config.rate_window());

        Self {
            config,
            source,
            transport,
            health: Arc::new(PipelineHealth::new()),
            rate,
            rate_monitor: Some(rate_monitor),
            rate_rx,
            state: PipelineState::Idle,
            paused: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// Get the pipeline health metrics
    pub fn health(&self) -> &Arc<PipelineHealth> {
        &self.health
    }

    /// Outgoing byte rate, one snapshot per rate window
    pub fn rate_updates(&self) -> watch::Receiver<RateSnapshot> {
        self.rate_rx.clone()
    }

    /// Get the current pipeline state
    pub fn state(&self) -> &PipelineState {
        &self.state
    }

    /// Wire the stages and subscribe to the frame source
    pub fn start(&mut self) -> Result<()> {
        self.state.transition(PipelineState::Initializing)?;

        let queue_depth = self.config.queue_depth.max(1);
        let (pair_tx, pair_rx) = mpsc::channel::<SyncedPair>(queue_depth);

        let encoder = DepthEncoder::new(Arc::new(self.config.compression));
        let mut encode_stage = EncodeStage::new(encoder, self.health.clone(), queue_depth);
        encode_stage.set_input(pair_rx);
        let encoded_rx = encode_stage.take_output();

        let mut transmit_stage = TransmitStage::new(
            self.transport.clone(),
            self.health.clone(),
            self.rate.clone(),
            self.config.max_buffered_bytes,
        );
        transmit_stage.set_input(encoded_rx);

        self.tasks.push(spawn_stage(encode_stage));
        self.tasks.push(spawn_stage(transmit_stage));

        if let Some(monitor) = self.rate_monitor.take() {
            let cancel = self.cancel.clone();
            self.tasks
                .push(tokio::spawn(async move { monitor.run(cancel).await }));
        }
        self.tasks.push(spawn_health_reporting(
            "Sender",
            self.health.clone(),
            self.config.health_log_interval(),
            self.cancel.clone(),
        ));

        let paused = self.paused.clone();
        let health = self.health.clone();
        let listener: PairListener = Arc::new(move |pair: &SyncedPair| {
            if paused.load(Ordering::Relaxed) {
                return;
            }
            match pair_tx.try_send(pair.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => health.record_frame_drop(),
                Err(TrySendError::Closed(_)) => {}
            }
        });
        self.source
            .register_synced_pair_listener(SENDER_LISTENER_ID, listener);

        self.state.transition(PipelineState::running())?;
        info!("SenderCoordinator: pipeline running");
        Ok(())
    }

    /// Pause streaming; pairs arriving meanwhile are ignored
    pub fn pause(&mut self) -> Result<()> {
        if self.state.is_running() {
            self.state.transition(PipelineState::paused())?;
            self.paused.store(true, Ordering::Relaxed);
            info!("SenderCoordinator: pipeline paused");
        }
        Ok(())
    }

    /// Resume from pause
    pub fn resume(&mut self) -> Result<()> {
        if self.state.is_paused() {
            self.state.transition(PipelineState::running())?;
            self.paused.store(false, Ordering::Relaxed);
            info!("SenderCoordinator: pipeline resumed");
        }
        Ok(())
    }

    /// Stop the pipeline and wait for every stage to drain
    pub async fn stop(&mut self) -> Result<()> {
        if self.state.is_stopped() {
            return Ok(());
        }
        if self.state == PipelineState::Idle {
            self.state = PipelineState::Stopped;
            return Ok(());
        }
        self.state.transition(PipelineState::Stopping)?;

        // Dropping the listener drops the queue sender, which ends the stage chain
        self.source
            .unregister_synced_pair_listener(SENDER_LISTENER_ID);
        self.cancel.cancel();

        for result in join_all(self.tasks.drain(..)).await {
            if let Err(e) = result {
                error!("SenderCoordinator: task failed: {}", e);
            }
        }

        self.state.transition(PipelineState::Stopped)?;
        info!("SenderCoordinator: pipeline stopped ({})", self.health.summary());
        Ok(())
    }
}
