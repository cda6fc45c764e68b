//! Pipeline stage trait
//!
//! Stages are long-running tasks joined by bounded channels. A stage ends
//! when its input channel closes; coordinators only need to drop the head of
//! the chain to drain everything behind it.

use anyhow::Result;
use async_trait::async_trait;
use log::error;
use tokio::task::JoinHandle;

/// Trait for pipeline stages that process depth data
#[async_trait]
pub trait PipelineStage: Send + Sync {
    /// Run the stage until its input is exhausted
    async fn run(&mut self) -> Result<()>;

    /// Get the name of this stage for logging
    fn name(&self) -> &'static str;

    /// Gracefully shutdown the stage
    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Run a stage on its own task, logging instead of propagating failures
pub fn spawn_stage<S>(mut stage: S) -> JoinHandle<()>
where
    S: PipelineStage + 'static,
{
    tokio::spawn(async move {
        let name = stage.name();
        if let Err(e) = stage.run().await {
            error!("{} error: {}", name, e);
        }
        if let Err(e) = stage.shutdown().await {
            error!("{} shutdown error: {}", name, e);
        }
    })
}
