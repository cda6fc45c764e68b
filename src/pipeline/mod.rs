//! Pipeline layer for depthlink
//!
//! This module separates concerns between:
//! - Control/Coordination: state machines and lifecycle management
//! - Data Transport: bounded channels with drop-on-full back-pressure
//! - Processing: encode, transmit, receive and reconstruct stages
//!
//! # Architecture
//!
//! The pipeline is organized into stages that communicate via channels:
//! - Each stage runs in its own async task
//! - Stages implement the `PipelineStage` trait
//! - Coordinators chain stages together and manage lifecycle
//! - Rate and health monitors publish what the stages record

pub mod health;
pub mod rate;
pub mod receiver;
pub mod sender;
pub mod stage;
pub mod state;

pub use health::{HealthMonitor, PipelineHealth};
pub use rate::{RateMonitor, RateSnapshot, RateWindow};
pub use receiver::ReceiverCoordinator;
pub use sender::SenderCoordinator;
pub use stage::PipelineStage;
pub use state::PipelineState;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{Geometry, PixelFormat};
    use crate::capture::pixel_buffer::PixelBuffer;
    use crate::capture::sync::FramePairSynchronizer;
    use crate::capture::synthetic::{SyntheticCamera, SyntheticCameraConfig};
    use crate::config::Config;
    use crate::decoder::ReceiverState;
    use crate::utils::net::LoopbackTransport;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_end_to_end_loopback() {
        let config = Config {
            width: 32,
            height: 24,
            frame_rate: 100,
            queue_depth: 32,
            ..Config::default()
        };
        let (a, b) = LoopbackTransport::pair(32);
        let sync = Arc::new(FramePairSynchronizer::new());

        let mut receiver = ReceiverCoordinator::new(config.clone(), Arc::new(b));
        let delivered = Arc::new(AtomicU64::new(0));
        {
            let delivered = delivered.clone();
            receiver.reconstructor().register_listener(
                "test",
                Arc::new(move |_buffer: &Arc<PixelBuffer>| {
                    delivered.fetch_add(1, Ordering::Relaxed);
                }),
            );
        }
        receiver.launch().unwrap();

        let mut sender = SenderCoordinator::new(config.clone(), sync.clone(), Arc::new(a));
        sender.start().unwrap();

        let camera = SyntheticCamera::new(
            SyntheticCameraConfig {
                width: 32,
                height: 24,
                frame_rate: 100,
                drop_every: Some(4),
                max_frames: Some(20),
            },
            sync.clone(),
        );
        let ticks = camera.spawn().await.unwrap();
        assert_eq!(ticks, 20);
        assert_eq!(sync.ticks_discarded(), 5);

        tokio::time::timeout(Duration::from_secs(5), async {
            while delivered.load(Ordering::Relaxed) < sync.ticks_emitted() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let expected = Geometry::packed(32, 24, PixelFormat::DepthFloat16);
        assert_eq!(receiver.reconstructor().state(), ReceiverState::Ready(expected));
        assert_eq!(receiver.health().decode_failures(), 0);
        assert_eq!(receiver.health().decompress_failures(), 0);

        sender.stop().await.unwrap();
        receiver.stop().await.unwrap();
        assert_eq!(
            sender.health().frames_processed(),
            receiver.health().frames_processed()
        );
    }
}
