//! Timer-driven synthetic depth camera
//!
//! Stands in for real depth hardware: every tick it renders a moving depth
//! gradient plus a matching BGRA color frame and feeds both to a
//! [`FramePairSynchronizer`]. Drops can be injected on a fixed period to
//! exercise the discard path.

use std::sync::Arc;
use std::time::{Duration, Instant};

use half::f16;
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::frame::{CaptureFrame, Geometry, PixelFormat, Timestamp};
use super::pixel_buffer::PixelBuffer;
use super::sync::{CaptureTick, FramePairSynchronizer};

#[derive(Debug, Clone)]
pub struct SyntheticCameraConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: u32,
    /// Mark every n-th tick's depth frame as dropped
    pub drop_every: Option<u32>,
    /// Stop after this many ticks
    pub max_frames: Option<u64>,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            width: 256,
            height: 192,
            frame_rate: 60,
            drop_every: None,
            max_frames: None,
        }
    }
}

pub struct SyntheticCamera {
    config: SyntheticCameraConfig,
    synchronizer: Arc<FramePairSynchronizer>,
    cancel: CancellationToken,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticCameraConfig, synchronizer: Arc<FramePairSynchronizer>) -> Self {
        Self {
            config,
            synchronizer,
            cancel: CancellationToken::new(),
        }
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Build the tick for frame `index` captured at `timestamp`
    pub fn render_tick(&self, index: u64, timestamp: Timestamp) -> CaptureTick {
        let depth_dropped = self
            .config
            .drop_every
            .is_some_and(|n| n > 0 && (index + 1) % n as u64 == 0);

        CaptureTick {
            depth: Some(CaptureFrame::new(self.render_depth(index), timestamp)),
            color: Some(CaptureFrame::new(self.render_color(index), timestamp)),
            depth_dropped,
            color_dropped: false,
            timestamp,
        }
    }

    fn render_depth(&self, index: u64) -> PixelBuffer {
        let geometry = Geometry::packed(self.config.width, self.config.height, PixelFormat::DepthFloat16);
        let buffer = PixelBuffer::new(geometry);
        let span = (self.config.width + self.config.height).max(1) as f32;
        {
            let mut pixels = buffer.write();
            let row_len = geometry.bytes_per_row as usize;
            if row_len > 0 {
                for (y, row) in pixels.chunks_exact_mut(row_len).enumerate() {
                    for (x, px) in row.chunks_exact_mut(2).enumerate() {
                        let phase = ((x + y) as u64 + index) as f32 % span;
                        // 0.5m .. 4.5m
                        let meters = 0.5 + 4.0 * phase / span;
                        px.copy_from_slice(&f16::from_f32(meters).to_le_bytes());
                    }
                }
            }
        }
        buffer
    }

    fn render_color(&self, index: u64) -> PixelBuffer {
        let geometry = Geometry::packed(self.config.width, self.config.height, PixelFormat::Bgra32);
        let buffer = PixelBuffer::new(geometry);
        {
            let mut pixels = buffer.write();
            let row_len = geometry.bytes_per_row as usize;
            if row_len > 0 {
                for (y, row) in pixels.chunks_exact_mut(row_len).enumerate() {
                    for (x, px) in row.chunks_exact_mut(4).enumerate() {
                        px[0] = (x as u64 + index) as u8;
                        px[1] = y as u8;
                        px[2] = index as u8;
                        px[3] = u8::MAX;
                    }
                }
            }
        }
        buffer
    }

    /// Time between ticks; never zero, which `tokio::time::interval` rejects
    pub fn frame_period(&self) -> Duration {
        (Duration::from_secs(1) / self.config.frame_rate.max(1)).max(Duration::from_nanos(1))
    }

    /// Start producing ticks; the task resolves to the number of ticks produced
    pub fn spawn(self) -> JoinHandle<u64> {
        tokio::spawn(async move {
            let period = self.frame_period();
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let started = Instant::now();
            let mut produced = 0u64;

            info!(
                "SyntheticCamera: started ({}x{} @ {} fps)",
                self.config.width, self.config.height, self.config.frame_rate
            );

            loop {
                if self.config.max_frames.is_some_and(|max| produced >= max) {
                    break;
                }
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let timestamp = Timestamp::from_duration(started.elapsed());
                let tick = self.render_tick(produced, timestamp);
                self.synchronizer.on_tick(tick);
                produced += 1;
            }

            info!("SyntheticCamera: finished ({} ticks)", produced);
            produced
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::sync::{DropReason, TickOutcome};

    #[test]
    fn test_render_tick_geometry() {
        let camera = SyntheticCamera::new(
            SyntheticCameraConfig {
                width: 8,
                height: 4,
                ..Default::default()
            },
            Arc::new(FramePairSynchronizer::new()),
        );
        let tick = camera.render_tick(0, Timestamp::from_nanos(42));
        let depth = tick.depth.as_ref().map(|f| f.geometry());
        let color = tick.color.as_ref().map(|f| f.geometry());

        assert_eq!(depth, Some(Geometry::packed(8, 4, PixelFormat::DepthFloat16)));
        assert_eq!(color, Some(Geometry::packed(8, 4, PixelFormat::Bgra32)));
        assert!(!tick.depth_dropped);

        let first = tick.depth.map(|f| f.pixels.to_vec()).unwrap_or_default();
        let value = f16::from_le_bytes([first[0], first[1]]).to_f32();
        assert!((value - 0.5).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_extreme_frame_rates() {
        let camera = |frame_rate| {
            SyntheticCamera::new(
                SyntheticCameraConfig {
                    width: 2,
                    height: 2,
                    frame_rate,
                    max_frames: Some(2),
                    ..Default::default()
                },
                Arc::new(FramePairSynchronizer::new()),
            )
        };
        assert_eq!(camera(0).frame_period(), Duration::from_secs(1));
        assert_eq!(camera(60).frame_period(), Duration::from_secs(1) / 60);
        assert_eq!(camera(u32::MAX).frame_period(), Duration::from_nanos(1));

        let produced = tokio::time::timeout(Duration::from_secs(5), camera(u32::MAX).spawn())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(produced, 2);
    }

    #[test]
    fn test_drop_injection() {
        let sync = Arc::new(FramePairSynchronizer::new());
        let camera = SyntheticCamera::new(
            SyntheticCameraConfig {
                width: 2,
                height: 2,
                drop_every: Some(3),
                ..Default::default()
            },
            sync.clone(),
        );

        let outcomes: Vec<_> = (0..6)
            .map(|i| sync.on_tick(camera.render_tick(i, Timestamp::from_nanos(i as i64))))
            .collect();
        assert_eq!(outcomes[2], TickOutcome::Discarded(DropReason::Depth));
        assert_eq!(outcomes[5], TickOutcome::Discarded(DropReason::Depth));
        assert_eq!(sync.ticks_emitted(), 4);
    }

    #[tokio::test]
    async fn test_spawn_respects_frame_budget() {
        let sync = Arc::new(FramePairSynchronizer::new());
        let camera = SyntheticCamera::new(
            SyntheticCameraConfig {
                width: 2,
                height: 2,
                frame_rate: 240,
                max_frames: Some(5),
                ..Default::default()
            },
            sync.clone(),
        );

        let produced = camera.spawn().await.unwrap();
        assert_eq!(produced, 5);
        assert_eq!(sync.ticks_emitted(), 5);
    }
}
