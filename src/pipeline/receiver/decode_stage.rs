//! Decode stage for the receiver pipeline
//!
//! Feeds received messages to the [`FrameReconstructor`], which
//! decompresses, validates and copies them into the reusable buffer.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use log::info;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::decoder::FrameReconstructor;
use crate::pipeline::PipelineStage;

pub struct DecodeStage {
    reconstructor: Arc<FrameReconstructor>,
    cancel: CancellationToken,
    input_rx: Option<mpsc::Receiver<Bytes>>,
}

impl DecodeStage {
    pub fn new(reconstructor: Arc<FrameReconstructor>, cancel: CancellationToken) -> Self {
        Self {
            reconstructor,
            cancel,
            input_rx: None,
        }
    }

    /// Set the input channel
    pub fn set_input(&mut self, rx: mpsc::Receiver<Bytes>) {
        self.input_rx = Some(rx);
    }
}

#[async_trait]
impl PipelineStage for DecodeStage {
    async fn run(&mut self) -> Result<()> {
        let mut input_rx = self
            .input_rx
            .take()
            .ok_or_else(|| anyhow::anyhow!("No input channel"))?;

        info!("DecodeStage: started");
        let mut decoded = 0u64;
        let mut rejected = 0u64;

        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => break,
                message = input_rx.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            // failures are logged and counted by the reconstructor
            match self.reconstructor.on_message(&message) {
                Ok(_) => decoded += 1,
                Err(_) => rejected += 1,
            }
        }

        info!(
            "DecodeStage: finished ({} decoded, {} rejected)",
            decoded, rejected
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "DecodeStage"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{CaptureFrame, Geometry, PixelFormat, Timestamp};
    use crate::capture::pixel_buffer::PixelBuffer;
    use crate::decoder::ReceiverState;
    use crate::encoder::DepthEncoder;
    use crate::pipeline::health::PipelineHealth;
    use crate::pipeline::rate::RateWindow;
    use crate::utils::compress::Compression;

    #[tokio::test]
    async fn test_reconstructs_messages() {
        let compression = Arc::new(Compression::default());
        let health = Arc::new(PipelineHealth::new());
        let rate = Arc::new(RateWindow::new());
        let reconstructor = Arc::new(FrameReconstructor::new(
            compression.clone(),
            1 << 20,
            rate.clone(),
            health.clone(),
        ));

        let geometry = Geometry::packed(4, 2, PixelFormat::OneComponent8);
        let source = PixelBuffer::from_vec(geometry, (0..8).collect()).unwrap();
        let frame = CaptureFrame::new(source, Timestamp::default());
        let wire = DepthEncoder::new(compression).encode(&frame).unwrap();

        let mut stage = DecodeStage::new(reconstructor.clone(), CancellationToken::new());
        let (tx, rx) = mpsc::channel(4);
        stage.set_input(rx);
        tx.send(wire.data.clone()).await.unwrap();
        tx.send(Bytes::from_static(b"garbage")).await.unwrap();
        drop(tx);
        stage.run().await.unwrap();

        assert_eq!(reconstructor.state(), ReceiverState::Ready(geometry));
        let buffer = reconstructor.buffer().unwrap();
        assert_eq!(buffer.to_vec(), (0..8).collect::<Vec<u8>>());
        assert_eq!(health.frames_processed(), 1);
        assert_eq!(health.decompress_failures() + health.decode_failures(), 1);
        assert_eq!(rate.current_frames(), 1);
    }
}
