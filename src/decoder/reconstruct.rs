//! Receiver reconstruction state machine
//!
//! Starts `Uninitialized`. The first valid message allocates a pixel buffer
//! matching its geometry and moves to `Ready`. Later messages with the same
//! geometry are copied into that buffer; a different geometry allocates a
//! fresh one. Invalid messages are dropped without touching the buffer.

use std::sync::Arc;

use log::{info, trace, warn};
use parking_lot::Mutex;

use super::ReceiveError;
use crate::capture::frame::Geometry;
use crate::capture::pixel_buffer::PixelBuffer;
use crate::encoder::wire;
use crate::pipeline::health::PipelineHealth;
use crate::pipeline::rate::RateWindow;
use crate::utils::compress::Compressor;
use crate::utils::listeners::ListenerRegistry;

/// Called with the reconstructed buffer after every successful message
pub type BufferListener = Arc<dyn Fn(&Arc<PixelBuffer>) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Uninitialized,
    Ready(Geometry),
}

pub struct FrameReconstructor {
    compressor: Arc<dyn Compressor>,
    max_message_bytes: usize,
    buffer: Mutex<Option<Arc<PixelBuffer>>>,
    listeners: ListenerRegistry<BufferListener>,
    rate: Arc<RateWindow>,
    health: Arc<PipelineHealth>,
}

impl FrameReconstructor {
    pub fn new(
        compressor: Arc<dyn Compressor>,
        max_message_bytes: usize,
        rate: Arc<RateWindow>,
        health: Arc<PipelineHealth>,
    ) -> Self {
        Self {
            compressor,
            max_message_bytes,
            buffer: Mutex::new(None),
            listeners: ListenerRegistry::new("FrameReconstructor"),
            rate,
            health,
        }
    }

    pub fn state(&self) -> ReceiverState {
        match self.buffer.lock().as_ref() {
            Some(buffer) => ReceiverState::Ready(buffer.geometry()),
            None => ReceiverState::Uninitialized,
        }
    }

    /// The current destination buffer, if any message has been accepted
    pub fn buffer(&self) -> Option<Arc<PixelBuffer>> {
        self.buffer.lock().clone()
    }

    pub fn register_listener(&self, id: &str, listener: BufferListener) {
        self.listeners.register(id, listener);
    }

    pub fn unregister_listener(&self, id: &str) -> bool {
        self.listeners.unregister(id)
    }

    /// Drop the buffer and return to `Uninitialized`
    pub fn reset(&self) {
        if self.buffer.lock().take().is_some() {
            info!("FrameReconstructor: reset");
        }
    }

    /// Process one raw transport message.
    ///
    /// Failures are counted and logged here; the returned error is
    /// informational and the state machine is unchanged by it.
    pub fn on_message(&self, raw: &[u8]) -> Result<Arc<PixelBuffer>, ReceiveError> {
        let buffer = match self.reconstruct(raw) {
            Ok(buffer) => buffer,
            Err(e) => {
                match e {
                    ReceiveError::Decompress(_) => self.health.record_decompress_failure(),
                    ReceiveError::Decode(_) => self.health.record_decode_failure(),
                }
                warn!("FrameReconstructor: dropped {} byte message: {}", raw.len(), e);
                return Err(e);
            }
        };

        self.rate.record(raw.len());
        self.health.record_frame(raw.len());

        for listener in self.listeners.snapshot() {
            listener(&buffer);
        }
        Ok(buffer)
    }

    fn reconstruct(&self, raw: &[u8]) -> Result<Arc<PixelBuffer>, ReceiveError> {
        let message = self.compressor.decompress(raw, self.max_message_bytes)?;
        let (geometry, payload) = wire::decode_message(&message)?;

        let mut slot = self.buffer.lock();
        let reusable = slot
            .as_ref()
            .filter(|buffer| buffer.geometry() == geometry)
            .cloned();
        let buffer = match reusable {
            Some(buffer) => buffer,
            None => {
                match slot.as_ref() {
                    Some(old) => info!(
                        "FrameReconstructor: geometry changed {} -> {}, reallocating",
                        old.geometry(),
                        geometry
                    ),
                    None => info!("FrameReconstructor: allocating buffer for {}", geometry),
                }
                let fresh = Arc::new(PixelBuffer::new(geometry));
                *slot = Some(fresh.clone());
                fresh
            }
        };

        buffer.write().copy_from_slice(payload);
        trace!("FrameReconstructor: copied {} bytes ({})", payload.len(), geometry);
        Ok(buffer)
    }
}
