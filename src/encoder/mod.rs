//! Depth frame encoding: wire serialization followed by compression

pub mod wire;

use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;

use crate::capture::frame::{CaptureFrame, Geometry, Timestamp};
use crate::utils::compress::{CompressError, Compressor};

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("source pixel buffer is not readable")]
    SourceUnavailable,

    #[error("{field} {value} does not fit the wire header")]
    GeometryOverflow { field: &'static str, value: u32 },

    #[error(transparent)]
    Compress(#[from] CompressError),
}

/// A compressed message ready for the transport
#[derive(Clone)]
pub struct WireFrame {
    pub data: Bytes,
    pub geometry: Geometry,
    pub capture_time: Timestamp,
    /// Size before compression
    pub raw_len: usize,
}

impl WireFrame {
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn compression_ratio(&self) -> f64 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.raw_len as f64 / self.data.len() as f64
    }
}

impl std::fmt::Debug for WireFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireFrame")
            .field("geometry", &self.geometry)
            .field("capture_time", &self.capture_time)
            .field("raw_len", &self.raw_len)
            .field("size", &self.size())
            .finish()
    }
}

pub struct DepthEncoder {
    compressor: Arc<dyn Compressor>,
}

impl DepthEncoder {
    pub fn new(compressor: Arc<dyn Compressor>) -> Self {
        Self { compressor }
    }

    pub fn compressor_name(&self) -> &'static str {
        self.compressor.name()
    }

    pub fn encode(&self, frame: &CaptureFrame) -> Result<WireFrame, EncodeError> {
        let message = wire::encode_frame(frame)?;
        let compressed = self.compressor.compress(&message)?;
        Ok(WireFrame {
            data: Bytes::from(compressed),
            geometry: frame.geometry(),
            capture_time: frame.capture_time,
            raw_len: message.len(),
        })
    }
}
