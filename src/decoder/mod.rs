//! Receiver side: message validation and pixel buffer reconstruction

pub mod reconstruct;

use thiserror::Error;

use crate::utils::compress::DecompressError;

pub use reconstruct::{BufferListener, FrameReconstructor, ReceiverState};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("message too short for header ({actual} of 16 bytes)")]
    TruncatedHeader { actual: usize },

    #[error("payload is {actual} bytes, header describes {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("negative {field} in header: {value}")]
    InvalidGeometry { field: &'static str, value: i32 },
}

/// Why an incoming message was dropped
#[derive(Debug, Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Decompress(#[from] DecompressError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}
