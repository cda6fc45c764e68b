//! Receiver pipeline components
//!
//! This module contains the receiver-side pipeline stages:
//! - ReceiveStage: transport callback into a bounded queue
//! - DecodeStage: decompression, validation and buffer reconstruction
//!
//! The receiver pipeline flow:
//! ```text
//! Network → Receive → Decode → PixelBuffer listeners
//! ```

pub mod coordinator;
pub mod decode_stage;
pub mod receive_stage;

pub use coordinator::ReceiverCoordinator;
pub use decode_stage::DecodeStage;
pub use receive_stage::ReceiveStage;
