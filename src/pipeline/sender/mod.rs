//! Sender pipeline components
//!
//! This module contains the sender-side pipeline stages:
//! - EncodeStage: wire serialization + compression of the depth frame
//! - TransmitStage: back-pressure check and transport send
//!
//! The sender pipeline flow:
//! ```text
//! Synchronizer → Encode → Transmit → Network
//! ```

pub mod coordinator;
pub mod encode_stage;
pub mod transmit_stage;

pub use coordinator::{SENDER_LISTENER_ID, SenderCoordinator};
pub use encode_stage::EncodeStage;
pub use transmit_stage::TransmitStage;
