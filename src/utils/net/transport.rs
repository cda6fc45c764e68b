//! Message transport abstraction
//!
//! A transport moves opaque byte messages in order, reliably, with message
//! boundaries preserved. Connection setup is the implementation's business.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("transport is not open")]
    NotOpen,

    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Invoked once per received message
pub type MessageHandler = Arc<dyn Fn(Bytes) + Send + Sync>;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, data: Bytes) -> Result<(), TransportError>;

    /// Install the receive callback, replacing any previous one
    fn on_message(&self, handler: MessageHandler);

    fn is_open(&self) -> bool;

    /// Bytes accepted by `send` but not yet on the wire
    async fn buffered_amount(&self) -> usize {
        0
    }
}
