//! In-process transport pair
//!
//! Two endpoints joined by bounded tokio channels, one per direction. Each
//! message is one channel item, so framing and ordering carry over as-is.
//! A full channel makes `send` wait, the same as a congested data channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::transport::{MessageHandler, Transport, TransportError};

pub struct LoopbackTransport {
    name: &'static str,
    tx: mpsc::Sender<Bytes>,
    rx: Mutex<Option<mpsc::Receiver<Bytes>>>,
    handler: Arc<Mutex<Option<MessageHandler>>>,
    open: Arc<AtomicBool>,
    /// Bytes sent by us and not yet delivered to the peer
    outgoing: Arc<AtomicUsize>,
    /// Bytes sent by the peer and not yet delivered to us
    incoming: Arc<AtomicUsize>,
}

impl LoopbackTransport {
    /// Create two connected endpoints, each direction holding up to `capacity` messages
    pub fn pair(capacity: usize) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::channel(capacity.max(1));
        let (b_tx, a_rx) = mpsc::channel(capacity.max(1));
        let open = Arc::new(AtomicBool::new(true));
        let a_to_b = Arc::new(AtomicUsize::new(0));
        let b_to_a = Arc::new(AtomicUsize::new(0));

        let a = Self {
            name: "loopback-a",
            tx: a_tx,
            rx: Mutex::new(Some(a_rx)),
            handler: Arc::new(Mutex::new(None)),
            open: open.clone(),
            outgoing: a_to_b.clone(),
            incoming: b_to_a.clone(),
        };
        let b = Self {
            name: "loopback-b",
            tx: b_tx,
            rx: Mutex::new(Some(b_rx)),
            handler: Arc::new(Mutex::new(None)),
            open,
            outgoing: b_to_a,
            incoming: a_to_b,
        };
        (a, b)
    }

    /// Close both endpoints
    pub fn close(&self) {
        if self.open.swap(false, Ordering::Relaxed) {
            info!("LoopbackTransport: {} closed", self.name);
        }
    }

    /// Start delivering queued messages to the handler; needs a tokio runtime
    fn start_delivery(&self) {
        let Some(mut rx) = self.rx.lock().take() else {
            return;
        };
        let handler = self.handler.clone();
        let incoming = self.incoming.clone();
        let name = self.name;

        tokio::spawn(async move {
            let mut delivered = 0u64;
            while let Some(message) = rx.recv().await {
                incoming.fetch_sub(message.len(), Ordering::Relaxed);
                let current = handler.lock().clone();
                if let Some(handler) = current {
                    handler(message);
                    delivered += 1;
                }
            }
            debug!("LoopbackTransport: {} delivery ended ({} messages)", name, delivered);
        });
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        let len = data.len();
        self.outgoing.fetch_add(len, Ordering::Relaxed);
        if self.tx.send(data).await.is_err() {
            self.outgoing.fetch_sub(len, Ordering::Relaxed);
            return Err(TransportError::SendFailed(format!(
                "{}: peer endpoint dropped",
                self.name
            )));
        }
        Ok(())
    }

    fn on_message(&self, handler: MessageHandler) {
        *self.handler.lock() = Some(handler);
        self.start_delivery();
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Relaxed)
    }

    async fn buffered_amount(&self) -> usize {
        self.outgoing.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_messages_arrive_in_order() {
        let (a, b) = LoopbackTransport::pair(8);
        let (tx, mut rx) = mpsc::unbounded_channel();
        b.on_message(Arc::new(move |msg: Bytes| {
            let _ = tx.send(msg);
        }));

        for i in 0..5u8 {
            a.send(Bytes::from(vec![i; i as usize + 1])).await.unwrap();
        }
        for i in 0..5u8 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.len(), i as usize + 1);
            assert!(msg.iter().all(|b| *b == i));
        }
    }

    #[tokio::test]
    async fn test_buffered_until_handler_installed() {
        let (a, b) = LoopbackTransport::pair(4);
        a.send(Bytes::from_static(b"hello")).await.unwrap();
        assert_eq!(a.buffered_amount().await, 5);

        let (tx, mut rx) = mpsc::unbounded_channel();
        b.on_message(Arc::new(move |msg: Bytes| {
            let _ = tx.send(msg);
        }));
        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(a.buffered_amount().await, 0);
    }

    #[tokio::test]
    async fn test_closed_transport() {
        let (a, b) = LoopbackTransport::pair(4);
        b.close();
        assert!(!a.is_open());
        assert_eq!(
            a.send(Bytes::from_static(b"x")).await,
            Err(TransportError::NotOpen)
        );
    }

    #[tokio::test]
    async fn test_dropped_peer() {
        let (a, b) = LoopbackTransport::pair(4);
        drop(b);
        let result = tokio::time::timeout(Duration::from_secs(1), a.send(Bytes::from_static(b"x")))
            .await
            .unwrap();
        assert!(matches!(result, Err(TransportError::SendFailed(_))));
    }
}
