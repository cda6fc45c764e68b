use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;
use tokio::sync::watch;
use webrtc::data::data_channel::DataChannel;
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;

use crate::utils::net::transport::{MessageHandler, Transport, TransportError};

/// [`Transport`] over a WebRTC data channel
///
/// When the API detaches data channels, incoming messages are read straight
/// off the SCTP stream into a buffer of `max_message_bytes`. Otherwise the
/// channel's own callback delivers them, which truncates at 64 KiB.
#[derive(Clone)]
pub struct DataChannelTransport {
    channel: Arc<RTCDataChannel>,
    max_message_bytes: Arc<AtomicUsize>,
    handler: Arc<Mutex<Option<MessageHandler>>>,
    opened: watch::Receiver<bool>,
}

impl DataChannelTransport {
    pub fn new(channel: Arc<RTCDataChannel>, max_message_bytes: usize) -> Self {
        let (open_tx, opened) =
            watch::channel(channel.ready_state() == RTCDataChannelState::Open);
        let handler: Arc<Mutex<Option<MessageHandler>>> = Arc::new(Mutex::new(None));
        let buffer_len = max_message_bytes;
        let max_message_bytes = Arc::new(AtomicUsize::new(max_message_bytes));

        let slot = handler.clone();
        channel.on_message(Box::new(move |msg: DataChannelMessage| {
            let current = slot.lock().clone();
            if let Some(handler) = current {
                handler(msg.data);
            }
            Box::pin(async {})
        }));

        let weak: Weak<RTCDataChannel> = Arc::downgrade(&channel);
        let slot = handler.clone();
        channel.on_open(Box::new(move || {
            Box::pin(async move {
                let Some(channel) = weak.upgrade() else {
                    return;
                };
                match channel.detach().await {
                    Ok(raw) => {
                        let label = channel.label().to_string();
                        tokio::spawn(read_loop(raw, label, buffer_len, slot));
                    }
                    Err(e) => debug!("DataChannel '{}' not detached: {}", channel.label(), e),
                }
                info!("DataChannel '{}' open", channel.label());
                let _ = open_tx.send(true);
            })
        }));

        let label = channel.label().to_string();
        channel.on_close(Box::new(move || {
            info!("DataChannel '{}' closed", label);
            Box::pin(async {})
        }));

        Self {
            channel,
            max_message_bytes,
            handler,
            opened,
        }
    }

    pub fn label(&self) -> &str {
        self.channel.label()
    }

    pub fn channel(&self) -> &Arc<RTCDataChannel> {
        &self.channel
    }

    /// Largest message `send` accepts
    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes.load(Ordering::Relaxed)
    }

    /// Lower the send limit to what the remote peer accepts
    pub fn limit_message_size(&self, remote_max: usize) {
        let previous = self.max_message_bytes.fetch_min(remote_max, Ordering::Relaxed);
        if remote_max < previous {
            info!(
                "DataChannel '{}' message limit lowered to {} bytes by the remote peer",
                self.label(),
                remote_max
            );
        }
    }

    /// Wait until the channel opens, up to `timeout`
    pub async fn wait_open(&self, timeout: Duration) -> Result<(), TransportError> {
        let mut opened = self.opened.clone();
        if *opened.borrow() {
            return Ok(());
        }
        let signalled = tokio::time::timeout(timeout, opened.wait_for(|open| *open))
            .await
            .is_ok_and(|changed| changed.is_ok());
        if signalled {
            Ok(())
        } else {
            Err(TransportError::NotOpen)
        }
    }

    pub async fn close(&self) {
        if let Err(e) = self.channel.close().await {
            debug!("DataChannel '{}' close error: {}", self.label(), e);
        }
    }
}

async fn read_loop(
    channel: Arc<DataChannel>,
    label: String,
    buffer_len: usize,
    handler: Arc<Mutex<Option<MessageHandler>>>,
) {
    let mut buffer = vec![0u8; buffer_len.max(1)];
    loop {
        match channel.read_data_channel(&mut buffer).await {
            Ok((0, _)) => break,
            Ok((n, _)) => {
                let current = handler.lock().clone();
                if let Some(handler) = current {
                    handler(Bytes::copy_from_slice(&buffer[..n]));
                }
            }
            Err(e) => {
                warn!("DataChannel '{}' read failed: {}", label, e);
                break;
            }
        }
    }
    debug!("DataChannel '{}' read loop finished", label);
}

#[async_trait]
impl Transport for DataChannelTransport {
    async fn send(&self, data: Bytes) -> Result<(), TransportError> {
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        let limit = self.max_message_bytes();
        if data.len() > limit {
            return Err(TransportError::SendFailed(format!(
                "message of {} bytes exceeds the {} byte limit",
                data.len(),
                limit
            )));
        }
        self.channel
            .send(&data)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn on_message(&self, handler: MessageHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn is_open(&self) -> bool {
        self.channel.ready_state() == RTCDataChannelState::Open
    }

    async fn buffered_amount(&self) -> usize {
        self.channel.buffered_amount().await
    }
}
