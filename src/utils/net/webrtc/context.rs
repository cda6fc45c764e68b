use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::info;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::{SctpMaxMessageSize, SettingEngine};
use webrtc::api::{API, APIBuilder};
use webrtc::data_channel::RTCDataChannel;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use super::data_channel::DataChannelTransport;
use crate::config::Config;

/// Receive window of a webrtc-rs SCTP association; a larger message never completes
pub const SCTP_RECEIVE_WINDOW: usize = 1024 * 1024;

/// What a peer accepts when its description carries no `max-message-size` (RFC 8841)
pub const DEFAULT_REMOTE_MESSAGE_SIZE: usize = 64 * 1024;

const MAX_MESSAGE_SIZE_ATTR: &str = "a=max-message-size:";

/// Factory for peer connections and data channels.
///
/// Build one per process and hand it to whoever needs a connection.
pub struct WebRtcContext {
    api: API,
    ice_servers: Vec<String>,
    channel_label: String,
    max_message_bytes: usize,
}

/// Two in-process peers joined by one data channel
pub struct LocalLink {
    pub offerer: Arc<RTCPeerConnection>,
    pub answerer: Arc<RTCPeerConnection>,
    pub sender: DataChannelTransport,
    pub receiver: DataChannelTransport,
}

impl LocalLink {
    pub async fn close(&self) {
        self.sender.close().await;
        let _ = self.offerer.close().await;
        let _ = self.answerer.close().await;
    }
}

impl WebRtcContext {
    pub fn new(config: &Config) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .context("Failed to register codecs")?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .context("Failed to register interceptors")?;

        let max_message_bytes = config.max_message_bytes.clamp(1, SCTP_RECEIVE_WINDOW);
        if max_message_bytes < config.max_message_bytes {
            info!(
                "Data channel messages capped at {} bytes by the SCTP receive window",
                max_message_bytes
            );
        }

        let mut setting_engine = SettingEngine::default();
        setting_engine.set_include_loopback_candidate(config.include_loopback_candidates);
        setting_engine.detach_data_channels();
        setting_engine.set_sctp_max_message_size_can_send(SctpMaxMessageSize::Bounded(
            max_message_bytes as u32,
        ));

        let api = APIBuilder::new()
            .with_setting_engine(setting_engine)
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api,
            ice_servers: config.ice_servers.clone(),
            channel_label: config.channel_label.clone(),
            max_message_bytes,
        })
    }

    /// Largest message a channel from this context sends or receives
    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Announce our message limit in a local description before handing it to the peer.
    ///
    /// webrtc-rs leaves `max-message-size` out of its SDP, so without this the
    /// remote side assumes 64 KiB.
    pub fn advertise_max_message_size(
        &self,
        description: RTCSessionDescription,
    ) -> Result<RTCSessionDescription> {
        if description.sdp.contains(MAX_MESSAGE_SIZE_ATTR) {
            return Ok(description);
        }

        let mut sdp = String::with_capacity(description.sdp.len() + 32);
        let mut annotated = false;
        for line in description.sdp.split_inclusive('\n') {
            sdp.push_str(line);
            if !annotated && line.starts_with("a=sctp-port:") {
                sdp.push_str(&format!("{}{}\r\n", MAX_MESSAGE_SIZE_ATTR, self.max_message_bytes));
                annotated = true;
            }
        }
        if !annotated {
            return Ok(description);
        }

        let annotated = match description.sdp_type {
            RTCSdpType::Offer => RTCSessionDescription::offer(sdp)?,
            RTCSdpType::Answer => RTCSessionDescription::answer(sdp)?,
            RTCSdpType::Pranswer => RTCSessionDescription::pranswer(sdp)?,
            _ => return Ok(description),
        };
        Ok(annotated)
    }

    pub async fn create_peer_connection(&self) -> Result<Arc<RTCPeerConnection>> {
        let ice_servers = if self.ice_servers.is_empty() {
            vec![]
        } else {
            vec![RTCIceServer {
                urls: self.ice_servers.clone(),
                ..Default::default()
            }]
        };

        let config = RTCConfiguration {
            ice_servers,
            ..Default::default()
        };

        let peer_connection = self
            .api
            .new_peer_connection(config)
            .await
            .context("Failed to create peer connection")?;
        Ok(Arc::new(peer_connection))
    }

    /// Open the ordered, reliable depth channel on `pc`
    pub async fn create_data_channel(&self, pc: &RTCPeerConnection) -> Result<DataChannelTransport> {
        let init = RTCDataChannelInit {
            ordered: Some(true),
            ..Default::default()
        };
        let channel = pc
            .create_data_channel(&self.channel_label, Some(init))
            .await
            .context("Failed to create data channel")?;
        info!("Data channel '{}' created", self.channel_label);
        Ok(self.wrap(channel))
    }

    /// Adapt a channel announced by the remote peer
    pub fn wrap(&self, channel: Arc<RTCDataChannel>) -> DataChannelTransport {
        DataChannelTransport::new(channel, self.max_message_bytes)
    }

    /// Connect two local peers with a non-trickle offer/answer and wait for the channel
    pub async fn connect_local_pair(&self, timeout: Duration) -> Result<LocalLink> {
        let offerer = self.create_peer_connection().await?;
        let answerer = self.create_peer_connection().await?;

        let sender = self.create_data_channel(&offerer).await?;

        let (dc_tx, mut dc_rx) = mpsc::channel::<Arc<RTCDataChannel>>(1);
        answerer.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
            let dc_tx = dc_tx.clone();
            Box::pin(async move {
                let _ = dc_tx.send(dc).await;
            })
        }));

        let offer = offerer.create_offer(None).await?;
        let offer =
            self.advertise_max_message_size(Self::set_local_and_gather(&offerer, offer).await?)?;
        let offer_limit = remote_max_message_size(&offer);
        answerer.set_remote_description(offer).await?;

        let answer = answerer.create_answer(None).await?;
        let answer =
            self.advertise_max_message_size(Self::set_local_and_gather(&answerer, answer).await?)?;
        sender.limit_message_size(remote_max_message_size(&answer));
        offerer.set_remote_description(answer).await?;

        let remote = tokio::time::timeout(timeout, dc_rx.recv())
            .await
            .context("Timed out waiting for the remote data channel")?
            .ok_or_else(|| anyhow!("Answerer closed before the data channel arrived"))?;
        let receiver = self.wrap(remote);
        receiver.limit_message_size(offer_limit);

        sender.wait_open(timeout).await?;
        receiver.wait_open(timeout).await?;
        info!("Local peer pair connected on '{}'", self.channel_label);

        Ok(LocalLink {
            offerer,
            answerer,
            sender,
            receiver,
        })
    }

    // Block until ICE gathering is complete so one description carries every candidate
    async fn set_local_and_gather(
        pc: &RTCPeerConnection,
        description: RTCSessionDescription,
    ) -> Result<RTCSessionDescription> {
        let mut gather_complete = pc.gathering_complete_promise().await;
        pc.set_local_description(description).await?;
        let _ = gather_complete.recv().await;
        pc.local_description()
            .await
            .ok_or_else(|| anyhow!("No local description after ICE gathering"))
    }
}

/// Largest message the author of `description` accepts
pub fn remote_max_message_size(description: &RTCSessionDescription) -> usize {
    let advertised = description
        .sdp
        .lines()
        .find_map(|line| line.trim().strip_prefix(MAX_MESSAGE_SIZE_ATTR))
        .and_then(|value| value.trim().parse::<usize>().ok());
    match advertised {
        // zero means the peer sets no limit
        Some(0) => usize::MAX,
        Some(size) => size,
        None => DEFAULT_REMOTE_MESSAGE_SIZE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::{CaptureFrame, Geometry, PixelFormat, Timestamp};
    use crate::capture::pixel_buffer::PixelBuffer;
    use crate::encoder::DepthEncoder;
    use crate::utils::compress::Compression;
    use crate::utils::net::transport::{Transport, TransportError};
    use bytes::Bytes;
    use half::f16;

    fn offline_config() -> Config {
        Config {
            ice_servers: vec![],
            ..Config::default()
        }
    }

    fn local_config() -> Config {
        Config {
            include_loopback_candidates: true,
            ..offline_config()
        }
    }

    fn collect(transport: &DataChannelTransport) -> mpsc::UnboundedReceiver<Bytes> {
        let (tx, rx) = mpsc::unbounded_channel();
        transport.on_message(Arc::new(move |msg: Bytes| {
            let _ = tx.send(msg);
        }));
        rx
    }

    // 256x192 half-float depth between 0.5 and 8 m with random noise in every sample, deflated
    fn noisy_depth_message() -> Bytes {
        let geometry = Geometry::packed(256, 192, PixelFormat::DepthFloat16);
        let mut seed = 0x2545_f491_u32;
        let mut data = Vec::with_capacity(geometry.payload_len());
        for _ in 0..(256 * 192) {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let depth = f16::from_bits(0x3800 | (seed & 0x0fff) as u16);
            data.extend_from_slice(&depth.to_le_bytes());
        }
        let frame = CaptureFrame::new(
            PixelBuffer::from_vec(geometry, data).unwrap(),
            Timestamp::from_nanos(1),
        );
        DepthEncoder::new(Arc::new(Compression::default()))
            .encode(&frame)
            .unwrap()
            .data
    }

    #[tokio::test]
    async fn test_unconnected_channel_is_not_open() {
        let context = WebRtcContext::new(&offline_config()).unwrap();
        let pc = context.create_peer_connection().await.unwrap();
        let transport = context.create_data_channel(&pc).await.unwrap();

        assert_eq!(transport.label(), Config::default().channel_label);
        assert!(!transport.is_open());
        assert_eq!(
            transport.send(Bytes::from_static(b"depth")).await,
            Err(TransportError::NotOpen)
        );
        assert_eq!(
            transport.wait_open(Duration::from_millis(20)).await,
            Err(TransportError::NotOpen)
        );

        pc.close().await.unwrap();
    }

    #[test]
    fn test_message_limit_capped_by_receive_window() {
        let context = WebRtcContext::new(&offline_config()).unwrap();
        assert_eq!(context.max_message_bytes(), SCTP_RECEIVE_WINDOW);

        let small = Config {
            max_message_bytes: 1000,
            ..offline_config()
        };
        assert_eq!(WebRtcContext::new(&small).unwrap().max_message_bytes(), 1000);
    }

    #[tokio::test]
    async fn test_advertise_max_message_size() {
        let context = WebRtcContext::new(&offline_config()).unwrap();
        let pc = context.create_peer_connection().await.unwrap();
        let _channel = context.create_data_channel(&pc).await.unwrap();
        let offer = pc.create_offer(None).await.unwrap();

        assert_eq!(remote_max_message_size(&offer), DEFAULT_REMOTE_MESSAGE_SIZE);

        let annotated = context.advertise_max_message_size(offer).unwrap();
        assert_eq!(annotated.sdp_type, RTCSdpType::Offer);
        assert_eq!(remote_max_message_size(&annotated), SCTP_RECEIVE_WINDOW);
        assert_eq!(annotated.sdp.matches(MAX_MESSAGE_SIZE_ATTR).count(), 1);

        // annotating twice leaves a single attribute
        let again = context.advertise_max_message_size(annotated).unwrap();
        assert_eq!(again.sdp.matches(MAX_MESSAGE_SIZE_ATTR).count(), 1);

        pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_local_pair_delivers_and_enforces_limit() {
        let config = Config {
            max_message_bytes: 1000,
            ..local_config()
        };
        let context = WebRtcContext::new(&config).unwrap();
        let link = context
            .connect_local_pair(Duration::from_secs(10))
            .await
            .unwrap();
        assert!(link.sender.is_open());
        assert!(link.receiver.is_open());
        link.sender.wait_open(Duration::from_millis(1)).await.unwrap();
        assert_eq!(link.sender.max_message_bytes(), 1000);

        let mut received = collect(&link.receiver);
        link.sender.send(Bytes::from(vec![7u8; 900])).await.unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(5), received.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.len(), 900);
        assert!(msg.iter().all(|b| *b == 7));

        let result = link.sender.send(Bytes::from(vec![7u8; 1001])).await;
        assert!(matches!(result, Err(TransportError::SendFailed(_))));

        link.close().await;
    }

    #[tokio::test]
    async fn test_local_pair_carries_full_depth_frame() {
        let message = noisy_depth_message();
        assert!(message.len() > DEFAULT_REMOTE_MESSAGE_SIZE);

        let context = WebRtcContext::new(&local_config()).unwrap();
        let link = context
            .connect_local_pair(Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(link.sender.max_message_bytes(), SCTP_RECEIVE_WINDOW);

        let mut received = collect(&link.receiver);
        link.sender.send(message.clone()).await.unwrap();
        let msg = tokio::time::timeout(Duration::from_secs(10), received.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg, message);

        link.close().await;
    }
}
