//! WebRTC data channel transport

mod context;
mod data_channel;

pub use context::{
    DEFAULT_REMOTE_MESSAGE_SIZE, LocalLink, SCTP_RECEIVE_WINDOW, WebRtcContext, remote_max_message_size,
};
pub use data_channel::DataChannelTransport;
