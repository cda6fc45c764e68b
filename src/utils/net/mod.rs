pub mod loopback;
pub mod transport;
pub mod webrtc;

pub use loopback::LoopbackTransport;
pub use transport::{MessageHandler, Transport, TransportError};
