//! RTSP/1.0 wire protocol support: interleaved-frame/message codec,
//! Digest authentication, UDP transport, SDP parsing, and a pull client
//! built on top of them.

pub mod client;
pub mod codec;
pub mod constants;
pub mod digest;
pub mod sdp;
pub mod transport;

pub use client::{ClientConfig, ClientTransport, RtspClient, connect};
pub use codec::Frame;
pub use digest::{AuthorizationHeader, Challenge, ServerChallenge};
pub use sdp::{MediaDescriptor, SessionDescriptor};
pub use transport::{SessionUdpTransport, SocketBufSizes, UdpPair};
