//! Server-side RTSP fan-out: per-connection session state machine (C6),
//! the Pusher/Player multiplexer (C7/C8), and the path-keyed registry
//! plus accept loop tying them together (C9).

pub mod player;
pub mod pusher;
pub mod server;
pub mod session;

pub use player::{PacketSink, Player, PlayerConfig, PlayerId};
pub use pusher::{Pusher, PusherId, PusherSource};
pub use server::{Server, ServerConfig};
pub use session::{Session, SessionConfig};
