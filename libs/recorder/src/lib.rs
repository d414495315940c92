//! Recording Channel (C10, §4.7): per-channel supervision of an external
//! segmenter process plus the mover and deleter background tasks that
//! turn its `.tmp/` output into a retained, date-partitioned archive.

pub mod channel;
pub mod config;
pub mod deleter;
pub mod error;
pub mod mover;
pub mod segmenter;
pub mod template;

pub use channel::Channel;
pub use config::{ChannelConfig, FfmpegConfig, StorageDefaults};
pub use error::ChannelError;
