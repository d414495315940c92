//! Typed state errors (§7 "State"), distinguishable from the `anyhow`
//! I/O errors the channel's background tasks log and recover from on
//! their own. Mapped to stable codes by the control-plane layer in
//! `apps/msu`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel {0} is running")]
    Running(String),
    #[error("channel {0} is restarting")]
    Restarting(String),
    #[error("channel {0} has been closed")]
    Closed(String),
    #[error("channel {0} has been destroyed")]
    Destroyed(String),
    #[error("invalid channel name: {0}")]
    InvalidName(String),
    #[error("invalid channel url: {0}")]
    InvalidUrl(String),
    #[error("channel {0} failed to start: {1}")]
    Start(String, String),
    #[error("channel {0} failed to close: {1}")]
    Close(String, String),
}

impl ChannelError {
    /// Translate a [`lifecycle::LifecycleError`] into the channel's own
    /// vocabulary, mirroring the original's `Start`/`Close` wrappers that
    /// convert `lifecycle.StateError` into `ChannelIsRunningError` /
    /// `ChannelRestartingError` / `ChannelClosedError`.
    pub fn from_lifecycle(name: &str, err: lifecycle::LifecycleError) -> Self {
        match err {
            lifecycle::LifecycleError::Running(_) => Self::Running(name.to_string()),
            lifecycle::LifecycleError::Restarting(_) => Self::Restarting(name.to_string()),
            lifecycle::LifecycleError::Closed(_) => Self::Closed(name.to_string()),
            lifecycle::LifecycleError::Start(_, e) => Self::Start(name.to_string(), e.to_string()),
            lifecycle::LifecycleError::Close(_, e) => Self::Close(name.to_string(), e.to_string()),
        }
    }
}
