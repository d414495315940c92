use std::sync::Arc;

/// Typed state errors, distinguishable from the `anyhow::Error` a `Runner`
/// returns from `do_start`/`do_run`/`do_close`. Mirrors the Go source's
/// `StateError` with one type id per offending transition.
#[derive(Debug, thiserror::Error, Clone)]
pub enum LifecycleError {
    #[error("runner {0} has been closed")]
    Closed(String),
    #[error("runner {0} is running")]
    Running(String),
    #[error("runner {0} is restarting")]
    Restarting(String),
    #[error("runner {0} failed to start: {1}")]
    Start(String, Arc<anyhow::Error>),
    #[error("runner {0} failed to close: {1}")]
    Close(String, Arc<anyhow::Error>),
}

impl LifecycleError {
    pub fn closed(name: impl Into<String>) -> Self {
        Self::Closed(name.into())
    }

    pub fn running(name: impl Into<String>) -> Self {
        Self::Running(name.into())
    }

    pub fn restarting(name: impl Into<String>) -> Self {
        Self::Restarting(name.into())
    }

    /// True for the three state-conflict variants; false for start/close
    /// failures that wrap a runner's own error.
    pub fn is_state_error(&self) -> bool {
        matches!(self, Self::Closed(_) | Self::Running(_) | Self::Restarting(_))
    }
}
