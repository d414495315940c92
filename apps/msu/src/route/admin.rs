//! `/api/v1/sys/restart` (§6).

use axum::Router;
use axum::extract::State;
use axum::routing::post;
use tracing::info;

use crate::error::Result;
use crate::state::AppState;

pub fn route() -> Router<AppState> {
    Router::new().route("/sys/restart", post(restart))
}

/// Reloads the config file from disk and notifies every subscriber of
/// the new snapshot (§6 "Reload + restart"). As in `apps/mdu`, the log
/// level rewires itself through the `ConfigHandle::subscribe()` watcher
/// spawned in `main` (§9b); the listening sockets themselves are not
/// hot-swapped.
async fn restart(State(state): State<AppState>) -> Result<&'static str> {
    state.config.reload()?;
    info!("config reloaded via /sys/restart");
    Ok("ok")
}
