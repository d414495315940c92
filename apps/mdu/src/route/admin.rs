//! `/api/v1/restart`, `/api/v1/pushers`, `/api/v1/players` (§6).

use axum::Router;
use axum::extract::State;
use axum::routing::get;
use axum::Json;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::state::AppState;

pub fn route() -> Router<AppState> {
    Router::new()
        .route("/restart", get(restart))
        .route("/pushers", get(pushers))
        .route("/players", get(players))
}

#[derive(Debug, Serialize)]
struct PusherInfo {
    id: String,
    path: String,
    source: &'static str,
    player_count: usize,
}

#[derive(Debug, Serialize)]
struct PlayerInfo {
    id: String,
    pusher_id: String,
    path: String,
}

/// Reloads the config file from disk and notifies every subscriber of
/// the new snapshot (§6 "Triggers config reload + full restart"). The
/// log level rewires itself through the `ConfigHandle::subscribe()`
/// watcher spawned in `main` (§9b "Config reload callbacks"); the
/// RTSP/HTTP listen addresses are not hot-swapped.
async fn restart(State(state): State<AppState>) -> Result<&'static str> {
    state.config.reload()?;
    info!("config reloaded via /restart");
    Ok("ok")
}

async fn pushers(State(state): State<AppState>) -> Json<Vec<PusherInfo>> {
    let mut out = Vec::new();
    for pusher in state.server.list_pushers().await {
        out.push(PusherInfo {
            id: pusher.id.0.to_string(),
            path: pusher.path.clone(),
            source: match pusher.source {
                streamhub::PusherSource::ClientPull => "client-pull",
                streamhub::PusherSource::ServerPush => "server-push",
            },
            player_count: pusher.player_count().await,
        });
    }
    Json(out)
}

async fn players(State(state): State<AppState>) -> Json<Vec<PlayerInfo>> {
    let mut out = Vec::new();
    for pusher in state.server.list_pushers().await {
        for player_id in pusher.player_ids().await {
            out.push(PlayerInfo {
                id: player_id.0.to_string(),
                pusher_id: pusher.id.0.to_string(),
                path: pusher.path.clone(),
            });
        }
    }
    Json(out)
}
