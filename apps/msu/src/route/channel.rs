//! `/api/v1/channel/{start,stop}` and `/api/v1/channel/` (§6), the
//! recording-channel lifecycle surface.

use std::collections::HashMap;

use axum::Router;
use axum::extract::{Query, State};
use axum::routing::{delete, get, post};
use axum::Json;
use recorder::{Channel, ChannelConfig};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::state::AppState;

pub fn route() -> Router<AppState> {
    Router::new()
        .route("/channel/start", post(start))
        .route("/channel/", get(describe))
        .route("/channel/stop", delete(stop))
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    name: String,
    url: String,
    #[serde(default = "default_transport")]
    transport: String,
    /// Retention window in minutes; defaults to the process-wide
    /// `storage.default_cover_minutes` when omitted (GLOSSARY "Cover").
    cover: Option<u64>,
    #[serde(default)]
    fields: HashMap<String, String>,
}

fn default_transport() -> String {
    "tcp".to_string()
}

#[derive(Debug, Serialize)]
struct StartResponse {
    uuid: Uuid,
}

async fn start(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>> {
    let cfg = state.config.current();
    let cover_minutes = req.cover.unwrap_or(cfg.storage.default_cover_minutes);

    let channel_config = ChannelConfig::new(
        req.name,
        req.url,
        req.transport,
        cover_minutes,
        req.fields,
        cfg.storage.to_recorder_defaults(),
    )
    .map_err(AppError::channel)?;

    let channel = Channel::new(channel_config);
    channel.start().await.map_err(AppError::channel)?;

    let uuid = channel.uuid;
    state.channels.write().await.insert(uuid, channel);
    info!(channel = %uuid, "channel started");

    Ok(Json(StartResponse { uuid }))
}

#[derive(Debug, Deserialize)]
struct ChannelQuery {
    uuid: Uuid,
}

#[derive(Debug, Serialize)]
struct ChannelInfo {
    uuid: Uuid,
    name: String,
    url: String,
    transport: String,
    cover_minutes: u64,
    state: String,
}

async fn describe(
    State(state): State<AppState>,
    Query(q): Query<ChannelQuery>,
) -> Result<Json<ChannelInfo>> {
    let channels = state.channels.read().await;
    let channel = channels
        .get(&q.uuid)
        .ok_or_else(|| AppError::channel_not_found(q.uuid))?;

    Ok(Json(ChannelInfo {
        uuid: channel.uuid,
        name: channel.name().to_string(),
        url: channel.url().to_string(),
        transport: channel.transport().to_string(),
        cover_minutes: channel.cover_minutes(),
        state: state_label(channel.state().await),
    }))
}

fn state_label(state: lifecycle::State) -> String {
    if state.is_closing() {
        "closing".to_string()
    } else if state.is_running() {
        "running".to_string()
    } else {
        "closed".to_string()
    }
}

async fn stop(State(state): State<AppState>, Query(q): Query<ChannelQuery>) -> Result<&'static str> {
    let channel = {
        let mut channels = state.channels.write().await;
        channels
            .remove(&q.uuid)
            .ok_or_else(|| AppError::channel_not_found(q.uuid))?
    };

    channel.destroy().await.map_err(AppError::channel)?;
    info!(channel = %q.uuid, "channel stopped");
    Ok("ok")
}
