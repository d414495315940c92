//! `/api/v1/stream/start`, `/api/v1/stream/stop` (§6).

use std::time::Duration;

use axum::Router;
use axum::extract::{Query, State};
use axum::routing::get;
use axum::Json;
use serde::{Deserialize, Serialize};
use url::Url;

use rtsp::ClientTransport;
use streamhub::PusherId;

use crate::error::{AppError, Result};
use crate::puller::StartPullRequest;
use crate::state::AppState;

pub fn route() -> Router<AppState> {
    Router::new()
        .route("/stream/start", get(start))
        .route("/stream/stop", get(stop))
}

#[derive(Debug, Deserialize)]
struct StartQuery {
    url: String,
    #[serde(rename = "customPath")]
    custom_path: Option<String>,
    #[serde(rename = "transType")]
    trans_type: Option<String>,
    #[serde(rename = "idleTimeout")]
    idle_timeout: Option<u64>,
    #[serde(rename = "heartbeatInterval")]
    heartbeat_interval: Option<u64>,
}

#[derive(Debug, Serialize)]
struct StartResponse {
    id: String,
}

async fn start(State(state): State<AppState>, Query(q): Query<StartQuery>) -> Result<Json<StartResponse>> {
    let url = Url::parse(&q.url).map_err(|e| AppError::bad_request(format!("invalid url: {e}")))?;
    let credentials = if url.username().is_empty() {
        None
    } else {
        Some((url.username().to_string(), url.password().unwrap_or("").to_string()))
    };
    let transport = match q.trans_type.as_deref() {
        Some("UDP") | Some("udp") => ClientTransport::Udp,
        _ => ClientTransport::TcpInterleaved,
    };

    let req = StartPullRequest {
        url,
        custom_path: q.custom_path,
        transport,
        idle_timeout: q.idle_timeout.map(Duration::from_secs),
        heartbeat_interval: q.heartbeat_interval.map(Duration::from_millis),
    };

    let id = state
        .pullers
        .start(&state.server, credentials, &state.config.current().rtsp, req)
        .await
        .map_err(AppError::from)?;
    Ok(Json(StartResponse { id: id.0.to_string() }))
}

#[derive(Debug, Deserialize)]
struct StopQuery {
    id: String,
}

async fn stop(State(state): State<AppState>, Query(q): Query<StopQuery>) -> Result<&'static str> {
    let uuid = uuid::Uuid::parse_str(&q.id).map_err(|e| AppError::bad_request(format!("invalid id: {e}")))?;
    state
        .pullers
        .stop(&state.server, PusherId(uuid))
        .await
        .map_err(|e| AppError::pusher_not_found(e))?;
    Ok("ok")
}
