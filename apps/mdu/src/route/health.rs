//! Ambient `/healthz` and `/metrics` routes (§9b): present in spirit on
//! every teacher service, not named by the distilled spec's HTTP table
//! since it only lists domain-specific routes.

use axum::Router;
use axum::extract::State;
use axum::routing::get;

use crate::metrics;
use crate::state::AppState;

pub fn route() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
}

async fn healthz() -> &'static str {
    "ok"
}

/// Refresh the pusher/player gauges from the live registry before
/// encoding, rather than incrementing/decrementing them at every
/// mutation site scattered across the puller and session code.
async fn metrics_handler(State(state): State<AppState>) -> String {
    let pushers = state.server.list_pushers().await;
    metrics::PUSHERS.set(pushers.len() as f64);
    let mut player_count = 0usize;
    for pusher in &pushers {
        player_count += pusher.player_count().await;
    }
    metrics::PLAYERS.set(player_count as f64);
    metrics::encode()
}
