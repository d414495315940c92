//! Ambient `/healthz` and `/metrics` routes (§9b).

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

/// Refresh the channel gauge from the live registry before encoding,
/// rather than incrementing/decrementing it at every start/stop site.
async fn metrics_handler(State(state): State<AppState>) -> String {
    let count = state.channels.read().await.len();
    metrics::CHANNELS.set(count as f64);
    metrics::encode()
}
