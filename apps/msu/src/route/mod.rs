use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod channel;
pub mod health;

/// `/api/v1` control plane (§6) plus the ambient `/healthz`/`/metrics`
/// surfaces every teacher service carries (§9b).
pub fn route() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", admin::route().merge(channel::route()))
        .merge(health::route())
}
