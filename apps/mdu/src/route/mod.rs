use axum::Router;

use crate::state::AppState;

pub mod admin;
pub mod health;
pub mod stream;

/// `/api/v1` control plane (§6) plus the ambient `/healthz`/`/metrics`
/// surfaces every teacher service carries (§9b).
pub fn route() -> Router<AppState> {
    Router::new()
        .nest("/api/v1", admin::route().merge(stream::route()))
        .merge(health::route())
}
