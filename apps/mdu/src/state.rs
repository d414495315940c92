use std::sync::Arc;

use mdu_msu_config::ConfigHandle;
use mdu_msu_config::mdu::Config;
use streamhub::Server;

use crate::puller::PullerRegistry;

/// Shared state handed to every axum handler (§9 "Global singletons"):
/// the hot-reloadable config handle, the RTSP fan-out server (pusher
/// registry), and the registry of client-pull pushers this process
/// started itself.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigHandle<Config>>,
    pub server: Server,
    pub pullers: PullerRegistry,
}
