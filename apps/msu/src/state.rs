use std::collections::HashMap;
use std::sync::Arc;

use mdu_msu_config::ConfigHandle;
use mdu_msu_config::msu::Config;
use recorder::Channel;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Shared state handed to every axum handler (§9 "Global singletons").
/// Channels are keyed by UUID only -- the resolved "channel name
/// uniqueness" Open Question (§9, SPEC_FULL.md §9): `name` is a display/
/// templating field, not a lookup key.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ConfigHandle<Config>>,
    pub channels: Arc<RwLock<HashMap<Uuid, Arc<Channel>>>>,
}

impl AppState {
    pub fn new(config: Arc<ConfigHandle<Config>>) -> Self {
        Self {
            config,
            channels: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
