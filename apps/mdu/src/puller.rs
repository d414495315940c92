//! Client-pull orchestration for the `/stream/start` / `/stream/stop`
//! control-plane routes (§6): dials an upstream with [`rtsp::connect`],
//! wires its demuxed packets into a freshly registered [`streamhub::Pusher`],
//! and tracks the pair so `/stream/stop` can tear both down by pusher id.
//!
//! Grounded in shape (background task registry keyed by a handle, one
//! entry removed on stop) on `liveman/src/puller.rs`'s recording-session
//! puller, even though that puller pulls HTTP, not RTSP -- the registry
//! idiom is what's borrowed, not the protocol.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use url::Url;

use rtsp::{ClientConfig, ClientTransport, RtspClient};
use streamhub::{Pusher, PusherId, PusherSource, Server};

/// Parameters accepted by `/stream/start` (§6).
pub struct StartPullRequest {
    pub url: Url,
    pub custom_path: Option<String>,
    pub transport: ClientTransport,
    pub idle_timeout: Option<Duration>,
    pub heartbeat_interval: Option<Duration>,
}

struct Puller {
    pusher: Arc<Pusher>,
    client: RtspClient,
}

/// Live client-pull pushers, keyed by pusher id so `/stream/stop?id=`
/// can find the matching [`RtspClient`] to stop alongside deregistering
/// the pusher (§6).
#[derive(Clone, Default)]
pub struct PullerRegistry {
    pullers: Arc<Mutex<HashMap<PusherId, Puller>>>,
}

impl PullerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dial `req.url`, register the resulting pusher under its path, and
    /// track the pull so it can be stopped later. Returns the new
    /// pusher's id (§6 "Starts pull; returns pusher id").
    pub async fn start(
        &self,
        server: &Server,
        credentials: Option<(String, String)>,
        rtsp_cfg: &mdu_msu_config::mdu::Rtsp,
        req: StartPullRequest,
    ) -> Result<PusherId> {
        let path = req
            .custom_path
            .unwrap_or_else(|| req.url.path().to_string());

        let mut config = ClientConfig::new(req.url.clone(), req.transport);
        if let Some(timeout) = req.idle_timeout {
            config.timeout = timeout;
        }
        config.option_interval = req.heartbeat_interval;
        config.video_buf_sizes = rtsp::SocketBufSizes {
            recv: rtsp_cfg.video.client.read_buffer,
            send: rtsp_cfg.video.client.write_buffer,
        };
        config.audio_buf_sizes = rtsp::SocketBufSizes {
            recv: rtsp_cfg.audio.client.read_buffer,
            send: rtsp_cfg.audio.client.write_buffer,
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (client, sdp, sdp_raw) = rtsp::connect(config, credentials, tx)
            .await
            .context("dialing upstream RTSP source")?;

        let pusher = Pusher::new(
            path.clone(),
            PusherSource::ClientPull,
            sdp,
            sdp_raw,
            server.config().gop_cache,
        );

        if let Err(_existing) = server.register_pusher(pusher.clone()).await {
            client.stop().await;
            bail!("a pusher already exists for path {path}");
        }

        let dispatch_pusher = pusher.clone();
        let dispatch_server = server.clone();
        let dispatch_registry = self.clone();
        tokio::spawn(async move {
            while let Some(packet) = rx.recv().await {
                dispatch_pusher.dispatch(packet).await;
            }
            // Upstream source terminated on its own (no `/stream/stop`
            // call): tear the pusher down the same way a `stop()` caller
            // would, so its path frees up and its players stop cleanly
            // (§3 "Destroyed when its source terminates").
            if dispatch_registry.pullers.lock().await.remove(&dispatch_pusher.id).is_some() {
                warn!(id = %dispatch_pusher.id.0, path = %dispatch_pusher.path, "upstream source ended, tearing down pusher");
                dispatch_server.remove_pusher(&dispatch_pusher.path, dispatch_pusher.id).await;
                dispatch_pusher.stop_all_players().await;
            }
        });

        info!(path = %path, id = %pusher.id.0, "started client pull");
        self.pullers.lock().await.insert(
            pusher.id,
            Puller {
                pusher: pusher.clone(),
                client,
            },
        );
        Ok(pusher.id)
    }

    /// Stop a pulled pusher by id (§6 "Stops pusher by id"): closes the
    /// upstream client connection and removes the pusher from the
    /// server's registry, which also stops every attached player.
    pub async fn stop(&self, server: &Server, id: PusherId) -> Result<()> {
        let Some(puller) = self.pullers.lock().await.remove(&id) else {
            bail!("no pulled pusher with id {}", id.0);
        };
        puller.client.stop().await;
        server.remove_pusher(&puller.pusher.path, id).await;
        puller.pusher.stop_all_players().await;
        warn!(id = %id.0, "stopped client pull");
        Ok(())
    }
}
