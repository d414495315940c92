//! RTSP Server (C9): TCP listener plus the path-keyed Pusher registry
//! every accepted Session attaches to or publishes into.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::player::PlayerConfig;
use crate::pusher::Pusher;
use crate::session::{Session, SessionConfig};

/// Process-wide server configuration (§4.5, §9a).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// `Some((username, password))` enables Digest auth on every Session;
    /// `None` accepts requests unauthenticated (§4.5).
    pub credentials: Option<(String, String)>,
    pub realm: String,
    /// When an ANNOUNCE arrives for a path already held by a live Pusher,
    /// stop the old one and let the new one take its place (§4.6
    /// "Rebinding").
    pub close_old: bool,
    pub gop_cache: bool,
    pub player: PlayerConfig,
    /// Server-side socket buffer sizes applied to the video/audio UDP
    /// pairs bound during SETUP (§4.3), cascaded from the MDU config's
    /// per-media `Av` sections.
    pub video_buf_sizes: rtsp::transport::SocketBufSizes,
    pub audio_buf_sizes: rtsp::transport::SocketBufSizes,
}

/// Registry of live Pushers keyed by RTSP path (§3 "Route key / path").
/// Cloning is cheap -- it's an `Arc`-backed handle shared by every
/// accepted Session.
#[derive(Clone)]
pub struct Server {
    config: Arc<ServerConfig>,
    pushers: Arc<RwLock<HashMap<String, Arc<Pusher>>>>,
}

impl Server {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config: Arc::new(config),
            pushers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            credentials: self.config.credentials.clone(),
            realm: self.config.realm.clone(),
            player: self.config.player,
            gop_cache: self.config.gop_cache,
            video_buf_sizes: self.config.video_buf_sizes,
            audio_buf_sizes: self.config.audio_buf_sizes,
        }
    }

    pub async fn get_pusher(&self, path: &str) -> Option<Arc<Pusher>> {
        self.pushers.read().await.get(path).cloned()
    }

    pub async fn list_pushers(&self) -> Vec<Arc<Pusher>> {
        self.pushers.read().await.values().cloned().collect()
    }

    /// Register a freshly constructed Pusher under its path. If a live
    /// Pusher already holds the path and `close_old` is enabled, its
    /// Players are migrated onto the new Pusher when the SDP matches
    /// (§4.6 "Rebinding"); a mismatched SDP refuses the migration the
    /// same as `close_old` being disabled, leaving the caller to reject
    /// the ANNOUNCE/pull with a 4xx.
    pub async fn register_pusher(&self, pusher: Arc<Pusher>) -> Result<(), Arc<Pusher>> {
        let mut pushers = self.pushers.write().await;
        if let Some(existing) = pushers.get(&pusher.path).cloned() {
            if !self.config.close_old || !existing.sdp.compatible_with(&pusher.sdp) {
                return Err(existing);
            }
            let migrated = existing.take_players().await;
            let migrated_count = migrated.len();
            pusher.adopt_players(migrated).await;
            info!(path = %pusher.path, migrated_count, "rebinding pusher (close_old), migrated players");
        }
        pushers.insert(pusher.path.clone(), pusher);
        Ok(())
    }

    pub async fn remove_pusher(&self, path: &str, id: crate::pusher::PusherId) {
        let mut pushers = self.pushers.write().await;
        if let Some(existing) = pushers.get(path)
            && existing.id == id
        {
            pushers.remove(path);
        }
    }

    /// Accept loop: binds `config.listen_addr` and spawns one task per
    /// accepted connection running [`Session::handle`]. Runs until the
    /// listener errors.
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.listen_addr).await?;
        info!(addr = %self.config.listen_addr, "RTSP server listening");
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept failed: {e}");
                    continue;
                }
            };
            let server = self.clone();
            tokio::spawn(async move {
                if let Err(e) = Session::handle(stream, peer, server).await {
                    warn!(%peer, "session ended with error: {e}");
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::Player;
    use rtsp::SessionDescriptor;

    fn config() -> ServerConfig {
        ServerConfig {
            listen_addr: "127.0.0.1:0".parse().unwrap(),
            credentials: None,
            realm: "test".into(),
            close_old: true,
            gop_cache: true,
            player: PlayerConfig::default(),
            video_buf_sizes: rtsp::transport::SocketBufSizes::default(),
            audio_buf_sizes: rtsp::transport::SocketBufSizes::default(),
        }
    }

    #[tokio::test]
    async fn rebind_migrates_players_when_sdp_matches() {
        let server = Server::new(config());
        let sdp = SessionDescriptor::default();
        let first = Pusher::new("/cam1".into(), crate::pusher::PusherSource::ClientPull, sdp.clone(), bytes::Bytes::new(), true);
        server.register_pusher(first.clone()).await.unwrap();

        let player = Player::new(PlayerConfig::default());
        first.add_player(player.clone()).await;
        assert_eq!(first.player_count().await, 1);

        let second = Pusher::new("/cam1".into(), crate::pusher::PusherSource::ClientPull, sdp, bytes::Bytes::new(), true);
        server.register_pusher(second.clone()).await.unwrap();

        assert_eq!(first.player_count().await, 0);
        assert_eq!(second.player_count().await, 1);
        assert!(second.player_ids().await.contains(&player.id));
        assert!(std::ptr::eq(
            Arc::as_ptr(&server.get_pusher("/cam1").await.unwrap()),
            Arc::as_ptr(&second)
        ));
    }

    #[tokio::test]
    async fn rebind_refused_when_sdp_incompatible() {
        let server = Server::new(config());
        let mut sdp_a = SessionDescriptor::default();
        sdp_a.medias.push(rtsp::sdp::MediaDescriptor {
            is_video: true,
            payload_type: 96,
            codec_name: Some("H264".into()),
            clock_rate: Some(90000),
            control: Some("trackID=0".into()),
        });
        let mut sdp_b = sdp_a.clone();
        sdp_b.medias[0].codec_name = Some("H265".into());

        let first = Pusher::new("/cam1".into(), crate::pusher::PusherSource::ClientPull, sdp_a, bytes::Bytes::new(), true);
        server.register_pusher(first.clone()).await.unwrap();

        let second = Pusher::new("/cam1".into(), crate::pusher::PusherSource::ClientPull, sdp_b, bytes::Bytes::new(), true);
        let err = server.register_pusher(second).await.unwrap_err();
        assert_eq!(err.id, first.id);
    }
}
