//! Pusher (C7): fan-out multiplexer from one upstream source to every
//! attached Player, with an optional GOP cache for fast-start.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use rtp::RtpPacket;
use rtsp::SessionDescriptor;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::player::{Player, PlayerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PusherId(pub Uuid);

impl PusherId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PusherId {
    fn default() -> Self {
        Self::new()
    }
}

/// How a Pusher's inbound RTP arrives (§3 `Pusher.source`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PusherSource {
    /// An RTSP client this process dialed out to (C5).
    ClientPull,
    /// A downstream publisher that ANNOUNCE+RECORD'd into this server (C6).
    ServerPush,
}

/// Retains the most recent keyframe and every non-keyframe since, so a
/// newly attached Player can fast-start instead of waiting for the next
/// keyframe (§4.6).
struct GopCache {
    packets: VecDeque<RtpPacket>,
    has_keyframe: bool,
}

impl GopCache {
    fn new() -> Self {
        Self {
            packets: VecDeque::new(),
            has_keyframe: false,
        }
    }

    fn push(&mut self, packet: &RtpPacket) {
        if packet.kind.is_video() && packet.kind.is_data() && packet.is_video_keyframe() {
            self.packets.clear();
            self.has_keyframe = true;
        }
        if !self.has_keyframe {
            return;
        }
        self.packets.push_back(packet.clone());
    }

    fn snapshot(&self) -> Vec<RtpPacket> {
        self.packets.iter().cloned().collect()
    }
}

pub struct Pusher {
    pub id: PusherId,
    pub path: String,
    pub source: PusherSource,
    pub sdp: SessionDescriptor,
    /// The verbatim SDP body this pusher answers DESCRIBE with -- the
    /// upstream DESCRIBE response body for a pulled pusher, or the
    /// ANNOUNCE body for a published one. Kept alongside the parsed
    /// [`SessionDescriptor`] since a re-serialized SDP need not be
    /// byte-identical to what the publisher sent.
    pub sdp_raw: bytes::Bytes,
    gop_cache: Option<RwLock<GopCache>>,
    players: RwLock<HashMap<PlayerId, Arc<Player>>>,
}

impl Pusher {
    pub fn new(
        path: String,
        source: PusherSource,
        sdp: SessionDescriptor,
        sdp_raw: bytes::Bytes,
        gop_cache_enabled: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: PusherId::new(),
            path,
            source,
            sdp,
            sdp_raw,
            gop_cache: gop_cache_enabled.then(|| RwLock::new(GopCache::new())),
            players: RwLock::new(HashMap::new()),
        })
    }

    pub async fn player_count(&self) -> usize {
        self.players.read().await.len()
    }

    /// Every attached player's id, for the `/players` control-plane
    /// listing (§6).
    pub async fn player_ids(&self) -> Vec<PlayerId> {
        self.players.read().await.keys().copied().collect()
    }

    /// Attach a Player and, when the GOP cache is enabled, drain the
    /// cached burst into its queue before any live packet can arrive
    /// (§4.6). Caller is responsible for starting the player's drain
    /// loop.
    pub async fn add_player(&self, player: Arc<Player>) {
        if let Some(cache) = &self.gop_cache {
            let cached = cache.read().await.snapshot();
            if !cached.is_empty() {
                player.seed(cached).await;
            }
        }
        self.players.write().await.insert(player.id, player);
    }

    pub async fn remove_player(&self, id: PlayerId) {
        if let Some(player) = self.players.write().await.remove(&id) {
            player.stop();
        }
    }

    /// Lift every attached Player out of this Pusher without stopping it,
    /// for handoff to a replacement Pusher during a rebind (§4.6
    /// "Rebinding"). The Players keep running against their own session
    /// sink; only which Pusher dispatches to them changes.
    pub async fn take_players(&self) -> Vec<Arc<Player>> {
        self.players.write().await.drain().map(|(_, p)| p).collect()
    }

    /// Adopt Players lifted from a rebind-displaced Pusher, seeding each
    /// with this Pusher's current GOP cache burst so they keep fast-start
    /// semantics across the handoff.
    pub async fn adopt_players(&self, migrated: Vec<Arc<Player>>) {
        if migrated.is_empty() {
            return;
        }
        let cached = match &self.gop_cache {
            Some(cache) => cache.read().await.snapshot(),
            None => Vec::new(),
        };
        let mut players = self.players.write().await;
        for player in migrated {
            if !cached.is_empty() {
                player.seed(cached.clone()).await;
            }
            players.insert(player.id, player);
        }
    }

    /// Fan out one packet from the upstream to every attached player and
    /// the GOP cache (§4.6). Dispatch is non-blocking per player: a full
    /// player queue trims itself, it never backs up the pusher.
    pub async fn dispatch(&self, packet: RtpPacket) {
        if let Some(cache) = &self.gop_cache {
            cache.write().await.push(&packet);
        }
        let players = self.players.read().await;
        debug!(path = %self.path, players = players.len(), "dispatching packet");
        for player in players.values() {
            player.queue_rtp(packet.clone()).await;
        }
    }

    /// Stop every attached player (used on source termination or during
    /// a rebind per §4.6).
    pub async fn stop_all_players(&self) {
        let mut players = self.players.write().await;
        for (_, player) in players.drain() {
            player.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::{PacketSink, PlayerConfig};
    use async_trait::async_trait;
    use rtp::FrameKind;
    use tokio::sync::Mutex;

    struct CollectingSink {
        received: Mutex<Vec<Bytes>>,
    }
    use bytes::Bytes;

    #[async_trait]
    impl PacketSink for CollectingSink {
        async fn send_rtp(&self, packet: &RtpPacket) -> anyhow::Result<()> {
            self.received.lock().await.push(packet.payload.clone());
            Ok(())
        }
    }

    fn sample_sdp() -> SessionDescriptor {
        SessionDescriptor::default()
    }

    /// A fake 12-byte RTP header followed by a NAL unit byte, tagged with
    /// `marker` in the payload's last byte for identifying packets in
    /// assertions.
    fn rtp_with_nal(nal_type: u8, marker: u8) -> RtpPacket {
        let mut payload = vec![0u8; 12];
        payload.push(nal_type);
        payload.push(marker);
        RtpPacket::new(FrameKind::VideoData, payload)
    }

    #[tokio::test]
    async fn new_player_receives_cached_gop_before_live_packets() {
        let pusher = Pusher::new("/cam1".into(), PusherSource::ClientPull, sample_sdp(), Bytes::new(), true);

        // NAL type 5 is an IDR slice per the keyframe heuristic.
        pusher.dispatch(rtp_with_nal(5, 1)).await;
        pusher.dispatch(rtp_with_nal(1, 2)).await;

        let player = Player::new(PlayerConfig::default());
        pusher.add_player(player.clone()).await;
        let sink = Arc::new(CollectingSink {
            received: Mutex::new(Vec::new()),
        });
        let handle = tokio::spawn(player.clone().run(sink.clone()));

        pusher.dispatch(rtp_with_nal(1, 3)).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        player.stop();
        let _ = handle.await;

        let received = sink.received.lock().await;
        assert_eq!(received.len(), 3);
        assert_eq!(received[0].last(), Some(&1u8));
        assert_eq!(received[2].last(), Some(&3u8));
    }

    #[tokio::test]
    async fn remove_player_stops_its_drain_loop() {
        let pusher = Pusher::new("/cam1".into(), PusherSource::ClientPull, sample_sdp(), Bytes::new(), false);
        let player = Player::new(PlayerConfig::default());
        pusher.add_player(player.clone()).await;
        let sink = Arc::new(CollectingSink {
            received: Mutex::new(Vec::new()),
        });
        let handle = tokio::spawn(player.clone().run(sink));

        pusher.remove_player(player.id).await;
        tokio::time::timeout(std::time::Duration::from_millis(200), handle)
            .await
            .expect("drain loop should stop after remove_player")
            .unwrap();
    }
}
