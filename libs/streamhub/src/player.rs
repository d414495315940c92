//! Player (C8): one subscriber's outbound queue and drain loop.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use rtp::RtpPacket;
use tokio::sync::{Mutex, Notify};
use tracing::{debug, warn};
use uuid::Uuid;

/// Where a Player's drain loop delivers packets -- an interleaved TCP
/// write or a UDP send, depending on the owning Session's negotiated
/// transport. Implemented by `streamhub::session::Session`.
#[async_trait]
pub trait PacketSink: Send + Sync + 'static {
    async fn send_rtp(&self, packet: &RtpPacket) -> anyhow::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PlayerId {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-player configuration (§4.6, §9's PAUSE open question).
#[derive(Debug, Clone, Copy)]
pub struct PlayerConfig {
    /// `len(queue) > queue_limit > 0` discards the oldest entries until
    /// back within limit. `0` disables the bound (unlimited).
    pub queue_limit: usize,
    /// When set, a transition into `paused` also flushes the queue.
    /// Left unset (the resolved Open Question), packets queued while
    /// paused are delivered in order on resume.
    pub drop_packet_when_paused: bool,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            queue_limit: 1024,
            drop_packet_when_paused: false,
        }
    }
}

struct Queue {
    items: VecDeque<RtpPacket>,
    dropped: u64,
}

/// One subscriber attached to a Pusher. `queue_rtp` is the non-blocking
/// producer side; `run` drives the consumer side until the sink errors
/// or `stop` is called.
pub struct Player {
    pub id: PlayerId,
    config: PlayerConfig,
    queue: Mutex<Queue>,
    notify: Notify,
    paused: AtomicBool,
    stopped: AtomicBool,
}

impl Player {
    pub fn new(config: PlayerConfig) -> Arc<Self> {
        Arc::new(Self {
            id: PlayerId::new(),
            config,
            queue: Mutex::new(Queue {
                items: VecDeque::new(),
                dropped: 0,
            }),
            notify: Notify::new(),
            paused: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
        })
    }

    /// Non-blocking enqueue (§4.6): appends, then trims from the front
    /// until back within `queue_limit` (0 = unbounded).
    pub async fn queue_rtp(&self, packet: RtpPacket) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        let mut q = self.queue.lock().await;
        q.items.push_back(packet);
        if self.config.queue_limit > 0 {
            while q.items.len() > self.config.queue_limit {
                q.items.pop_front();
                q.dropped += 1;
                debug!(player = %self.id.0, total_dropped = q.dropped, "player queue overflow, dropped oldest packet");
            }
        }
        drop(q);
        self.notify.notify_one();
    }

    /// Seed the queue with a GOP cache burst ahead of any live packet
    /// (§4.6 "AddPlayer... drained into the new player's queue"). Bypasses
    /// the overflow trim since the cache is expected to already respect
    /// its own bound.
    pub async fn seed(&self, packets: impl IntoIterator<Item = RtpPacket>) {
        let mut q = self.queue.lock().await;
        for p in packets {
            q.items.push_back(p);
        }
        drop(q);
        self.notify.notify_one();
    }

    /// Pause or resume delivery. Per the invariant `paused ∧
    /// drop_packet_when_paused ⇒ queue is empty on transition to
    /// paused`: pausing with the flag set flushes whatever is queued
    /// right now. Without the flag, queued packets are kept and
    /// delivered in order once resumed (the resolved Open Question).
    pub async fn pause(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
        if paused && self.config.drop_packet_when_paused {
            let mut q = self.queue.lock().await;
            q.items.clear();
        }
        self.notify.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Drain loop: while paused, parks without consuming the queue
    /// (packets keep arriving via `queue_rtp`/are held from before the
    /// pause); once resumed, pops the head and hands it to `sink`.
    /// Terminates on `stop()` or a sink error.
    pub async fn run(self: Arc<Self>, sink: Arc<dyn PacketSink>) {
        loop {
            if self.stopped.load(Ordering::SeqCst) {
                return;
            }
            if self.is_paused() {
                self.notify.notified().await;
                continue;
            }

            let packet = loop {
                let mut q = self.queue.lock().await;
                if let Some(p) = q.items.pop_front() {
                    break Some(p);
                }
                drop(q);
                if self.stopped.load(Ordering::SeqCst) {
                    return;
                }
                self.notify.notified().await;
                if self.stopped.load(Ordering::SeqCst) {
                    return;
                }
                if self.is_paused() {
                    break None;
                }
            };
            let Some(packet) = packet else { continue };

            if let Err(e) = sink.send_rtp(&packet).await {
                warn!(player = %self.id.0, "player send failed, stopping: {e}");
                self.stop();
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rtp::FrameKind;
    use tokio::sync::Mutex as TMutex;

    struct RecordingSink {
        received: TMutex<Vec<Bytes>>,
    }

    #[async_trait]
    impl PacketSink for RecordingSink {
        async fn send_rtp(&self, packet: &RtpPacket) -> anyhow::Result<()> {
            self.received.lock().await.push(packet.payload.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn queue_never_exceeds_limit() {
        let player = Player::new(PlayerConfig {
            queue_limit: 4,
            drop_packet_when_paused: false,
        });
        for i in 0..100u8 {
            player
                .queue_rtp(RtpPacket::new(FrameKind::VideoData, vec![i]))
                .await;
        }
        let q = player.queue.lock().await;
        assert!(q.items.len() <= 4);
        assert_eq!(q.dropped, 96);
    }

    #[tokio::test]
    async fn drained_packets_are_delivered_in_order() {
        let player = Player::new(PlayerConfig::default());
        let sink = Arc::new(RecordingSink {
            received: TMutex::new(Vec::new()),
        });
        let handle = tokio::spawn(player.clone().run(sink.clone()));

        for i in 0..10u8 {
            player
                .queue_rtp(RtpPacket::new(FrameKind::VideoData, vec![i]))
                .await;
        }
        // Give the drain loop a chance to catch up, then stop it.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        player.stop();
        let _ = handle.await;

        let received = sink.received.lock().await;
        let got: Vec<u8> = received.iter().map(|b| b[0]).collect();
        assert_eq!(got, (0..10).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn paused_without_drop_preserves_order_on_resume() {
        let player = Player::new(PlayerConfig {
            queue_limit: 0,
            drop_packet_when_paused: false,
        });
        let sink = Arc::new(RecordingSink {
            received: TMutex::new(Vec::new()),
        });
        player.pause(true).await;
        for i in 0..3u8 {
            player
                .queue_rtp(RtpPacket::new(FrameKind::VideoData, vec![i]))
                .await;
        }
        let handle = tokio::spawn(player.clone().run(sink.clone()));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(sink.received.lock().await.is_empty());

        player.pause(false).await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        player.stop();
        let _ = handle.await;

        let received = sink.received.lock().await;
        let got: Vec<u8> = received.iter().map(|b| b[0]).collect();
        assert_eq!(got, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn pausing_with_drop_flag_flushes_queue_immediately() {
        let player = Player::new(PlayerConfig {
            queue_limit: 0,
            drop_packet_when_paused: true,
        });
        for i in 0..3u8 {
            player
                .queue_rtp(RtpPacket::new(FrameKind::VideoData, vec![i]))
                .await;
        }
        player.pause(true).await;
        let q = player.queue.lock().await;
        assert!(q.items.is_empty());
    }
}
