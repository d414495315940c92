//! MDU (`Rtsp`) config: listener address, Digest credentials, per-media-kind
//! socket buffer sizes, player/pusher knobs (§2, §9, grounded on
//! `original_source/cvds-mdu/config/rtsp.go`).

use std::net::SocketAddr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::common::{Http, Localize, Log, ServiceConfig, default_version};
use crate::Finalize;

/// Read/write socket buffer sizes in bytes. `None` leaves the OS default in
/// place, matching the original's "0 means don't call setsockopt" contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ReadWriteBuffer {
    pub read_buffer: Option<usize>,
    pub write_buffer: Option<usize>,
}

/// Application-level buffered-reader/writer sizes (distinct from the
/// kernel socket buffers above).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderWriter {
    pub reader_size: usize,
    pub writer_size: usize,
}

impl Default for ReaderWriter {
    fn default() -> Self {
        Self {
            reader_size: 200 * 1024,
            writer_size: 200 * 1024,
        }
    }
}

/// Per-media-kind (audio/audio-control/video/video-control) socket config,
/// cascading from an outer default the way the original's `PostHandle`
/// walks `Client`/`Server` down from the struct's own `ReadWriteBuffer`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Av {
    pub read_buffer: Option<usize>,
    pub write_buffer: Option<usize>,
    pub client: ReadWriteBuffer,
    pub server: ReadWriteBuffer,
}

impl Av {
    /// Fill `client`/`server` from the outer `read_buffer`/`write_buffer`
    /// wherever the nested value was left unset. Mirrors `rtsp.go`'s
    /// `PostHandle` cascade (outer `AV` values are the fallback for both
    /// `Client` and `Server`).
    fn cascade(&mut self) {
        for side in [&mut self.client, &mut self.server] {
            if side.read_buffer.is_none() {
                side.read_buffer = self.read_buffer;
            }
            if side.write_buffer.is_none() {
                side.write_buffer = self.write_buffer;
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub reader_writer: ReaderWriter,
    pub timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            reader_writer: ReaderWriter::default(),
            timeout_secs: 10,
        }
    }
}

/// §4.8 player knobs: bounded-queue limit and pause/drop behavior (resolves
/// the PAUSE Open Question — see SPEC_FULL.md §9).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub queue_limit: usize,
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

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct PusherConfig {
    pub disable_gop_cache: bool,
}

/// Top-level MDU RTSP server config. Defaults match
/// `original_source/cvds-mdu/config/rtsp.go`'s `PreHandle`/`PostHandle` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Rtsp {
    pub host: String,
    pub port: u16,
    pub read_buffer: usize,
    pub write_buffer: usize,
    pub reader_writer: ReaderWriter,
    pub timeout_secs: u64,
    pub enable_authorization: bool,
    pub username: String,
    pub password: String,
    pub realm: String,
    pub close_old: bool,
    pub client: ClientConfig,
    pub player: PlayerConfig,
    pub pusher: PusherConfig,
    pub audio: Av,
    pub audio_control: Av,
    pub video: Av,
    pub video_control: Av,
    pub enable_debug: bool,
}

impl Default for Rtsp {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 554,
            read_buffer: 1024 * 1024,
            write_buffer: 1024 * 1024,
            reader_writer: ReaderWriter::default(),
            timeout_secs: 10,
            enable_authorization: false,
            username: String::new(),
            password: String::new(),
            realm: "mdu".to_string(),
            close_old: true,
            client: ClientConfig::default(),
            player: PlayerConfig::default(),
            pusher: PusherConfig::default(),
            audio: Av {
                read_buffer: Some(256 * 1024),
                ..Av::default()
            },
            audio_control: Av::default(),
            video: Av {
                read_buffer: Some(1024 * 1024),
                ..Av::default()
            },
            video_control: Av::default(),
            enable_debug: false,
        }
    }
}

impl Rtsp {
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid rtsp listen address {}:{}", self.host, self.port))
    }
}

impl Finalize for Rtsp {
    fn finalize(&mut self) -> Result<()> {
        self.audio.cascade();
        self.audio_control.cascade();
        self.video.cascade();
        self.video_control.cascade();
        if self.enable_authorization && self.username.is_empty() {
            anyhow::bail!("rtsp.enable_authorization is set but rtsp.username is empty");
        }
        Ok(())
    }
}

/// Top-level MDU config file (§6): `http`, `rtsp`, `log`, `service`,
/// `localize`, `version`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: Http,
    pub rtsp: Rtsp,
    pub log: Log,
    pub service: ServiceConfig,
    pub localize: Localize,
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http: Http::default(),
            rtsp: Rtsp::default(),
            log: Log::default(),
            service: ServiceConfig::default(),
            localize: Localize::default(),
            version: default_version(),
        }
    }
}

impl Finalize for Config {
    fn finalize(&mut self) -> Result<()> {
        self.rtsp.finalize()
    }
}
