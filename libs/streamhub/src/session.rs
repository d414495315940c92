//! RTSP Server Session (C6): the per-accepted-connection state machine.
//! Parses the request stream, resolves the connection's role (Publisher
//! via `ANNOUNCE`, Subscriber via a bare `DESCRIBE`), and drives the
//! Pusher/Player it ends up attached to (§4.5).

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use rtp::{FrameKind, RtpPacket};
use rtsp::{
    SessionDescriptor,
    codec::{self, Frame},
    digest::{self, AuthorizationHeader, ServerChallenge},
    sdp,
    transport::{SocketBufSizes, UdpPair},
};
use rtsp_types::{Method, Request, Response, StatusCode, Version, headers};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::player::{PacketSink, Player, PlayerConfig};
use crate::pusher::{Pusher, PusherSource};
use crate::server::Server;

/// Per-Session configuration derived from [`crate::server::ServerConfig`]
/// (§4.5, §9a).
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub credentials: Option<(String, String)>,
    pub realm: String,
    pub player: PlayerConfig,
    pub gop_cache: bool,
    /// Server-side socket buffer sizes for the video/audio UDP pairs
    /// bound during SETUP, cascaded from the MDU config's per-media `Av`
    /// sections (§4.3).
    pub video_buf_sizes: SocketBufSizes,
    pub audio_buf_sizes: SocketBufSizes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Undetermined,
    Publisher,
    Subscriber,
}

/// Negotiated per-media-pair wire transport, set once by the first SETUP
/// and assumed identical for every subsequent SETUP on the same
/// connection (RTSP does not mix interleaved and UDP within one session).
enum Negotiated {
    TcpInterleaved {
        video: Option<(u8, u8)>,
        audio: Option<(u8, u8)>,
    },
    Udp {
        video: Option<Arc<UdpPair>>,
        audio: Option<Arc<UdpPair>>,
    },
}

struct SessionState {
    role: Role,
    path: Option<String>,
    rtsp_session_id: String,
    authorized: bool,
    server_challenge: Option<ServerChallenge>,
    setups_seen: u8,
    announced: Option<(SessionDescriptor, Bytes)>,
    negotiated: Option<Negotiated>,
    pusher: Option<Arc<Pusher>>,
    player: Option<Arc<Player>>,
    stopped: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            role: Role::Undetermined,
            path: None,
            rtsp_session_id: Uuid::new_v4().to_string(),
            authorized: false,
            server_challenge: None,
            setups_seen: 0,
            announced: None,
            negotiated: None,
            pusher: None,
            player: None,
            stopped: false,
        }
    }
}

/// One accepted RTSP/TCP connection. Doubles as the [`PacketSink`] a
/// Player's drain loop writes through once the connection is serving a
/// subscriber.
pub struct Session {
    id: Uuid,
    server: Server,
    peer: SocketAddr,
    write_half: Mutex<WriteHalf<TcpStream>>,
    state: Mutex<SessionState>,
    stopping: AtomicBool,
}

impl Session {
    /// Entry point spawned by [`Server::run`] once per accepted
    /// connection (§4.5 "Init").
    pub async fn handle(stream: TcpStream, peer: SocketAddr, server: Server) -> Result<()> {
        stream.set_nodelay(true).ok();
        let (mut read_half, write_half) = tokio::io::split(stream);

        let session = Arc::new(Session {
            id: Uuid::new_v4(),
            server,
            peer,
            write_half: Mutex::new(write_half),
            state: Mutex::new(SessionState::new()),
            stopping: AtomicBool::new(false),
        });

        let mut buf = BytesMut::with_capacity(8192);
        let mut read_buf = vec![0u8; 8192];
        let result = session.serve(&mut read_half, &mut buf, &mut read_buf).await;
        session.teardown().await;
        result
    }

    async fn serve(
        self: &Arc<Self>,
        read_half: &mut ReadHalf<TcpStream>,
        buf: &mut BytesMut,
        read_buf: &mut [u8],
    ) -> Result<()> {
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                return Ok(());
            }
            match codec::next_frame(buf)? {
                Some(Frame::Message(rtsp_types::Message::Request(req))) => {
                    if let Err(e) = self.handle_request(req).await {
                        warn!(session = %self.id, peer = %self.peer, "request handling failed: {e}");
                        return Err(e);
                    }
                }
                Some(Frame::Message(rtsp_types::Message::Response(_))) => {
                    debug!(session = %self.id, "ignoring unsolicited response on server connection");
                }
                Some(Frame::Message(rtsp_types::Message::Data(_))) => {
                    // A peer sending us an interleaved frame as a parsed
                    // `Message::Data` rather than through the `$` fast
                    // path below -- nothing to act on either way.
                }
                Some(Frame::Interleaved { channel, payload }) => {
                    self.handle_interleaved(channel, payload).await;
                }
                None => {
                    let n = read_half.read(read_buf).await?;
                    if n == 0 {
                        return Ok(());
                    }
                    buf.extend_from_slice(&read_buf[..n]);
                }
            }
        }
    }

    /// Stop handlers (§4.5): remove this connection's Player from its
    /// Pusher, or signal end-of-stream on the Pusher it was publishing
    /// into. Idempotent and called both on clean TEARDOWN and on any I/O
    /// error that ends [`Session::serve`].
    async fn teardown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        if let Some(player) = state.player.take()
            && let Some(pusher) = &state.pusher
        {
            pusher.remove_player(player.id).await;
        }
        if state.role == Role::Publisher
            && let (Some(pusher), Some(path)) = (state.pusher.take(), state.path.clone())
        {
            pusher.stop_all_players().await;
            self.server.remove_pusher(&path, pusher.id).await;
        }
        state.stopped = true;
    }

    fn should_challenge(&self) -> bool {
        self.server.config().credentials.is_some()
    }

    /// Digest challenge-on-first-request (§4.5 "Authorization"). Returns
    /// `Ok(true)` once the session is authorized (or auth is disabled),
    /// `Ok(false)` after a 401 has been sent and the caller should wait
    /// for the next request.
    async fn ensure_authorized(&self, req: &Request<Vec<u8>>) -> Result<bool> {
        let Some((username, password)) = self.server.config().credentials.clone() else {
            return Ok(true);
        };
        let cseq = header_str(req, &headers::CSEQ).unwrap_or_default();
        let method = method_name(req.method());

        {
            let state = self.state.lock().await;
            if state.authorized {
                return Ok(true);
            }
        }

        let auth_header = req.header(&headers::AUTHORIZATION).map(|h| h.as_str().to_string());
        if let Some(auth_header) = auth_header
            && let Ok(auth) = digest::parse_authorization(&auth_header)
        {
            let mut state = self.state.lock().await;
            if let Some(challenge) = &state.server_challenge
                && challenge.verify(&auth, &username, &password, method)
            {
                state.authorized = true;
                return Ok(true);
            }
        }

        let challenge = ServerChallenge::new(self.server.config().realm.clone());
        let header_value = challenge.header_value();
        self.state.lock().await.server_challenge = Some(challenge);

        let response = Response::builder(Version::V1_0, StatusCode::Unauthorized)
            .header(headers::CSEQ, cseq)
            .header(headers::WWW_AUTHENTICATE, header_value)
            .build(Vec::new());
        self.send_response(response).await?;
        Ok(false)
    }

    async fn handle_request(self: &Arc<Self>, req: Request<Vec<u8>>) -> Result<()> {
        if !self.ensure_authorized(&req).await? {
            return Ok(());
        }

        let response = match req.method() {
            Method::Options => self.handle_options(&req).await,
            Method::Announce => self.handle_announce(&req).await,
            Method::Describe => self.handle_describe(&req).await,
            Method::Setup => self.handle_setup(&req).await,
            Method::Play => self.handle_play(&req).await,
            Method::Pause => self.handle_pause(&req).await,
            Method::Record => self.handle_record(&req).await,
            Method::Teardown => self.handle_teardown(&req).await,
            Method::GetParameter => self.handle_get_parameter(&req),
            _ => Ok(self
                .base_response(StatusCode::MethodNotValidInThisState, &req)
                .build(Vec::new())),
        };
        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(session = %self.id, "{} failed: {e}", method_name(req.method()));
                self.base_response(StatusCode::InternalServerError, &req)
                    .build(Vec::new())
            }
        };
        self.send_response(response).await
    }

    fn base_response(&self, status: StatusCode, req: &Request<Vec<u8>>) -> rtsp_types::ResponseBuilder<Version> {
        let cseq = header_str(req, &headers::CSEQ).unwrap_or_default();
        Response::builder(Version::V1_0, status).header(headers::CSEQ, cseq)
    }

    async fn send_response(&self, response: Response<Vec<u8>>) -> Result<()> {
        let mut buf = Vec::new();
        response.write(&mut buf)?;
        let mut w = self.write_half.lock().await;
        w.write_all(&buf).await?;
        Ok(())
    }

    async fn handle_options(&self, req: &Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        Ok(self
            .base_response(StatusCode::Ok, req)
            .header(
                headers::PUBLIC,
                "OPTIONS, DESCRIBE, ANNOUNCE, SETUP, PLAY, PAUSE, RECORD, TEARDOWN, GET_PARAMETER",
            )
            .build(Vec::new()))
    }

    /// `ANNOUNCE`: the request body is the publisher's SDP. Role becomes
    /// Publisher; the Pusher itself isn't constructed until `RECORD`
    /// (§4.5).
    async fn handle_announce(&self, req: &Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let content_type = header_str(req, &headers::CONTENT_TYPE).unwrap_or_default();
        if !content_type.eq_ignore_ascii_case("application/sdp") {
            return Ok(self.base_response(StatusCode::UnsupportedMediaType, req).build(Vec::new()));
        }
        let sdp_raw = Bytes::copy_from_slice(req.body());
        let parsed = sdp::parse(&sdp_raw).context("parsing ANNOUNCE SDP")?;
        let path = path_from_uri(req);

        let mut state = self.state.lock().await;
        state.role = Role::Publisher;
        state.path = Some(path);
        state.announced = Some((parsed, sdp_raw));
        let session_id = state.rtsp_session_id.clone();
        drop(state);

        Ok(self
            .base_response(StatusCode::Ok, req)
            .header(headers::SESSION, session_id)
            .build(Vec::new()))
    }

    /// `DESCRIBE` without a prior `ANNOUNCE`: role becomes Subscriber.
    /// Looks up the Pusher by path and answers with its cached SDP
    /// verbatim, or 404 if nothing is live there (§4.5).
    async fn handle_describe(&self, req: &Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let path = path_from_uri(req);
        let mut state = self.state.lock().await;
        if state.role == Role::Undetermined {
            state.role = Role::Subscriber;
            state.path = Some(path.clone());
        }
        drop(state);

        let Some(pusher) = self.server.get_pusher(&path).await else {
            return Ok(self.base_response(StatusCode::NotFound, req).build(Vec::new()));
        };
        let sdp_raw = pusher.sdp_raw.clone();
        self.state.lock().await.pusher = Some(pusher);

        Ok(self
            .base_response(StatusCode::Ok, req)
            .header(headers::CONTENT_TYPE, "application/sdp")
            .header(headers::CONTENT_LENGTH, sdp_raw.len().to_string())
            .build(sdp_raw.to_vec()))
    }

    /// `SETUP`: parse the `Transport` header to determine TCP-interleaved
    /// vs UDP, extracting channel numbers or client ports verbatim
    /// (§4.5). Which media this SETUP is for is inferred from call order
    /// -- video first, then audio -- matching the client's own SETUP
    /// ordering (§4.4).
    async fn handle_setup(&self, req: &Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let transport_header = header_str(req, &headers::TRANSPORT)
            .ok_or_else(|| anyhow!("SETUP missing Transport header"))?;

        let mut state = self.state.lock().await;
        let is_video = state.setups_seen == 0;
        state.setups_seen += 1;
        let session_id = state.rtsp_session_id.clone();
        drop(state);

        if transport_header.contains("interleaved=") {
            let (data_ch, ctl_ch) = parse_interleaved_channels(&transport_header)?;
            let mut state = self.state.lock().await;
            match state.negotiated.get_or_insert_with(|| Negotiated::TcpInterleaved {
                video: None,
                audio: None,
            }) {
                Negotiated::TcpInterleaved { video, audio } => {
                    if is_video {
                        *video = Some((data_ch, ctl_ch));
                    } else {
                        *audio = Some((data_ch, ctl_ch));
                    }
                }
                Negotiated::Udp { .. } => bail!("mixed TCP/UDP transport on one session"),
            }
            drop(state);

            Ok(self
                .base_response(StatusCode::Ok, req)
                .header(headers::SESSION, session_id)
                .header(
                    headers::TRANSPORT,
                    format!("RTP/AVP/TCP;unicast;interleaved={data_ch}-{ctl_ch}"),
                )
                .build(Vec::new()))
        } else {
            let (client_data_port, client_ctl_port) = parse_client_port(&transport_header)?;
            let bind_ip = unspecified_for_peer(self.peer.ip());
            let buf_sizes = if is_video {
                self.server.config().video_buf_sizes
            } else {
                self.server.config().audio_buf_sizes
            };
            let pair = Arc::new(
                UdpPair::bind_ephemeral(bind_ip, buf_sizes)
                    .await
                    .context("binding SETUP UDP pair")?,
            );
            pair.data.connect((self.peer.ip(), client_data_port)).await?;
            pair.control.connect((self.peer.ip(), client_ctl_port)).await?;
            let server_data_port = pair.data_port()?;
            let server_ctl_port = pair.control_port()?;

            let mut state = self.state.lock().await;
            match state.negotiated.get_or_insert_with(|| Negotiated::Udp {
                video: None,
                audio: None,
            }) {
                Negotiated::Udp { video, audio } => {
                    if is_video {
                        *video = Some(pair);
                    } else {
                        *audio = Some(pair);
                    }
                }
                Negotiated::TcpInterleaved { .. } => bail!("mixed TCP/UDP transport on one session"),
            }
            drop(state);

            Ok(self
                .base_response(StatusCode::Ok, req)
                .header(headers::SESSION, session_id)
                .header(
                    headers::TRANSPORT,
                    format!(
                        "RTP/AVP/UDP;unicast;client_port={client_data_port}-{client_ctl_port};server_port={server_data_port}-{server_ctl_port}"
                    ),
                )
                .build(Vec::new()))
        }
    }

    /// `PLAY` (subscriber): construct a Player, attach it to the looked-up
    /// Pusher, and spawn its drain loop against this connection as the
    /// sink (§4.5, §4.6).
    async fn handle_play(self: &Arc<Self>, req: &Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let mut state = self.state.lock().await;
        if state.role != Role::Subscriber {
            return Ok(self.base_response(StatusCode::MethodNotValidInThisState, req).build(Vec::new()));
        }
        let Some(pusher) = state.pusher.clone() else {
            return Ok(self.base_response(StatusCode::SessionNotFound, req).build(Vec::new()));
        };
        let session_id = state.rtsp_session_id.clone();
        drop(state);

        let player = Player::new(self.server.config().player);
        pusher.add_player(player.clone()).await;
        self.state.lock().await.player = Some(player.clone());

        let sink: Arc<dyn PacketSink> = self.clone();
        tokio::spawn(player.run(sink));

        Ok(self
            .base_response(StatusCode::Ok, req)
            .header(headers::SESSION, session_id)
            .build(Vec::new()))
    }

    /// `PAUSE` (subscriber): `Player::pause(true)`, flushing the queue
    /// too when the server is configured to drop on pause (§4.5, §4.6).
    async fn handle_pause(&self, req: &Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let state = self.state.lock().await;
        let Some(player) = state.player.clone() else {
            return Ok(self.base_response(StatusCode::SessionNotFound, req).build(Vec::new()));
        };
        let session_id = state.rtsp_session_id.clone();
        drop(state);
        player.pause(true).await;

        Ok(self
            .base_response(StatusCode::Ok, req)
            .header(headers::SESSION, session_id)
            .build(Vec::new()))
    }

    /// `RECORD` (publisher): construct the Pusher from the ANNOUNCEd SDP
    /// and register it, replacing a stale holder iff `close_old` is
    /// enabled (§4.5, §4.6 "Rebinding"). A conflicting live Pusher
    /// without `close_old` fails the RECORD with 454.
    async fn handle_record(self: &Arc<Self>, req: &Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let mut state = self.state.lock().await;
        if state.role != Role::Publisher {
            return Ok(self.base_response(StatusCode::MethodNotValidInThisState, req).build(Vec::new()));
        }
        let Some((sdp, sdp_raw)) = state.announced.clone() else {
            return Ok(self.base_response(StatusCode::MethodNotValidInThisState, req).build(Vec::new()));
        };
        let path = state.path.clone().ok_or_else(|| anyhow!("no path on RECORD"))?;
        let session_id = state.rtsp_session_id.clone();
        let negotiated_is_udp = matches!(state.negotiated, Some(Negotiated::Udp { .. }));
        drop(state);

        let pusher = Pusher::new(path, PusherSource::ServerPush, sdp, sdp_raw, self.server.config().gop_cache);
        if let Err(_existing) = self.server.register_pusher(pusher.clone()).await {
            return Ok(self.base_response(StatusCode::ParameterNotUnderstood, req).build(Vec::new()));
        }
        self.state.lock().await.pusher = Some(pusher.clone());

        if negotiated_is_udp {
            self.spawn_publisher_udp_readers(pusher).await;
        }

        Ok(self
            .base_response(StatusCode::Ok, req)
            .header(headers::SESSION, session_id)
            .build(Vec::new()))
    }

    async fn spawn_publisher_udp_readers(self: &Arc<Self>, pusher: Arc<Pusher>) {
        let state = self.state.lock().await;
        let Some(Negotiated::Udp { video, audio }) = &state.negotiated else {
            return;
        };
        let video = video.clone();
        let audio = audio.clone();
        drop(state);

        if let Some(pair) = video {
            tokio::spawn(udp_publisher_loop(pair, FrameKind::VideoData, FrameKind::VideoCtl, pusher.clone(), self.clone()));
        }
        if let Some(pair) = audio {
            tokio::spawn(udp_publisher_loop(pair, FrameKind::AudioData, FrameKind::AudioCtl, pusher.clone(), self.clone()));
        }
    }

    /// `TEARDOWN`: marks the session stopping; actual cleanup happens in
    /// [`Session::teardown`] once [`Session::serve`] returns (§4.5).
    async fn handle_teardown(&self, req: &Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        let session_id = self.state.lock().await.rtsp_session_id.clone();
        self.stopping.store(true, Ordering::SeqCst);
        Ok(self
            .base_response(StatusCode::Ok, req)
            .header(headers::SESSION, session_id)
            .build(Vec::new()))
    }

    fn handle_get_parameter(&self, req: &Request<Vec<u8>>) -> Result<Response<Vec<u8>>> {
        Ok(self.base_response(StatusCode::Ok, req).build(Vec::new()))
    }

    /// Inbound interleaved binary frame on a publisher connection: look
    /// up which media/control channel it came from and fan it out
    /// through the Pusher, if one has been RECORDed yet.
    async fn handle_interleaved(&self, channel: u8, payload: Bytes) {
        let state = self.state.lock().await;
        let Some(Negotiated::TcpInterleaved { video, audio }) = &state.negotiated else {
            return;
        };
        let kind = channel_kind(channel, *video, *audio);
        let pusher = state.pusher.clone();
        drop(state);

        let (Some(kind), Some(pusher)) = (kind, pusher) else {
            return;
        };
        pusher.dispatch(RtpPacket::new(kind, payload)).await;
    }
}

#[async_trait]
impl PacketSink for Session {
    /// Deliver one fanned-out packet to this connection's subscriber:
    /// an interleaved frame over the same TCP connection, or a UDP
    /// datagram on the negotiated pair, depending on what SETUP
    /// negotiated (§4.6).
    async fn send_rtp(&self, packet: &RtpPacket) -> Result<()> {
        let negotiated = {
            let state = self.state.lock().await;
            match &state.negotiated {
                Some(Negotiated::TcpInterleaved { video, audio }) => {
                    Some(Negotiated::TcpInterleaved { video: *video, audio: *audio })
                }
                Some(Negotiated::Udp { video, audio }) => {
                    Some(Negotiated::Udp { video: video.clone(), audio: audio.clone() })
                }
                None => None,
            }
        };
        match negotiated {
            Some(Negotiated::TcpInterleaved { video, audio }) => {
                let channel = match packet.kind {
                    FrameKind::VideoData => video.map(|(d, _)| d),
                    FrameKind::VideoCtl => video.map(|(_, c)| c),
                    FrameKind::AudioData => audio.map(|(d, _)| d),
                    FrameKind::AudioCtl => audio.map(|(_, c)| c),
                };
                let Some(channel) = channel else {
                    bail!("no interleaved channel negotiated for {:?}", packet.kind);
                };
                let frame = codec::encode_interleaved(channel, &packet.payload)?;
                let mut w = self.write_half.lock().await;
                w.write_all(&frame).await?;
            }
            Some(Negotiated::Udp { video, audio }) => {
                let pair = match packet.kind {
                    FrameKind::VideoData | FrameKind::VideoCtl => video,
                    FrameKind::AudioData | FrameKind::AudioCtl => audio,
                };
                let Some(pair) = pair else {
                    bail!("no UDP pair negotiated for {:?}", packet.kind);
                };
                match packet.kind {
                    FrameKind::VideoData | FrameKind::AudioData => {
                        pair.data.send(&packet.payload).await?;
                    }
                    FrameKind::VideoCtl | FrameKind::AudioCtl => {
                        pair.control.send(&packet.payload).await?;
                    }
                }
            }
            None => bail!("transport not negotiated yet"),
        }
        Ok(())
    }
}

/// Receives datagrams for one publisher media direction and forwards
/// them into the Pusher until the owning Session stops.
async fn udp_publisher_loop(
    pair: Arc<UdpPair>,
    data_kind: FrameKind,
    ctl_kind: FrameKind,
    pusher: Arc<Pusher>,
    session: Arc<Session>,
) {
    let mut data_buf = UdpPair::new_read_buf();
    let mut ctl_buf = UdpPair::new_read_buf();
    loop {
        if session.stopping.load(Ordering::SeqCst) {
            return;
        }
        tokio::select! {
            result = pair.recv_data(&mut data_buf) => {
                match result {
                    Ok(payload) => pusher.dispatch(RtpPacket::new(data_kind, payload)).await,
                    Err(e) => { warn!("publisher UDP data recv failed: {e}"); return; }
                }
            }
            result = pair.recv_control(&mut ctl_buf) => {
                match result {
                    Ok(payload) => pusher.dispatch(RtpPacket::new(ctl_kind, payload)).await,
                    Err(e) => { warn!("publisher UDP control recv failed: {e}"); return; }
                }
            }
        }
    }
}

fn method_name(method: Method) -> &'static str {
    match method {
        Method::Options => "OPTIONS",
        Method::Describe => "DESCRIBE",
        Method::Announce => "ANNOUNCE",
        Method::Setup => "SETUP",
        Method::Play => "PLAY",
        Method::Pause => "PAUSE",
        Method::Record => "RECORD",
        Method::Teardown => "TEARDOWN",
        Method::GetParameter => "GET_PARAMETER",
        _ => "UNKNOWN",
    }
}

fn header_str(req: &Request<Vec<u8>>, name: &rtsp_types::HeaderName) -> Option<String> {
    req.header(name).map(|h| h.as_str().to_string())
}

fn path_from_uri(req: &Request<Vec<u8>>) -> String {
    let raw = req.request_uri().map(|u| u.to_string()).unwrap_or_default();
    url::Url::parse(&raw)
        .map(|u| u.path().to_string())
        .unwrap_or(raw)
}

fn parse_interleaved_channels(transport: &str) -> Result<(u8, u8)> {
    let part = transport
        .split(';')
        .find_map(|p| p.trim().strip_prefix("interleaved="))
        .ok_or_else(|| anyhow!("Transport missing interleaved="))?;
    let (a, b) = part.split_once('-').ok_or_else(|| anyhow!("malformed interleaved= range"))?;
    Ok((a.parse()?, b.parse()?))
}

fn parse_client_port(transport: &str) -> Result<(u16, u16)> {
    let part = transport
        .split(';')
        .find_map(|p| p.trim().strip_prefix("client_port="))
        .ok_or_else(|| anyhow!("Transport missing client_port="))?;
    let (a, b) = part.split_once('-').ok_or_else(|| anyhow!("malformed client_port= range"))?;
    Ok((a.parse()?, b.parse()?))
}

fn channel_kind(channel: u8, video: Option<(u8, u8)>, audio: Option<(u8, u8)>) -> Option<FrameKind> {
    if let Some((data, ctl)) = video {
        if channel == data {
            return Some(FrameKind::VideoData);
        }
        if channel == ctl {
            return Some(FrameKind::VideoCtl);
        }
    }
    if let Some((data, ctl)) = audio {
        if channel == data {
            return Some(FrameKind::AudioData);
        }
        if channel == ctl {
            return Some(FrameKind::AudioCtl);
        }
    }
    None
}

fn unspecified_for_peer(peer: IpAddr) -> IpAddr {
    if peer.is_ipv4() {
        IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
    } else {
        IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_interleaved_channel_range() {
        let (d, c) = parse_interleaved_channels("RTP/AVP/TCP;unicast;interleaved=0-1").unwrap();
        assert_eq!((d, c), (0, 1));
    }

    #[test]
    fn parses_client_port_range() {
        let (d, c) = parse_client_port("RTP/AVP/UDP;unicast;client_port=3456-3457").unwrap();
        assert_eq!((d, c), (3456, 3457));
    }

    #[test]
    fn channel_kind_maps_video_and_audio() {
        let video = Some((0u8, 1u8));
        let audio = Some((2u8, 3u8));
        assert_eq!(channel_kind(0, video, audio), Some(FrameKind::VideoData));
        assert_eq!(channel_kind(3, video, audio), Some(FrameKind::AudioCtl));
        assert_eq!(channel_kind(9, video, audio), None);
    }
}
