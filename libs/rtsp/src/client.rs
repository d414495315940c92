//! RTSP client (C5): dial an upstream, run the DESCRIBE/SETUP/PLAY
//! handshake with Digest auth, and demultiplex inbound RTP/RTCP into
//! [`rtp::RtpPacket`]s delivered to the caller over an mpsc channel.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use bytes::BytesMut;
use rtp::{FrameKind, RtpPacket};
use rtsp_types::{Method, Request, Response, StatusCode, Version, headers};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::Url;

use crate::codec::{self, Frame};
use crate::constants::net::unspecified_for_ip;
use crate::digest;
use crate::sdp::{self, SessionDescriptor};
use crate::transport::{SocketBufSizes, UdpPair};

const USER_AGENT: &str = "mdu-rtsp-client";

/// Wire transport negotiated for a pull session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientTransport {
    TcpInterleaved,
    Udp,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub url: Url,
    pub transport: ClientTransport,
    /// Read/write deadline, renewed per operation. Ignored once a UDP
    /// SETUP has completed (§4.4 step 4).
    pub timeout: Duration,
    /// `> 0` enables an OPTIONS keep-alive fired whenever this interval
    /// elapses between frames (§4.4 step 7). `None`/zero disables it.
    pub option_interval: Option<Duration>,
    /// Socket buffer sizes for the UDP pairs bound during SETUP,
    /// configurable per media kind per §4.3.
    pub video_buf_sizes: SocketBufSizes,
    pub audio_buf_sizes: SocketBufSizes,
}

impl ClientConfig {
    pub fn new(url: Url, transport: ClientTransport) -> Self {
        Self {
            url,
            transport,
            timeout: Duration::from_secs(10),
            option_interval: None,
            video_buf_sizes: SocketBufSizes::default(),
            audio_buf_sizes: SocketBufSizes::default(),
        }
    }
}

/// Handle to a running client. Dropping it does not stop the background
/// stream loop -- call [`RtspClient::stop`] explicitly, which is
/// idempotent.
pub struct RtspClient {
    stopped: Arc<AtomicBool>,
    write_half: Arc<Mutex<WriteHalf<TcpStream>>>,
}

impl RtspClient {
    /// `Stop()` per §4.4: idempotent, closes the TCP connection (and any
    /// UDP sockets, dropped with the task that owns them). Concurrent I/O
    /// unblocks with a connection-closed error that the stream loop
    /// swallows once `stopped` is observed.
    pub async fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut w = self.write_half.lock().await;
        let _ = w.shutdown().await;
    }
}

struct Handshake {
    stream: TcpStream,
    url: Url,
    cseq: u32,
    session_id: Option<String>,
}

impl Handshake {
    async fn dial(url: &Url, dial_timeout: Duration) -> Result<Self> {
        let host = url.host_str().ok_or_else(|| anyhow!("URL has no host"))?;
        let port = url.port_or_known_default().unwrap_or(554);
        let stream = timeout(dial_timeout, TcpStream::connect((host, port)))
            .await
            .context("connect timed out")??;
        Ok(Self {
            stream,
            url: url.clone(),
            cseq: 0,
            session_id: None,
        })
    }

    fn next_cseq(&mut self) -> u32 {
        self.cseq += 1;
        self.cseq
    }

    async fn send(&mut self, request: Request<Vec<u8>>, deadline: Duration) -> Result<()> {
        let mut buf = Vec::new();
        request.write(&mut buf)?;
        timeout(deadline, self.stream.write_all(&buf)).await??;
        Ok(())
    }

    async fn recv_response(&mut self, deadline: Duration) -> Result<Response<Vec<u8>>> {
        let mut buf = BytesMut::with_capacity(8192);
        loop {
            let mut chunk = [0u8; 4096];
            let n = timeout(deadline, self.stream.read(&mut chunk))
                .await??;
            if n == 0 {
                bail!("connection closed while waiting for response");
            }
            buf.extend_from_slice(&chunk[..n]);
            match codec::next_frame(&mut buf)? {
                Some(Frame::Message(rtsp_types::Message::Response(resp))) => return Ok(resp),
                Some(_) => continue, // stray interleaved/request data before PLAY; ignore
                None => continue,
            }
        }
    }

    /// Send `request`, and if the response is 401, retry exactly once
    /// with a Digest `Authorization` header (§4.2/§7). A second 401
    /// surfaces to the caller.
    async fn request_with_auth(
        &mut self,
        method: Method,
        extra: impl Fn(
            rtsp_types::RequestBuilder<Method, Version>,
        ) -> rtsp_types::RequestBuilder<Method, Version>,
        body: Vec<u8>,
        auth: Option<(&str, &str)>,
        deadline: Duration,
    ) -> Result<Response<Vec<u8>>> {
        let cseq = self.next_cseq();
        let builder = extra(
            Request::builder(method, Version::V1_0)
                .request_uri(self.url.clone())
                .header(headers::CSEQ, cseq.to_string())
                .header(headers::USER_AGENT, USER_AGENT),
        );
        let request = builder.build(body.clone());
        self.send(request, deadline).await?;
        let response = self.recv_response(deadline).await?;

        if response.status() != StatusCode::Unauthorized {
            return Ok(response);
        }
        let Some((username, password)) = auth else {
            return Ok(response);
        };
        let Some(header) = response.header(&headers::WWW_AUTHENTICATE) else {
            return Ok(response);
        };
        let challenge = digest::parse_challenge(header.as_str())?;
        let uri = digest::canonical_uri(&self.url)?;
        let auth_header = digest::authorization_header(
            username,
            password,
            &challenge,
            method_name(method),
            &uri,
        );

        let cseq = self.next_cseq();
        let builder = extra(
            Request::builder(method, Version::V1_0)
                .request_uri(self.url.clone())
                .header(headers::CSEQ, cseq.to_string())
                .header(headers::USER_AGENT, USER_AGENT)
                .header(headers::AUTHORIZATION, auth_header),
        );
        let request = builder.build(body);
        self.send(request, deadline).await?;
        self.recv_response(deadline).await
    }
}

fn method_name(method: Method) -> &'static str {
    match method {
        Method::Options => "OPTIONS",
        Method::Describe => "DESCRIBE",
        Method::Setup => "SETUP",
        Method::Play => "PLAY",
        Method::Pause => "PAUSE",
        Method::Record => "RECORD",
        Method::Teardown => "TEARDOWN",
        Method::Announce => "ANNOUNCE",
        _ => "OPTIONS",
    }
}

/// Per-media negotiated transport, used to know which interleaved
/// channel (or UDP pair) a subsequent data frame belongs to.
struct MediaChannels {
    video_data: u8,
    video_ctl: u8,
    audio_data: u8,
    audio_ctl: u8,
}

/// Run the full C5 handshake and hand back a running client plus the
/// parsed session description. The stream loop (demux + keep-alive) is
/// spawned on a background task that forwards packets to `tx` until
/// [`RtspClient::stop`] is called or the connection drops.
pub async fn connect(
    config: ClientConfig,
    credentials: Option<(String, String)>,
    tx: mpsc::UnboundedSender<RtpPacket>,
) -> Result<(RtspClient, SessionDescriptor, bytes::Bytes)> {
    let mut hs = Handshake::dial(&config.url, config.timeout).await?;
    let auth = credentials.as_ref().map(|(u, p)| (u.as_str(), p.as_str()));

    // OPTIONS with Require: implicit-play.
    let resp = hs
        .request_with_auth(
            Method::Options,
            |b| b.header(headers::REQUIRE, "implicit-play"),
            vec![],
            auth,
            config.timeout,
        )
        .await?;
    if resp.status() != StatusCode::Ok {
        bail!("OPTIONS failed: {}", resp.status());
    }

    // DESCRIBE.
    let resp = hs
        .request_with_auth(
            Method::Describe,
            |b| b.header(headers::ACCEPT, "application/sdp"),
            vec![],
            auth,
            config.timeout,
        )
        .await?;
    if resp.status() != StatusCode::Ok {
        bail!("DESCRIBE failed: {}", resp.status());
    }
    let sdp_bytes = resp.body().clone();
    let sdp = sdp::parse(&sdp_bytes)?;

    let base_url = config.url.to_string();
    let peer_ip: IpAddr = config
        .url
        .host_str()
        .ok_or_else(|| anyhow!("no host in URL"))?
        .parse()
        .context("RTSP host must be an IP literal for UDP peer resolution")?;

    let mut udp_video = None;
    let mut udp_audio = None;
    let channels = MediaChannels {
        video_data: 0,
        video_ctl: 1,
        audio_data: 2,
        audio_ctl: 3,
    };

    // SETUP video first, then audio, per §4.4 step 4.
    for (is_video, media) in [
        (true, sdp.video()),
        (false, sdp.audio()),
    ] {
        let Some(media) = media else { continue };
        let Some(control) = &media.control else {
            warn!("media has no control attribute, skipping SETUP");
            continue;
        };
        let control_url = sdp::resolve_control_url(&base_url, control);

        match config.transport {
            ClientTransport::TcpInterleaved => {
                let (data_ch, ctl_ch) = if is_video {
                    (channels.video_data, channels.video_ctl)
                } else {
                    (channels.audio_data, channels.audio_ctl)
                };
                let transport_header =
                    format!("RTP/AVP/TCP;unicast;interleaved={data_ch}-{ctl_ch}");
                setup_one(&mut hs, &control_url, &transport_header, auth, config.timeout).await?;
            }
            ClientTransport::Udp => {
                let bind_ip = unspecified_for_ip(&peer_ip);
                let buf_sizes = if is_video {
                    config.video_buf_sizes
                } else {
                    config.audio_buf_sizes
                };
                let pair = UdpPair::bind_ephemeral(bind_ip, buf_sizes).await?;
                let transport_header = format!(
                    "RTP/AVP/UDP;unicast;client_port={}-{}",
                    pair.data_port()?,
                    pair.control_port()?
                );
                let resp =
                    setup_one(&mut hs, &control_url, &transport_header, auth, config.timeout)
                        .await?;
                let transport = resp
                    .header(&headers::TRANSPORT)
                    .ok_or_else(|| anyhow!("SETUP response missing Transport"))?
                    .as_str();
                let (server_data_port, server_ctl_port) = parse_server_port(transport)?;

                pair.data.connect((peer_ip, server_data_port)).await?;
                pair.control.connect((peer_ip, server_ctl_port)).await?;

                if is_video {
                    udp_video = Some(pair);
                } else {
                    udp_audio = Some(pair);
                }
            }
        }
    }

    // PLAY.
    let session_id = hs.session_id.clone().ok_or_else(|| anyhow!("no Session set by SETUP"))?;
    let resp = hs
        .request_with_auth(
            Method::Play,
            |b| b.header(headers::SESSION, session_id.clone()),
            vec![],
            auth,
            config.timeout,
        )
        .await?;
    if resp.status() != StatusCode::Ok {
        bail!("PLAY failed: {}", resp.status());
    }

    let stopped = Arc::new(AtomicBool::new(false));
    let (read_half, write_half) = tokio::io::split(hs.stream);
    let write_half = Arc::new(Mutex::new(write_half));

    let client = RtspClient {
        stopped: stopped.clone(),
        write_half: write_half.clone(),
    };

    match config.transport {
        ClientTransport::TcpInterleaved => {
            tokio::spawn(tcp_stream_loop(
                read_half,
                write_half,
                stopped,
                tx,
                config.option_interval,
                hs.url.clone(),
                session_id,
            ));
        }
        ClientTransport::Udp => {
            // UDP SETUP disables the TCP read deadline (§4.4 step 4); the
            // TCP half is still read for OPTIONS keep-alive responses and
            // unsolicited teardown notices.
            tokio::spawn(tcp_idle_loop(read_half, stopped.clone()));
            if let Some(pair) = udp_video {
                tokio::spawn(udp_reader_loop(pair, FrameKind::VideoData, FrameKind::VideoCtl, stopped.clone(), tx.clone()));
            }
            if let Some(pair) = udp_audio {
                tokio::spawn(udp_reader_loop(pair, FrameKind::AudioData, FrameKind::AudioCtl, stopped.clone(), tx.clone()));
            }
            if let Some(interval) = config.option_interval {
                tokio::spawn(options_keepalive(write_half, interval, hs.url, session_id, stopped));
            }
        }
    }

    Ok((client, sdp, bytes::Bytes::from(sdp_bytes)))
}

async fn setup_one(
    hs: &mut Handshake,
    control_url: &str,
    transport_header: &str,
    auth: Option<(&str, &str)>,
    deadline: Duration,
) -> Result<Response<Vec<u8>>> {
    let original_url = std::mem::replace(&mut hs.url, control_url.parse()?);
    let session_id = hs.session_id.clone();
    let resp = hs
        .request_with_auth(
            Method::Setup,
            |b| {
                let b = b.header(headers::TRANSPORT, transport_header);
                match &session_id {
                    Some(sid) => b.header(headers::SESSION, sid.clone()),
                    None => b,
                }
            },
            vec![],
            auth,
            deadline,
        )
        .await;
    hs.url = original_url;
    let resp = resp?;
    if resp.status() != StatusCode::Ok {
        bail!("SETUP failed: {}", resp.status());
    }
    if hs.session_id.is_none()
        && let Some(session_header) = resp.header(&headers::SESSION)
    {
        let id = session_header.as_str().split(';').next().unwrap_or("").to_string();
        hs.session_id = Some(id);
    }
    Ok(resp)
}

fn parse_server_port(transport: &str) -> Result<(u16, u16)> {
    for part in transport.split(';') {
        if let Some(ports) = part.trim().strip_prefix("server_port=") {
            let mut it = ports.split('-');
            let data = it.next().and_then(|s| s.parse().ok()).ok_or_else(|| anyhow!("bad server_port"))?;
            let ctl = it.next().and_then(|s| s.parse().ok()).ok_or_else(|| anyhow!("bad server_port"))?;
            return Ok((data, ctl));
        }
    }
    Err(anyhow!("no server_port in Transport header"))
}

/// Tracks the last observed RTP sequence number per channel so the demux
/// can log out-of-order/dropped delivery (§4.4, debug-only).
struct SeqTracker {
    last: AtomicU16,
    have_last: AtomicBool,
}

impl SeqTracker {
    fn new() -> Self {
        Self {
            last: AtomicU16::new(0),
            have_last: AtomicBool::new(false),
        }
    }

    fn observe(&self, channel_label: &str, packet: &RtpPacket) {
        let Some(seq) = packet.sequence_number() else { return };
        if self.have_last.swap(true, Ordering::Relaxed) {
            let expected = self.last.load(Ordering::Relaxed).wrapping_add(1);
            if seq != expected {
                debug!(channel = channel_label, expected, got = seq, "out-of-order or dropped RTP sequence");
            }
        }
        self.last.store(seq, Ordering::Relaxed);
    }
}

async fn tcp_stream_loop(
    mut read_half: ReadHalf<TcpStream>,
    write_half: Arc<Mutex<WriteHalf<TcpStream>>>,
    stopped: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<RtpPacket>,
    option_interval: Option<Duration>,
    url: Url,
    session_id: String,
) {
    let video_tracker = SeqTracker::new();
    let audio_tracker = SeqTracker::new();
    let mut buf = BytesMut::with_capacity(64 * 1024);
    let mut read_buf = vec![0u8; 64 * 1024];
    let mut cseq = 1000u32;
    let mut last_frame = tokio::time::Instant::now();

    loop {
        if stopped.load(Ordering::SeqCst) {
            break;
        }

        let read_fut = read_half.read(&mut read_buf);
        let sleep_for = option_interval
            .map(|iv| iv.saturating_sub(last_frame.elapsed()))
            .unwrap_or(Duration::from_secs(3600));

        tokio::select! {
            result = read_fut => {
                match result {
                    Ok(0) => { info!("upstream RTSP connection closed"); break; }
                    Ok(n) => {
                        buf.extend_from_slice(&read_buf[..n]);
                        last_frame = tokio::time::Instant::now();
                    }
                    Err(e) => {
                        if !stopped.load(Ordering::SeqCst) {
                            warn!("RTSP read error: {e}");
                        }
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(sleep_for) => {
                if let Some(_iv) = option_interval {
                    cseq += 1;
                    let request = Request::builder(Method::Options, Version::V1_0)
                        .request_uri(url.clone())
                        .header(headers::CSEQ, cseq.to_string())
                        .header(headers::SESSION, session_id.clone())
                        .header(headers::USER_AGENT, USER_AGENT)
                        .build(vec![]);
                    let mut out = Vec::new();
                    if request.write(&mut out).is_ok() {
                        let mut w = write_half.lock().await;
                        let _ = w.write_all(&out).await;
                    }
                    last_frame = tokio::time::Instant::now();
                }
                continue;
            }
        }

        loop {
            match codec::next_frame(&mut buf) {
                Ok(Some(Frame::Interleaved { channel, payload })) => {
                    let (kind, tracker) = match channel {
                        0 => (FrameKind::VideoData, &video_tracker),
                        1 => (FrameKind::VideoCtl, &video_tracker),
                        2 => (FrameKind::AudioData, &audio_tracker),
                        3 => (FrameKind::AudioCtl, &audio_tracker),
                        _ => continue,
                    };
                    let packet = RtpPacket::new(kind, payload);
                    tracker.observe(if channel < 2 { "video" } else { "audio" }, &packet);
                    if tx.send(packet).is_err() {
                        return;
                    }
                }
                Ok(Some(Frame::Message(_))) => continue,
                Ok(None) => break,
                Err(e) => {
                    warn!("malformed data on RTSP stream: {e}");
                    buf.clear();
                    break;
                }
            }
        }
    }
}

async fn tcp_idle_loop(mut read_half: ReadHalf<TcpStream>, stopped: Arc<AtomicBool>) {
    let mut buf = vec![0u8; 4096];
    loop {
        match read_half.read(&mut buf).await {
            Ok(0) => break,
            Ok(_) => continue,
            Err(_) => break,
        }
        if stopped.load(Ordering::SeqCst) {
            break;
        }
    }
}

async fn udp_reader_loop(
    pair: UdpPair,
    data_kind: FrameKind,
    ctl_kind: FrameKind,
    stopped: Arc<AtomicBool>,
    tx: mpsc::UnboundedSender<RtpPacket>,
) {
    let tracker = SeqTracker::new();
    let mut data_buf = UdpPair::new_read_buf();
    let mut ctl_buf = UdpPair::new_read_buf();
    loop {
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        tokio::select! {
            result = pair.recv_data(&mut data_buf) => {
                match result {
                    Ok(payload) => {
                        let packet = RtpPacket::new(data_kind, payload);
                        tracker.observe("udp", &packet);
                        if tx.send(packet).is_err() { break; }
                    }
                    Err(_) if stopped.load(Ordering::SeqCst) => break,
                    Err(e) => { warn!("UDP data read error: {e}"); break; }
                }
            }
            result = pair.recv_control(&mut ctl_buf) => {
                match result {
                    Ok(payload) => {
                        if tx.send(RtpPacket::new(ctl_kind, payload)).is_err() { break; }
                    }
                    Err(_) if stopped.load(Ordering::SeqCst) => break,
                    Err(e) => { warn!("UDP control read error: {e}"); break; }
                }
            }
        }
    }
}

async fn options_keepalive(
    write_half: Arc<Mutex<WriteHalf<TcpStream>>>,
    interval: Duration,
    url: Url,
    session_id: String,
    stopped: Arc<AtomicBool>,
) {
    let mut cseq = 2000u32;
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        if stopped.load(Ordering::SeqCst) {
            break;
        }
        cseq += 1;
        let request = Request::builder(Method::Options, Version::V1_0)
            .request_uri(url.clone())
            .header(headers::CSEQ, cseq.to_string())
            .header(headers::SESSION, session_id.clone())
            .header(headers::USER_AGENT, USER_AGENT)
            .build(vec![]);
        let mut out = Vec::new();
        if request.write(&mut out).is_err() {
            continue;
        }
        let mut w = write_half.lock().await;
        if w.write_all(&out).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_server_port_extracts_both_ports() {
        let (data, ctl) = parse_server_port("RTP/AVP/UDP;unicast;client_port=3456-3457;server_port=6970-6971").unwrap();
        assert_eq!((data, ctl), (6970, 6971));
    }

    #[test]
    fn parse_server_port_errors_when_absent() {
        assert!(parse_server_port("RTP/AVP/TCP;unicast;interleaved=0-1").is_err());
    }
}
