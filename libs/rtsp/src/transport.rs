//! UDP transport (C4): four unconnected sockets per stream direction --
//! audio/video each split into a data socket and a control (RTCP) socket.
//!
//! Server-side sockets bind to `:0` independently, with no attempt to
//! enforce the RFC 3550 even/odd (data/control) port pairing recommendation
//! -- this is a documented deviation (see SPEC_FULL.md §9's "UDP
//! server-side port pairing" open question): the original source binds
//! each socket independently and no test in this repo depends on parity,
//! so we don't add a bind-retry loop the source never had.

use std::net::{IpAddr, SocketAddr};

use anyhow::{Context, Result};
use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::warn;

use crate::constants::transport::RTP_BUFFER_SIZE;

/// Read/write socket buffer sizes, configurable per stream type and
/// direction per §4.3. `None` leaves the OS default in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketBufSizes {
    pub recv: Option<usize>,
    pub send: Option<usize>,
}

fn apply_buf_sizes(socket: &socket2::Socket, sizes: SocketBufSizes) {
    if let Some(n) = sizes.recv
        && let Err(e) = socket.set_recv_buffer_size(n)
    {
        warn!("SO_RCVBUF failed: {e}");
    }
    if let Some(n) = sizes.send
        && let Err(e) = socket.set_send_buffer_size(n)
    {
        warn!("SO_SNDBUF failed: {e}");
    }
}

fn bind_udp(bind_ip: IpAddr, sizes: SocketBufSizes) -> Result<UdpSocket> {
    use socket2::{Domain, Protocol, Socket, Type};
    let domain = if bind_ip.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
    apply_buf_sizes(&socket, sizes);
    socket.bind(&SocketAddr::new(bind_ip, 0).into())?;
    socket.set_nonblocking(true)?;
    Ok(UdpSocket::from_std(socket.into())?)
}

/// One media direction's data+control socket pair.
pub struct UdpPair {
    pub data: UdpSocket,
    pub control: UdpSocket,
}

impl UdpPair {
    /// Server-side: bind both sockets to an ephemeral kernel-chosen port
    /// (`:0`). The chosen ports are reported back for the `Transport:`
    /// response header.
    pub async fn bind_ephemeral(bind_ip: IpAddr, sizes: SocketBufSizes) -> Result<Self> {
        let data = bind_udp(bind_ip, sizes).context("binding data socket")?;
        let control = bind_udp(bind_ip, sizes).context("binding control socket")?;
        Ok(Self { data, control })
    }

    /// Client-side: bind ephemeral local sockets then connect them to the
    /// peer's negotiated `client_port=` tuple, so `send`/`recv` can be used
    /// without specifying a destination on every call.
    pub async fn dial(
        bind_ip: IpAddr,
        peer: IpAddr,
        peer_data_port: u16,
        peer_control_port: u16,
        sizes: SocketBufSizes,
    ) -> Result<Self> {
        let pair = Self::bind_ephemeral(bind_ip, sizes).await?;
        pair.data
            .connect(SocketAddr::new(peer, peer_data_port))
            .await
            .context("connecting data socket")?;
        pair.control
            .connect(SocketAddr::new(peer, peer_control_port))
            .await
            .context("connecting control socket")?;
        Ok(pair)
    }

    pub fn data_port(&self) -> Result<u16> {
        Ok(self.data.local_addr()?.port())
    }

    pub fn control_port(&self) -> Result<u16> {
        Ok(self.control.local_addr()?.port())
    }

    /// Read one datagram, copying the payload into a right-sized buffer
    /// so its lifetime decouples from the reusable read buffer (per
    /// §4.3).
    pub async fn recv_data(&self, read_buf: &mut [u8]) -> Result<Bytes> {
        let n = self.data.recv(read_buf).await?;
        Ok(Bytes::copy_from_slice(&read_buf[..n]))
    }

    pub async fn recv_control(&self, read_buf: &mut [u8]) -> Result<Bytes> {
        let n = self.control.recv(read_buf).await?;
        Ok(Bytes::copy_from_slice(&read_buf[..n]))
    }

    pub fn new_read_buf() -> Vec<u8> {
        vec![0u8; RTP_BUFFER_SIZE]
    }
}

/// Four-socket bundle for a session with both media types set up, as
/// produced by a full SETUP/SETUP exchange.
pub struct SessionUdpTransport {
    pub video: UdpPair,
    pub audio: UdpPair,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn ephemeral_bind_reports_distinct_ports() {
        let pair = UdpPair::bind_ephemeral("127.0.0.1".parse().unwrap(), SocketBufSizes::default())
            .await
            .unwrap();
        assert_ne!(pair.data_port().unwrap(), pair.control_port().unwrap());
        assert_ne!(pair.data_port().unwrap(), 0);
    }

    #[tokio::test]
    async fn dial_and_bind_can_exchange_a_datagram() {
        let server =
            UdpPair::bind_ephemeral("127.0.0.1".parse().unwrap(), SocketBufSizes::default())
                .await
                .unwrap();
        let server_port = server.data_port().unwrap();

        let client = UdpPair::dial(
            "127.0.0.1".parse().unwrap(),
            "127.0.0.1".parse().unwrap(),
            server_port,
            server.control_port().unwrap(),
            SocketBufSizes::default(),
        )
        .await
        .unwrap();

        client.data.send(b"hello").await.unwrap();
        let mut buf = [0u8; 16];
        let (n, from) = server.data.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello");
        assert_eq!(from.port(), client.data_port().unwrap());
    }
}
