//! UDP transport implementation

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::debug;

use crate::{TransportError, TransportResult, DEFAULT_SOCKET_BUFFER, MAX_DATAGRAM_SIZE};

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Kernel receive buffer size in bytes
    pub recv_buffer_size: usize,
    /// Kernel send buffer size in bytes
    pub send_buffer_size: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            recv_buffer_size: DEFAULT_SOCKET_BUFFER,
            send_buffer_size: DEFAULT_SOCKET_BUFFER,
        }
    }
}

/// UDP transport for one stream endpoint.
///
/// The peer address is recorded once at handshake time; after that,
/// `send` is fire-and-forget toward that peer.
pub struct UdpTransport {
    socket: UdpSocket,
    peer: RwLock<Option<SocketAddr>>,
}

impl UdpTransport {
    /// Bind a UDP socket with the configured kernel buffers.
    pub fn bind(addr: SocketAddr, config: &TransportConfig) -> TransportResult<Self> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        socket
            .set_recv_buffer_size(config.recv_buffer_size)
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        socket
            .set_send_buffer_size(config.send_buffer_size)
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        socket
            .set_nonblocking(true)
            .map_err(|e| TransportError::Bind(e.to_string()))?;
        socket
            .bind(&addr.into())
            .map_err(|e| TransportError::Bind(e.to_string()))?;

        let socket = UdpSocket::from_std(socket.into())?;
        debug!("Bound UDP socket on {}", socket.local_addr()?);

        Ok(Self {
            socket,
            peer: RwLock::new(None),
        })
    }

    /// Record the peer all subsequent `send` calls target.
    pub fn connect_peer(&self, addr: SocketAddr) {
        debug!("Recording peer {}", addr);
        *self.peer.write() = Some(addr);
    }

    /// The recorded peer, if the handshake has completed.
    pub fn peer(&self) -> Option<SocketAddr> {
        *self.peer.read()
    }

    /// Local socket address.
    pub fn local_addr(&self) -> TransportResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Send a datagram to the recorded peer, best-effort.
    pub async fn send(&self, data: &[u8]) -> TransportResult<()> {
        let peer = self.peer().ok_or(TransportError::NoPeer)?;
        self.send_to(data, peer).await
    }

    /// Send a datagram to an explicit address.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> TransportResult<()> {
        self.socket
            .send_to(data, addr)
            .await
            .map_err(|e| TransportError::Send(e.to_string()))?;
        Ok(())
    }

    /// Receive one datagram, waiting at most `timeout`.
    ///
    /// Elapsing the timeout is recoverable (`TransportError::Timeout`);
    /// the steady-state loops use a short timeout here so they can poll
    /// the shutdown flag between attempts.
    pub async fn recv_timeout(&self, timeout: Duration) -> TransportResult<(Bytes, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];

        match tokio::time::timeout(timeout, self.socket.recv_from(&mut buf)).await {
            Err(_elapsed) => Err(TransportError::Timeout),
            Ok(Err(e)) => Err(TransportError::ConnectionClosed(e.to_string())),
            Ok(Ok((len, addr))) => {
                buf.truncate(len);
                Ok((Bytes::from(buf), addr))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bind_local() -> UdpTransport {
        UdpTransport::bind("127.0.0.1:0".parse().unwrap(), &TransportConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn datagram_round_trip() {
        let a = bind_local();
        let b = bind_local();

        a.connect_peer(b.local_addr().unwrap());
        a.send(b"hello").await.unwrap();

        let (data, from) = b.recv_timeout(Duration::from_secs(2)).await.unwrap();
        assert_eq!(&data[..], b"hello");
        assert_eq!(from, a.local_addr().unwrap());
    }

    #[tokio::test]
    async fn recv_times_out_quickly() {
        let a = bind_local();
        let err = a.recv_timeout(Duration::from_millis(20)).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout));
        assert!(err.is_recoverable());
    }

    #[tokio::test]
    async fn send_without_peer_is_rejected() {
        let a = bind_local();
        assert!(matches!(
            a.send(b"nope").await,
            Err(TransportError::NoPeer)
        ));
    }
}
