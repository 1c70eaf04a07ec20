//! Async UDP socket wrapper for the RANET transport.
//!
//! Thin tokio wrapper owning the receive buffer, so the server loop deals in
//! `&[u8]` slices instead of buffer management.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

/// Default receive buffer size; a full UDP datagram always fits.
pub const DEFAULT_RECV_BUFFER_SIZE: usize = 65535;

/// Async UDP socket wrapper.
#[derive(Debug)]
pub struct RanetSocket {
    /// The underlying UDP socket.
    socket: UdpSocket,
    /// Receive buffer.
    recv_buffer: Vec<u8>,
}

impl RanetSocket {
    /// Create a socket bound to the given address.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        Ok(Self::from_socket(socket))
    }

    /// Wrap an existing UDP socket.
    pub fn from_socket(socket: UdpSocket) -> Self {
        Self {
            socket,
            recv_buffer: vec![0u8; DEFAULT_RECV_BUFFER_SIZE],
        }
    }

    /// Local address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Send one datagram to a specific address.
    pub async fn send_to(&self, data: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(data, addr).await
    }

    /// Receive one datagram and return it with the sender's address.
    pub async fn recv_from(&mut self) -> io::Result<(&[u8], SocketAddr)> {
        let (len, addr) = self.socket.recv_from(&mut self.recv_buffer).await?;
        Ok((&self.recv_buffer[..len], addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_socket_bind() {
        let socket = RanetSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        assert!(socket.local_addr().unwrap().port() != 0);
    }

    #[tokio::test]
    async fn test_socket_send_recv() {
        let mut server = RanetSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let server_addr = server.local_addr().unwrap();

        let client = RanetSocket::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        client.send_to(b"unconnected ping", server_addr).await.unwrap();

        let (received, from) = server.recv_from().await.unwrap();
        assert_eq!(received, b"unconnected ping");
        assert_eq!(from, client.local_addr().unwrap());
    }
}
