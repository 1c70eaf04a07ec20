//! Core traits for the RANET protocol.
//!
//! The server notifies its owner about connection lifecycle and delivered
//! messages through [`ConnectionHandler`], invoked synchronously from the
//! owning loop.

use std::net::SocketAddr;

/// Identity of a remote peer as seen by the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerInfo {
    /// Remote address, port and family.
    pub addr: SocketAddr,
    /// GUID exchanged during the offline handshake.
    pub guid: u64,
}

/// Hooks invoked by the server loop for connection lifecycle and payloads.
///
/// All hooks run synchronously on the server's single logical thread of
/// control; implementations should hand heavy work off elsewhere.
///
/// # Example
///
/// ```ignore
/// struct Echo;
///
/// impl ConnectionHandler for Echo {
///     fn on_message(&mut self, peer: &PeerInfo, payload: &[u8]) {
///         println!("{} sent {} bytes", peer.addr, payload.len());
///     }
/// }
/// ```
pub trait ConnectionHandler: Send {
    /// A peer completed the connection handshake.
    fn on_connect(&mut self, peer: &PeerInfo) {
        let _ = peer;
    }

    /// A peer disconnected (gracefully or by rejection).
    fn on_disconnect(&mut self, peer: &PeerInfo) {
        let _ = peer;
    }

    /// A reassembled application payload arrived from a connected peer.
    fn on_message(&mut self, peer: &PeerInfo, payload: &[u8]) {
        let _ = (peer, payload);
    }
}

/// No-op handler for servers that only need the transport running.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl ConnectionHandler for NullHandler {}
