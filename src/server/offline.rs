//! Offline (pre-connection) packet handling.
//!
//! Answers discovery pings and drives the two-step MTU/GUID negotiation
//! that precedes every connection. The handler performs no I/O: it maps one
//! inbound datagram to at most one reply, plus an instruction to establish
//! a connection when the handshake completes.

use std::net::SocketAddr;

use log::debug;

use crate::core::constants::{MAX_MTU_SIZE, MIN_MTU_SIZE};
use crate::protocol::offline::{
    IncompatibleProtocol, OpenConnectionReply1, OpenConnectionReply2, OpenConnectionRequest1,
    OpenConnectionRequest2, UnconnectedPing, UnconnectedPong,
};

/// Identity the server presents during the offline handshake.
#[derive(Debug, Clone)]
pub struct OfflineConfig {
    /// Server GUID echoed in every offline reply.
    pub guid: u64,
    /// Advertised message of the day, returned in pong replies.
    pub motd: String,
    /// Protocol version the server accepts.
    pub protocol_version: u8,
}

/// What to do with an offline datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OfflineAction {
    /// Send this reply datagram back to the sender.
    Reply(Vec<u8>),
    /// Handshake complete: send the reply and establish a connection.
    Accept {
        /// Final handshake reply datagram.
        reply: Vec<u8>,
        /// Client GUID from the request.
        guid: u64,
        /// Negotiated MTU, already clamped to the supported range.
        mtu: u16,
    },
}

/// Stateless responder for the offline protocol.
#[derive(Debug)]
pub struct OfflineHandler {
    config: OfflineConfig,
}

impl OfflineHandler {
    /// Create a handler with the given identity.
    pub fn new(config: OfflineConfig) -> Self {
        Self { config }
    }

    /// The server's GUID.
    pub fn guid(&self) -> u64 {
        self.config.guid
    }

    /// Process one datagram from an unconnected address.
    ///
    /// Unknown discriminators, bad magic and short packets yield `None`;
    /// offline traffic is never answered with an error.
    pub fn handle(&self, data: &[u8], addr: SocketAddr) -> Option<OfflineAction> {
        match data.first()? {
            &UnconnectedPing::ID => self.handle_ping(data, addr),
            &OpenConnectionRequest1::ID => self.handle_request1(data, addr),
            &OpenConnectionRequest2::ID => self.handle_request2(data, addr),
            id => {
                debug!("{addr}: unhandled offline packet 0x{id:02x}");
                None
            }
        }
    }

    fn handle_ping(&self, data: &[u8], addr: SocketAddr) -> Option<OfflineAction> {
        let ping = match UnconnectedPing::decode(data) {
            Ok(ping) => ping,
            Err(err) => {
                debug!("{addr}: dropping malformed ping: {err}");
                return None;
            }
        };
        let pong = UnconnectedPong {
            timestamp: ping.timestamp,
            server_guid: self.config.guid,
            motd: self.config.motd.clone(),
        };
        Some(OfflineAction::Reply(pong.encode()))
    }

    fn handle_request1(&self, data: &[u8], addr: SocketAddr) -> Option<OfflineAction> {
        let request = match OpenConnectionRequest1::decode(data) {
            Ok(request) => request,
            Err(err) => {
                debug!("{addr}: dropping malformed connection request 1: {err}");
                return None;
            }
        };
        if request.protocol != self.config.protocol_version {
            debug!(
                "{addr}: protocol {} not supported (want {})",
                request.protocol, self.config.protocol_version
            );
            let reply = IncompatibleProtocol {
                protocol: self.config.protocol_version,
                server_guid: self.config.guid,
            };
            return Some(OfflineAction::Reply(reply.encode()));
        }
        let reply = OpenConnectionReply1 {
            server_guid: self.config.guid,
            use_security: false,
            mtu: request.mtu.clamp(MIN_MTU_SIZE, MAX_MTU_SIZE),
        };
        Some(OfflineAction::Reply(reply.encode()))
    }

    fn handle_request2(&self, data: &[u8], addr: SocketAddr) -> Option<OfflineAction> {
        let request = match OpenConnectionRequest2::decode(data) {
            Ok(request) => request,
            Err(err) => {
                debug!("{addr}: dropping malformed connection request 2: {err}");
                return None;
            }
        };
        let mtu = request.mtu.clamp(MIN_MTU_SIZE, MAX_MTU_SIZE);
        let reply = OpenConnectionReply2 {
            server_guid: self.config.guid,
            client_address: addr,
            mtu,
            use_encryption: false,
        };
        Some(OfflineAction::Accept {
            reply: reply.encode(),
            guid: request.client_guid,
            mtu,
        })
    }
}
