//! Connected-mode packets carried inside frames.
//!
//! These travel as frame bodies once a connection exists: the connection
//! handshake pair, keep-alive ping/pong and the disconnect notice. Each type
//! carries explicit encode/decode functions; the id byte is always checked
//! on decode.

use std::net::SocketAddr;

use crate::core::CodecError;

use super::codec::{Reader, Writer};

fn expect_id(r: &mut Reader<'_>, id: u8) -> Result<(), CodecError> {
    let actual = r.read_u8()?;
    if actual != id {
        return Err(CodecError::UnknownPacketId(actual));
    }
    Ok(())
}

/// Keep-alive ping from the peer (`0x00`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectedPing {
    /// Sender timestamp in milliseconds.
    pub timestamp: i64,
}

impl ConnectedPing {
    /// Packet discriminator byte.
    pub const ID: u8 = 0x00;

    /// Serialize to a frame body.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(9);
        w.write_u8(Self::ID);
        w.write_i64_be(self.timestamp);
        w.into_bytes()
    }

    /// Parse from a frame body.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        expect_id(&mut r, Self::ID)?;
        Ok(Self {
            timestamp: r.read_i64_be()?,
        })
    }
}

/// Keep-alive answer (`0x03`), echoing the ping timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectedPong {
    /// Timestamp echoed from the ping.
    pub ping_timestamp: i64,
    /// Responder timestamp in milliseconds.
    pub timestamp: i64,
}

impl ConnectedPong {
    /// Packet discriminator byte.
    pub const ID: u8 = 0x03;

    /// Serialize to a frame body.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(17);
        w.write_u8(Self::ID);
        w.write_i64_be(self.ping_timestamp);
        w.write_i64_be(self.timestamp);
        w.into_bytes()
    }

    /// Parse from a frame body.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        expect_id(&mut r, Self::ID)?;
        Ok(Self {
            ping_timestamp: r.read_i64_be()?,
            timestamp: r.read_i64_be()?,
        })
    }
}

/// Connection request sent while the peer is still `Connecting` (`0x09`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionRequest {
    /// Client GUID from the offline handshake.
    pub client_guid: u64,
    /// Client timestamp in milliseconds.
    pub timestamp: i64,
}

impl ConnectionRequest {
    /// Packet discriminator byte.
    pub const ID: u8 = 0x09;

    /// Serialize to a frame body.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(17);
        w.write_u8(Self::ID);
        w.write_u64_be(self.client_guid);
        w.write_i64_be(self.timestamp);
        w.into_bytes()
    }

    /// Parse from a frame body.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        expect_id(&mut r, Self::ID)?;
        Ok(Self {
            client_guid: r.read_u64_be()?,
            timestamp: r.read_i64_be()?,
        })
    }
}

/// Acceptance record answering a [`ConnectionRequest`] (`0x10`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionRequestAccepted {
    /// The client's address as the server sees it.
    pub client_address: SocketAddr,
    /// System index assigned to the client.
    pub system_index: u16,
    /// Internal system addresses advertised to the client.
    pub system_addresses: Vec<SocketAddr>,
    /// Timestamp echoed from the request.
    pub request_timestamp: i64,
    /// Server timestamp in milliseconds.
    pub timestamp: i64,
}

impl ConnectionRequestAccepted {
    /// Packet discriminator byte.
    pub const ID: u8 = 0x10;

    /// Serialize to a frame body.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(Self::ID);
        w.write_address(&self.client_address);
        w.write_u16_be(self.system_index);
        for addr in &self.system_addresses {
            w.write_address(addr);
        }
        w.write_i64_be(self.request_timestamp);
        w.write_i64_be(self.timestamp);
        w.into_bytes()
    }

    /// Parse from a frame body.
    ///
    /// The system address list carries no count; addresses are read until
    /// only the two trailing timestamps remain.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        expect_id(&mut r, Self::ID)?;
        let client_address = r.read_address()?;
        let system_index = r.read_u16_be()?;
        let mut system_addresses = Vec::new();
        while r.remaining() > 16 {
            system_addresses.push(r.read_address()?);
        }
        Ok(Self {
            client_address,
            system_index,
            system_addresses,
            request_timestamp: r.read_i64_be()?,
            timestamp: r.read_i64_be()?,
        })
    }
}

/// Confirmation that the client considers the connection established (`0x13`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIncomingConnection {
    /// The server address the client connected to.
    pub server_address: SocketAddr,
    /// The client's internal address.
    pub internal_address: SocketAddr,
}

impl NewIncomingConnection {
    /// Packet discriminator byte.
    pub const ID: u8 = 0x13;

    /// Serialize to a frame body.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(Self::ID);
        w.write_address(&self.server_address);
        w.write_address(&self.internal_address);
        w.into_bytes()
    }

    /// Parse from a frame body.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        expect_id(&mut r, Self::ID)?;
        Ok(Self {
            server_address: r.read_address()?,
            internal_address: r.read_address()?,
        })
    }
}

/// Disconnect notice (`0x15`), carried unreliably at Immediate priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Disconnect;

impl Disconnect {
    /// Packet discriminator byte.
    pub const ID: u8 = 0x15;

    /// Serialize to a frame body.
    pub fn encode(&self) -> Vec<u8> {
        vec![Self::ID]
    }

    /// Parse from a frame body.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        expect_id(&mut r, Self::ID)?;
        Ok(Self)
    }
}
