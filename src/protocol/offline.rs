//! Offline handshake packets.
//!
//! These precede the existence of a `Connection` and negotiate MTU and
//! GUIDs. Every offline packet carries the fixed 16-byte magic token;
//! decoding verifies it.

use std::net::SocketAddr;

use crate::core::CodecError;
use crate::core::constants::UDP_HEADER_SIZE;

use super::codec::{Reader, Writer};

/// Liveness probe from a prospective client (`0x01`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnconnectedPing {
    /// Client timestamp in milliseconds.
    pub timestamp: i64,
    /// Client GUID.
    pub client_guid: u64,
}

impl UnconnectedPing {
    /// Packet discriminator byte.
    pub const ID: u8 = 0x01;

    /// Serialize to a datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(Self::ID);
        w.write_i64_be(self.timestamp);
        w.write_magic();
        w.write_u64_be(self.client_guid);
        w.into_bytes()
    }

    /// Parse a ping datagram.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let _id = r.read_u8()?;
        let timestamp = r.read_i64_be()?;
        r.read_magic()?;
        Ok(Self {
            timestamp,
            client_guid: r.read_u64_be()?,
        })
    }
}

/// Liveness answer carrying the server description string (`0x1C`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnconnectedPong {
    /// Timestamp echoed from the ping.
    pub timestamp: i64,
    /// Server GUID.
    pub server_guid: u64,
    /// Server description (motd) string.
    pub motd: String,
}

impl UnconnectedPong {
    /// Packet discriminator byte.
    pub const ID: u8 = 0x1c;

    /// Serialize to a datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(Self::ID);
        w.write_i64_be(self.timestamp);
        w.write_u64_be(self.server_guid);
        w.write_magic();
        w.write_string(&self.motd);
        w.into_bytes()
    }

    /// Parse a pong datagram.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let _id = r.read_u8()?;
        let timestamp = r.read_i64_be()?;
        let server_guid = r.read_u64_be()?;
        r.read_magic()?;
        Ok(Self {
            timestamp,
            server_guid,
            motd: r.read_string()?,
        })
    }
}

/// First open-connection request: protocol version plus MTU probe (`0x05`).
///
/// The datagram is padded with zeros; the probed MTU is the datagram length
/// plus the UDP header size, recovered on decode rather than carried as a
/// field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenConnectionRequest1 {
    /// Client protocol version.
    pub protocol: u8,
    /// Probed MTU (datagram length + UDP header size), unclamped.
    pub mtu: u16,
}

impl OpenConnectionRequest1 {
    /// Packet discriminator byte.
    pub const ID: u8 = 0x05;

    /// Serialize to a datagram padded out to probe `self.mtu`.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(Self::ID);
        w.write_magic();
        w.write_u8(self.protocol);
        let target = usize::from(self.mtu).saturating_sub(UDP_HEADER_SIZE);
        while w.len() < target {
            w.write_u8(0);
        }
        w.into_bytes()
    }

    /// Parse a request, recovering the probed MTU from the datagram length.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let _id = r.read_u8()?;
        r.read_magic()?;
        let protocol = r.read_u8()?;
        let mtu = (data.len() + UDP_HEADER_SIZE).min(usize::from(u16::MAX)) as u16;
        Ok(Self { protocol, mtu })
    }
}

/// Answer to [`OpenConnectionRequest1`] with the clamped MTU (`0x06`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenConnectionReply1 {
    /// Server GUID.
    pub server_guid: u64,
    /// Whether the server requires the security layer (always false here).
    pub use_security: bool,
    /// MTU the server is willing to use.
    pub mtu: u16,
}

impl OpenConnectionReply1 {
    /// Packet discriminator byte.
    pub const ID: u8 = 0x06;

    /// Serialize to a datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(Self::ID);
        w.write_magic();
        w.write_u64_be(self.server_guid);
        w.write_bool(self.use_security);
        w.write_u16_be(self.mtu);
        w.into_bytes()
    }

    /// Parse a reply datagram.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let _id = r.read_u8()?;
        r.read_magic()?;
        Ok(Self {
            server_guid: r.read_u64_be()?,
            use_security: r.read_bool()?,
            mtu: r.read_u16_be()?,
        })
    }
}

/// Second open-connection request: final MTU and client GUID (`0x07`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenConnectionRequest2 {
    /// The server address the client is connecting to.
    pub server_address: SocketAddr,
    /// Negotiated MTU.
    pub mtu: u16,
    /// Client GUID.
    pub client_guid: u64,
}

impl OpenConnectionRequest2 {
    /// Packet discriminator byte.
    pub const ID: u8 = 0x07;

    /// Serialize to a datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(Self::ID);
        w.write_magic();
        w.write_address(&self.server_address);
        w.write_u16_be(self.mtu);
        w.write_u64_be(self.client_guid);
        w.into_bytes()
    }

    /// Parse a request datagram.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let _id = r.read_u8()?;
        r.read_magic()?;
        Ok(Self {
            server_address: r.read_address()?,
            mtu: r.read_u16_be()?,
            client_guid: r.read_u64_be()?,
        })
    }
}

/// Final handshake answer: connection parameters are settled (`0x08`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenConnectionReply2 {
    /// Server GUID.
    pub server_guid: u64,
    /// The client's address as seen by the server.
    pub client_address: SocketAddr,
    /// Final negotiated MTU.
    pub mtu: u16,
    /// Whether encryption is enabled (always false here).
    pub use_encryption: bool,
}

impl OpenConnectionReply2 {
    /// Packet discriminator byte.
    pub const ID: u8 = 0x08;

    /// Serialize to a datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(Self::ID);
        w.write_magic();
        w.write_u64_be(self.server_guid);
        w.write_address(&self.client_address);
        w.write_u16_be(self.mtu);
        w.write_bool(self.use_encryption);
        w.into_bytes()
    }

    /// Parse a reply datagram.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let _id = r.read_u8()?;
        r.read_magic()?;
        Ok(Self {
            server_guid: r.read_u64_be()?,
            client_address: r.read_address()?,
            mtu: r.read_u16_be()?,
            use_encryption: r.read_bool()?,
        })
    }
}

/// Version-mismatch rejection (`0x19`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncompatibleProtocol {
    /// Protocol version the server speaks.
    pub protocol: u8,
    /// Server GUID.
    pub server_guid: u64,
}

impl IncompatibleProtocol {
    /// Packet discriminator byte.
    pub const ID: u8 = 0x19;

    /// Serialize to a datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::new();
        w.write_u8(Self::ID);
        w.write_u8(self.protocol);
        w.write_magic();
        w.write_u64_be(self.server_guid);
        w.into_bytes()
    }

    /// Parse a rejection datagram.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let _id = r.read_u8()?;
        let protocol = r.read_u8()?;
        r.read_magic()?;
        Ok(Self {
            protocol,
            server_guid: r.read_u64_be()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::{MAX_MTU_SIZE, OFFLINE_MAGIC};

    #[test]
    fn test_unconnected_ping_roundtrip() {
        let ping = UnconnectedPing {
            timestamp: 777,
            client_guid: 0x1122_3344_5566_7788,
        };
        let bytes = ping.encode();
        assert_eq!(bytes[0], 0x01);
        assert_eq!(&bytes[9..25], &OFFLINE_MAGIC);
        assert_eq!(UnconnectedPing::decode(&bytes).unwrap(), ping);
    }

    #[test]
    fn test_unconnected_ping_wire_layout() {
        let ping = UnconnectedPing {
            timestamp: 777,
            client_guid: 0x1122_3344_5566_7788,
        };
        let expected = hex::decode(concat!(
            "01",                               // packet id
            "0000000000000309",                 // timestamp, i64 BE
            "00ffff00fefefefefdfdfdfd12345678", // offline magic
            "1122334455667788",                 // client guid, u64 BE
        ))
        .unwrap();
        assert_eq!(ping.encode(), expected);
    }

    #[test]
    fn test_unconnected_pong_roundtrip() {
        let pong = UnconnectedPong {
            timestamp: 777,
            server_guid: 42,
            motd: "RANET;demo;0;10".to_string(),
        };
        assert_eq!(UnconnectedPong::decode(&pong.encode()).unwrap(), pong);
    }

    #[test]
    fn test_request1_mtu_probe() {
        let request = OpenConnectionRequest1 {
            protocol: 11,
            mtu: 1200,
        };
        let bytes = request.encode();
        assert_eq!(bytes.len(), 1200 - UDP_HEADER_SIZE);

        let decoded = OpenConnectionRequest1::decode(&bytes).unwrap();
        assert_eq!(decoded.protocol, 11);
        assert_eq!(decoded.mtu, 1200);
    }

    #[test]
    fn test_request1_oversized_probe_decodes() {
        let request = OpenConnectionRequest1 {
            protocol: 11,
            mtu: MAX_MTU_SIZE + 300,
        };
        let decoded = OpenConnectionRequest1::decode(&request.encode()).unwrap();
        // Clamping to MAX_MTU_SIZE is the handshake handler's job.
        assert_eq!(decoded.mtu, MAX_MTU_SIZE + 300);
    }

    #[test]
    fn test_reply1_roundtrip() {
        let reply = OpenConnectionReply1 {
            server_guid: 99,
            use_security: false,
            mtu: 1492,
        };
        assert_eq!(OpenConnectionReply1::decode(&reply.encode()).unwrap(), reply);
    }

    #[test]
    fn test_request2_reply2_roundtrip() {
        let request = OpenConnectionRequest2 {
            server_address: "203.0.113.4:19132".parse().unwrap(),
            mtu: 1400,
            client_guid: 7,
        };
        assert_eq!(
            OpenConnectionRequest2::decode(&request.encode()).unwrap(),
            request
        );

        let reply = OpenConnectionReply2 {
            server_guid: 99,
            client_address: "198.51.100.9:54021".parse().unwrap(),
            mtu: 1400,
            use_encryption: false,
        };
        assert_eq!(
            OpenConnectionReply2::decode(&reply.encode()).unwrap(),
            reply
        );
    }

    #[test]
    fn test_incompatible_protocol_roundtrip() {
        let decline = IncompatibleProtocol {
            protocol: 11,
            server_guid: 5,
        };
        assert_eq!(
            IncompatibleProtocol::decode(&decline.encode()).unwrap(),
            decline
        );
    }

    #[test]
    fn test_bad_magic_rejected() {
        let ping = UnconnectedPing {
            timestamp: 1,
            client_guid: 2,
        };
        let mut bytes = ping.encode();
        bytes[10] ^= 0xff;
        assert_eq!(
            UnconnectedPing::decode(&bytes),
            Err(CodecError::InvalidMagic)
        );
    }
}
