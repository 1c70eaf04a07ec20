//! Byte-level reader and writer for RANET wire packets.
//!
//! Every packet type in this crate encodes and decodes through these two
//! cursors with explicit per-field calls; there is no runtime reflection.
//! Multi-byte integers are big-endian unless a field is documented as
//! little-endian (the 24-bit sequence counters are).

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use crate::core::CodecError;
use crate::core::constants::OFFLINE_MAGIC;

/// Address family tag for IPv6 in the RakNet address encoding (AF_INET6).
const AF_INET6: u16 = 23;

/// Reading cursor over a received datagram.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader over the full buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the cursor has consumed the whole buffer.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Total length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        if self.remaining() < n {
            return Err(CodecError::TooShort {
                expected: self.pos + n,
                actual: self.data.len(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Read a single byte.
    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    /// Read a big-endian u16.
    pub fn read_u16_be(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    /// Read a little-endian 24-bit unsigned integer.
    pub fn read_u24_le(&mut self) -> Result<u32, CodecError> {
        let b = self.take(3)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], 0]))
    }

    /// Read a big-endian u32.
    pub fn read_u32_be(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a big-endian i64 (handshake timestamps).
    pub fn read_i64_be(&mut self) -> Result<i64, CodecError> {
        let b = self.take(8)?;
        Ok(i64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read a big-endian u64 (GUIDs).
    pub fn read_u64_be(&mut self) -> Result<u64, CodecError> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    /// Read a boolean encoded as one byte.
    pub fn read_bool(&mut self) -> Result<bool, CodecError> {
        Ok(self.read_u8()? != 0)
    }

    /// Read exactly `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.take(n)
    }

    /// Consume and return everything left in the buffer.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    /// Read and verify the 16-byte offline magic token.
    pub fn read_magic(&mut self) -> Result<(), CodecError> {
        let bytes = self.take(OFFLINE_MAGIC.len())?;
        if bytes != OFFLINE_MAGIC {
            return Err(CodecError::InvalidMagic);
        }
        Ok(())
    }

    /// Read a u16-BE-length-prefixed UTF-8 string.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_u16_be()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidString)
    }

    /// Read a socket address in RakNet encoding.
    ///
    /// IPv4: version byte 4, four ones-complement octets, u16 BE port.
    /// IPv6: version byte 6, u16 LE family, u16 BE port, u32 BE flow info,
    /// 16 address bytes, u32 BE scope id.
    pub fn read_address(&mut self) -> Result<SocketAddr, CodecError> {
        match self.read_u8()? {
            4 => {
                let b = self.take(4)?;
                let ip = Ipv4Addr::new(!b[0], !b[1], !b[2], !b[3]);
                let port = self.read_u16_be()?;
                Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
            }
            6 => {
                let _family = self.take(2)?;
                let port = self.read_u16_be()?;
                let flow = self.read_u32_be()?;
                let b = self.take(16)?;
                let mut octets = [0u8; 16];
                octets.copy_from_slice(b);
                let scope = self.read_u32_be()?;
                Ok(SocketAddr::V6(SocketAddrV6::new(
                    Ipv6Addr::from(octets),
                    port,
                    flow,
                    scope,
                )))
            }
            other => Err(CodecError::InvalidAddressFamily(other)),
        }
    }
}

/// Writing cursor building an outgoing datagram.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Create a writer with a pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Write a single byte.
    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Write a big-endian u16.
    pub fn write_u16_be(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write the low 24 bits of `value` little-endian.
    pub fn write_u24_le(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes()[..3]);
    }

    /// Write a big-endian u32.
    pub fn write_u32_be(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian i64.
    pub fn write_i64_be(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a big-endian u64.
    pub fn write_u64_be(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Write a boolean as one byte.
    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Write the 16-byte offline magic token.
    pub fn write_magic(&mut self) {
        self.buf.extend_from_slice(&OFFLINE_MAGIC);
    }

    /// Write a u16-BE-length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_u16_be(value.len() as u16);
        self.buf.extend_from_slice(value.as_bytes());
    }

    /// Write a socket address in RakNet encoding (see [`Reader::read_address`]).
    pub fn write_address(&mut self, addr: &SocketAddr) {
        match addr {
            SocketAddr::V4(v4) => {
                self.write_u8(4);
                for octet in v4.ip().octets() {
                    self.write_u8(!octet);
                }
                self.write_u16_be(v4.port());
            }
            SocketAddr::V6(v6) => {
                self.write_u8(6);
                self.buf.extend_from_slice(&AF_INET6.to_le_bytes());
                self.write_u16_be(v6.port());
                self.write_u32_be(v6.flowinfo());
                self.buf.extend_from_slice(&v6.ip().octets());
                self.write_u32_be(v6.scope_id());
            }
        }
    }

    /// Finish and take the built buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}
