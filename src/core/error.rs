//! Error types for the RANET protocol.

use thiserror::Error;

/// Errors that can occur while decoding or encoding wire packets.
///
/// Codec errors never cross the connection boundary: a packet that fails to
/// decode is logged and dropped per the protocol's error policy.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input data is shorter than required.
    #[error("packet too short: expected {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum bytes required.
        expected: usize,
        /// Actual bytes available.
        actual: usize,
    },

    /// Unknown top-level packet discriminator.
    #[error("unknown packet id: 0x{0:02x}")]
    UnknownPacketId(u8),

    /// Reliability bits decode to no known delivery flavor.
    #[error("invalid reliability: {0}")]
    InvalidReliability(u8),

    /// Address field carries an unsupported family byte.
    #[error("invalid address family: {0}")]
    InvalidAddressFamily(u8),

    /// Offline packet does not carry the magic token.
    #[error("missing offline magic")]
    InvalidMagic,

    /// String field is not valid UTF-8.
    #[error("invalid utf-8 in string field")]
    InvalidString,
}

/// Errors that can occur in the RANET server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the UDP socket at startup. Fatal, reported once.
    #[error("bind failed: {0}")]
    BindFailed(String),

    /// I/O error on the socket.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server is shut down.
    #[error("server shut down")]
    Shutdown,
}
