//! Protocol constants for the RANET wire format.
//!
//! The wire-level values are fixed by the RakNet protocol and MUST NOT be
//! changed; the hardening limits at the bottom are local policy.

use std::time::Duration;

// =============================================================================
// OFFLINE HANDSHAKE
// =============================================================================

/// Magic token prefixing every offline (pre-connection) packet.
pub const OFFLINE_MAGIC: [u8; 16] = [
    0x00, 0xff, 0xff, 0x00, 0xfe, 0xfe, 0xfe, 0xfe, 0xfd, 0xfd, 0xfd, 0xfd, 0x12, 0x34, 0x56,
    0x78,
];

/// Protocol version negotiated during the offline handshake.
pub const PROTOCOL_VERSION: u8 = 11;

/// Size of the UDP/IP header, used in MTU-probe arithmetic.
pub const UDP_HEADER_SIZE: usize = 28;

/// Largest MTU the server will ever agree to.
pub const MAX_MTU_SIZE: u16 = 1492;

/// Smallest MTU the server will ever agree to.
pub const MIN_MTU_SIZE: u16 = 400;

// =============================================================================
// CONNECTED PROTOCOL
// =============================================================================

/// Bitflag marking a datagram as belonging to the connected protocol.
pub const FLAG_VALID: u8 = 0x80;

/// Bitflag marking an acknowledgment datagram (`0xC0` together with VALID).
pub const FLAG_ACK: u8 = 0x40;

/// Bitflag marking a negative acknowledgment datagram (`0xA0` with VALID).
pub const FLAG_NACK: u8 = 0x20;

/// Number of independent ordering channels per connection.
pub const ORDER_CHANNEL_COUNT: usize = 32;

/// Frame header bytes counted against the MTU when splitting a body
/// (flags + length + reliable index).
pub const FRAME_HEADER_SIZE: usize = 6;

/// Outer framing and transport overhead counted against the MTU when
/// splitting a body into fragments.
pub const DATAGRAM_OVERHEAD: usize = 23;

/// Margin kept free when packing frames into one outgoing FrameSet.
pub const FRAMESET_MTU_MARGIN: usize = 36;

/// Discriminator for opaque application payloads carried inside frames.
pub const GAME_PACKET_ID: u8 = 0xfe;

// =============================================================================
// TIMING
// =============================================================================

/// Period of the connection tick loop.
pub const TICK_INTERVAL: Duration = Duration::from_millis(50);

// =============================================================================
// HARDENING LIMITS (local policy, not wire format)
// =============================================================================

/// Maximum bytes buffered across all incomplete fragment groups of one
/// connection before new fragments are dropped.
pub const MAX_FRAGMENT_BYTES: usize = 4 * 1024 * 1024;

/// Incomplete fragment groups older than this are evicted on tick.
pub const FRAGMENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum early-arriving ordered frames buffered per channel.
pub const MAX_ORDERING_BACKLOG: usize = 512;

/// Largest forward jump accepted in the inbound FrameSet sequence. A wider
/// gap cannot come from ordinary loss at our tick rate and is treated as a
/// desynchronized or hostile peer; processing it would enumerate every
/// skipped sequence into the NACK set.
pub const MAX_SEQUENCE_GAP: u32 = 4096;
