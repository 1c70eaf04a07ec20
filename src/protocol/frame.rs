//! Frame and FrameSet wire model.
//!
//! A [`Frame`] is the smallest reliability-tagged unit of payload. A
//! [`FrameSet`] bundles one or more frames under a single 24-bit outer
//! sequence number and is the unit actually transmitted, acknowledged and
//! retransmitted.
//!
//! Frame wire format:
//! ```text
//! +--------+-----------------+ ............................................
//! | Flags  | Length in BITS  | reliable idx | sequence idx | order idx+ch |
//! | 1 byte | u16 BE          | u24 LE       | u24 LE       | u24 LE + u8  |
//! +--------+-----------------+ ............................................
//! | fragment size u32 BE | fragment id u16 BE | fragment index u32 BE |
//! +--------------------------------------------------------------------+
//! | body...                                                            |
//! +--------------------------------------------------------------------+
//! ```
//! Conditional fields appear only when the corresponding predicate holds;
//! the top three flag bits carry the reliability, bit 0x10 marks a fragment.

use crate::core::CodecError;
use crate::core::constants::FLAG_VALID;

use super::codec::{Reader, Writer};

/// Flag bit marking a fragmented frame.
const FLAG_FRAGMENTED: u8 = 0x10;

/// Delivery flavor of a frame.
///
/// Determines which reassembly rules apply on the receiving side and which
/// conditional header fields are present on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Reliability {
    /// Fire-and-forget, no ordering, no acknowledgment.
    #[default]
    Unreliable = 0,
    /// Unacknowledged, but stale arrivals on the channel are dropped.
    UnreliableSequenced = 1,
    /// Acknowledged, delivered in arrival order.
    Reliable = 2,
    /// Acknowledged, delivered in strict per-channel order.
    ReliableOrdered = 3,
    /// Acknowledged, stale arrivals on the channel are dropped.
    ReliableSequenced = 4,
}

impl Reliability {
    /// Parse the three reliability bits of a frame flags byte.
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Unreliable),
            1 => Some(Self::UnreliableSequenced),
            2 => Some(Self::Reliable),
            3 => Some(Self::ReliableOrdered),
            4 => Some(Self::ReliableSequenced),
            _ => None,
        }
    }

    /// Whether frames of this flavor require acknowledgment.
    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            Self::Reliable | Self::ReliableOrdered | Self::ReliableSequenced
        )
    }

    /// Whether frames of this flavor carry a sequence index.
    pub fn is_sequenced(self) -> bool {
        matches!(self, Self::UnreliableSequenced | Self::ReliableSequenced)
    }

    /// Whether frames of this flavor carry order fields (sequenced or ordered).
    pub fn is_ordered(self) -> bool {
        matches!(
            self,
            Self::UnreliableSequenced | Self::ReliableSequenced | Self::ReliableOrdered
        )
    }

    /// Strict ordered delivery with no tolerance for gaps or duplicates.
    pub fn is_order_exclusive(self) -> bool {
        matches!(self, Self::ReliableOrdered)
    }
}

/// Fragmentation metadata, present only on fragment frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FragmentMeta {
    /// Total number of fragments in the group.
    pub size: u32,
    /// Group identifier shared by all fragments of one split body.
    pub id: u16,
    /// Position of this fragment within the group.
    pub index: u32,
}

/// A single reliability-tagged unit of payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    /// Delivery flavor.
    pub reliability: Reliability,
    /// 24-bit index, monotonic across all reliable frames of a connection.
    pub reliable_index: u32,
    /// 24-bit per-channel index for sequenced delivery.
    pub sequence_index: u32,
    /// 24-bit per-channel index for ordered delivery.
    pub order_index: u32,
    /// Ordering channel (0-31).
    pub order_channel: u8,
    /// Fragmentation metadata when this frame is a fragment.
    pub fragment: Option<FragmentMeta>,
    /// Payload bytes.
    pub body: Vec<u8>,
}

impl Frame {
    /// Create a frame with the given flavor and body; indices start at zero
    /// and are assigned by the connection when the frame is sent.
    pub fn new(reliability: Reliability, body: Vec<u8>) -> Self {
        Self {
            reliability,
            body,
            ..Self::default()
        }
    }

    /// Whether this frame is one fragment of a split body.
    pub fn is_fragmented(&self) -> bool {
        self.fragment.is_some()
    }

    /// Whether this frame requires acknowledgment.
    pub fn is_reliable(&self) -> bool {
        self.reliability.is_reliable()
    }

    /// Whether this frame participates in sequenced delivery.
    pub fn is_sequenced(&self) -> bool {
        self.reliability.is_sequenced()
    }

    /// Whether this frame carries order fields.
    pub fn is_ordered(&self) -> bool {
        self.reliability.is_ordered()
    }

    /// Whether this frame demands strict ordered delivery.
    pub fn is_order_exclusive(&self) -> bool {
        self.reliability.is_order_exclusive()
    }

    /// Encoded size in bytes, used for MTU packing decisions.
    pub fn byte_len(&self) -> usize {
        let mut len = 3 + self.body.len();
        if self.is_reliable() {
            len += 3;
        }
        if self.is_sequenced() {
            len += 3;
        }
        if self.is_ordered() {
            len += 4;
        }
        if self.is_fragmented() {
            len += 10;
        }
        len
    }

    /// Append the wire encoding of this frame.
    pub fn encode(&self, w: &mut Writer) {
        let mut flags = (self.reliability as u8) << 5;
        if self.is_fragmented() {
            flags |= FLAG_FRAGMENTED;
        }
        w.write_u8(flags);
        // The length field counts bits; bodies past 8191 bytes must be
        // fragmented before encoding.
        debug_assert!(self.body.len() * 8 <= usize::from(u16::MAX));
        w.write_u16_be((self.body.len() * 8) as u16);

        if self.is_reliable() {
            w.write_u24_le(self.reliable_index);
        }
        if self.is_sequenced() {
            w.write_u24_le(self.sequence_index);
        }
        if self.is_ordered() {
            w.write_u24_le(self.order_index);
            w.write_u8(self.order_channel);
        }
        if let Some(fragment) = self.fragment {
            w.write_u32_be(fragment.size);
            w.write_u16_be(fragment.id);
            w.write_u32_be(fragment.index);
        }
        w.write_bytes(&self.body);
    }

    /// Decode one frame from the cursor.
    pub fn decode(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let flags = r.read_u8()?;
        let reliability = Reliability::from_id(flags >> 5)
            .ok_or(CodecError::InvalidReliability(flags >> 5))?;
        let fragmented = flags & FLAG_FRAGMENTED != 0;

        let length_bits = r.read_u16_be()?;
        let body_len = usize::from(length_bits).div_ceil(8);

        let mut frame = Frame {
            reliability,
            ..Self::default()
        };
        if reliability.is_reliable() {
            frame.reliable_index = r.read_u24_le()?;
        }
        if reliability.is_sequenced() {
            frame.sequence_index = r.read_u24_le()?;
        }
        if reliability.is_ordered() {
            frame.order_index = r.read_u24_le()?;
            frame.order_channel = r.read_u8()?;
        }
        if fragmented {
            frame.fragment = Some(FragmentMeta {
                size: r.read_u32_be()?,
                id: r.read_u16_be()?,
                index: r.read_u32_be()?,
            });
        }
        frame.body = r.read_bytes(body_len)?.to_vec();
        Ok(frame)
    }
}

/// Outer transmission unit: one datagram's worth of frames under a single
/// acknowledgeable 24-bit sequence number.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrameSet {
    /// 24-bit outer sequence, monotonic per direction.
    pub sequence: u32,
    /// Contained frames; delivery order on decode matters.
    pub frames: Vec<Frame>,
}

impl FrameSet {
    /// Packet discriminator byte (`0x80`, the VALID bitflag).
    pub const ID: u8 = FLAG_VALID;

    /// Encoded size in bytes of the full datagram.
    pub fn byte_len(&self) -> usize {
        4 + self.frames.iter().map(Frame::byte_len).sum::<usize>()
    }

    /// Serialize to a datagram.
    pub fn encode(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(self.byte_len());
        w.write_u8(Self::ID);
        w.write_u24_le(self.sequence);
        for frame in &self.frames {
            frame.encode(&mut w);
        }
        w.into_bytes()
    }

    /// Parse a FrameSet datagram, reading frames until the buffer ends.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(data);
        let _id = r.read_u8()?;
        let sequence = r.read_u24_le()?;
        let mut frames = Vec::new();
        while !r.is_empty() {
            frames.push(Frame::decode(&mut r)?);
        }
        Ok(Self { sequence, frames })
    }
}
