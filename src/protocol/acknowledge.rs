//! ACK and NACK datagrams.
//!
//! Both carry a compact range-encoded list of 24-bit FrameSet sequence
//! numbers: a u16 BE record count, then per record a flag byte (1 = single
//! sequence, 0 = range) followed by a 24-bit LE sequence, ranges carrying a
//! second 24-bit LE end bound. Consecutive runs are compressed on encode.

use crate::core::CodecError;
use crate::core::constants::{FLAG_ACK, FLAG_NACK, FLAG_VALID};

use super::codec::{Reader, Writer};

/// Record flag marking a single sequence number.
const RECORD_SINGLE: u8 = 1;

/// Record flag marking an inclusive range.
const RECORD_RANGE: u8 = 0;

/// Upper bound on sequences accepted from one datagram; ranges expanding
/// beyond this are truncated rather than allocated.
const MAX_SEQUENCES: usize = 8192;

fn encode_records(id: u8, sequences: &[u32]) -> Vec<u8> {
    let mut sorted = sequences.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut records: Vec<(u32, u32)> = Vec::new();
    for &seq in &sorted {
        match records.last_mut() {
            Some((_, end)) if *end + 1 == seq => *end = seq,
            _ => records.push((seq, seq)),
        }
    }

    let mut w = Writer::new();
    w.write_u8(id);
    w.write_u16_be(records.len() as u16);
    for (start, end) in records {
        if start == end {
            w.write_u8(RECORD_SINGLE);
            w.write_u24_le(start);
        } else {
            w.write_u8(RECORD_RANGE);
            w.write_u24_le(start);
            w.write_u24_le(end);
        }
    }
    w.into_bytes()
}

fn decode_records(data: &[u8]) -> Result<Vec<u32>, CodecError> {
    let mut r = Reader::new(data);
    let _id = r.read_u8()?;
    let count = r.read_u16_be()?;

    let mut sequences = Vec::new();
    for _ in 0..count {
        let flag = r.read_u8()?;
        if flag == RECORD_SINGLE {
            sequences.push(r.read_u24_le()?);
        } else {
            let start = r.read_u24_le()?;
            let end = r.read_u24_le()?;
            if end < start {
                continue;
            }
            for seq in start..=end {
                if sequences.len() >= MAX_SEQUENCES {
                    return Ok(sequences);
                }
                sequences.push(seq);
            }
        }
        if sequences.len() >= MAX_SEQUENCES {
            break;
        }
    }
    Ok(sequences)
}

/// Acknowledgment of received FrameSet sequences (`0xC0`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Ack {
    /// Acknowledged outer sequence numbers.
    pub sequences: Vec<u32>,
}

impl Ack {
    /// Packet discriminator byte.
    pub const ID: u8 = FLAG_VALID | FLAG_ACK;

    /// Serialize to a datagram.
    pub fn encode(&self) -> Vec<u8> {
        encode_records(Self::ID, &self.sequences)
    }

    /// Parse an ACK datagram.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        Ok(Self {
            sequences: decode_records(data)?,
        })
    }
}

/// Negative acknowledgment reporting lost FrameSet sequences (`0xA0`).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Nack {
    /// Sequence numbers reported as lost.
    pub sequences: Vec<u32>,
}

impl Nack {
    /// Packet discriminator byte.
    pub const ID: u8 = FLAG_VALID | FLAG_NACK;

    /// Serialize to a datagram.
    pub fn encode(&self) -> Vec<u8> {
        encode_records(Self::ID, &self.sequences)
    }

    /// Parse a NACK datagram.
    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        Ok(Self {
            sequences: decode_records(data)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_sequence() {
        let ack = Ack { sequences: vec![0] };
        let bytes = ack.encode();
        assert_eq!(bytes, vec![0xc0, 0x00, 0x01, 0x01, 0x00, 0x00, 0x00]);
        assert_eq!(Ack::decode(&bytes).unwrap(), ack);
    }

    #[test]
    fn test_run_compression() {
        let ack = Ack {
            sequences: vec![3, 4, 5, 6, 9],
        };
        let bytes = ack.encode();
        // one range record + one single record
        assert_eq!(bytes[1..3], [0x00, 0x02]);
        assert_eq!(
            Ack::decode(&bytes).unwrap().sequences,
            vec![3, 4, 5, 6, 9]
        );
    }

    #[test]
    fn test_unsorted_input_roundtrip() {
        let nack = Nack {
            sequences: vec![10, 2, 3, 7, 2],
        };
        let decoded = Nack::decode(&nack.encode()).unwrap();
        assert_eq!(decoded.sequences, vec![2, 3, 7, 10]);
    }

    #[test]
    fn test_nack_id() {
        let nack = Nack { sequences: vec![5] };
        assert_eq!(nack.encode()[0], 0xa0);
    }

    #[test]
    fn test_empty_list() {
        let ack = Ack::default();
        let bytes = ack.encode();
        assert_eq!(bytes, vec![0xc0, 0x00, 0x00]);
        assert!(Ack::decode(&bytes).unwrap().sequences.is_empty());
    }

    #[test]
    fn test_inverted_range_skipped() {
        // count 1, range record with end < start
        let bytes = [0xc0, 0x00, 0x01, 0x00, 9, 0, 0, 2, 0, 0];
        assert!(Ack::decode(&bytes).unwrap().sequences.is_empty());
    }

    #[test]
    fn test_range_expansion_bounded() {
        // range covering the whole 24-bit space must not allocate it all
        let bytes = [0xc0, 0x00, 0x01, 0x00, 0, 0, 0, 0xff, 0xff, 0xff];
        let decoded = Ack::decode(&bytes).unwrap();
        assert_eq!(decoded.sequences.len(), 8192);
    }

    #[test]
    fn test_truncated_record() {
        let bytes = [0xc0, 0x00, 0x01, 0x01, 0x00];
        assert!(matches!(
            Ack::decode(&bytes),
            Err(CodecError::TooShort { .. })
        ));
    }
}
