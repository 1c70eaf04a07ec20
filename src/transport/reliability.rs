//! Datagram sequence tracking for acknowledgment and retransmission.
//!
//! The window records every inbound FrameSet sequence, detects gaps so they
//! can be negatively acknowledged, and keeps copies of sent reliable frames
//! keyed by outer sequence until the remote acknowledges them.

use std::collections::{BTreeSet, HashMap};

use log::{debug, warn};

use crate::core::constants::MAX_SEQUENCE_GAP;
use crate::protocol::Frame;

/// Outcome of observing an inbound FrameSet sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundVerdict {
    /// New sequence (or a retransmission filling a known gap); process it.
    Accepted,
    /// Already seen; drop the datagram.
    Duplicate,
    /// Further ahead than [`MAX_SEQUENCE_GAP`] allows; drop the datagram.
    Desync,
}

/// Tracks inbound sequences, gaps and unacknowledged reliable frames.
#[derive(Debug, Default)]
pub struct ReliabilityWindow {
    /// Highest inbound sequence seen so far.
    highest_inbound: Option<u32>,
    /// Sequences received since the last ACK was flushed.
    received: Vec<u32>,
    /// Known gaps awaiting retransmission.
    lost: BTreeSet<u32>,
    /// Reliable frames sent and not yet acknowledged, by outer sequence.
    backup: HashMap<u32, Vec<Frame>>,
}

impl ReliabilityWindow {
    /// Create an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe an inbound FrameSet sequence.
    ///
    /// Gaps between the previous highest sequence and this one are marked
    /// lost so the next tick can NACK them; a sequence that fills a known
    /// gap is accepted late rather than treated as a duplicate. A jump wider
    /// than [`MAX_SEQUENCE_GAP`] is rejected without touching the window.
    pub fn note_inbound(&mut self, sequence: u32) -> InboundVerdict {
        if self.lost.remove(&sequence) {
            self.received.push(sequence);
            return InboundVerdict::Accepted;
        }
        let next = match self.highest_inbound {
            Some(highest) if sequence <= highest => return InboundVerdict::Duplicate,
            Some(highest) => highest + 1,
            None => 0,
        };
        if sequence - next > MAX_SEQUENCE_GAP {
            warn!("sequence {sequence} jumps {} past the window, dropped", sequence - next);
            return InboundVerdict::Desync;
        }
        for missing in next..sequence {
            self.lost.insert(missing);
        }
        self.highest_inbound = Some(sequence);
        self.received.push(sequence);
        InboundVerdict::Accepted
    }

    /// Drain the sequences to acknowledge on the next tick.
    pub fn take_received(&mut self) -> Vec<u32> {
        std::mem::take(&mut self.received)
    }

    /// Drain the sequences to negatively acknowledge on the next tick.
    pub fn take_lost(&mut self) -> Vec<u32> {
        let lost: Vec<u32> = self.lost.iter().copied().collect();
        self.lost.clear();
        lost
    }

    /// Remember the reliable frames carried under an outbound sequence.
    /// Sequences with no reliable payload are not tracked.
    pub fn record_sent(&mut self, sequence: u32, frames: Vec<Frame>) {
        if !frames.is_empty() {
            self.backup.insert(sequence, frames);
        }
    }

    /// Drop retransmission copies for acknowledged sequences.
    pub fn acknowledge(&mut self, sequences: &[u32]) {
        for sequence in sequences {
            self.backup.remove(sequence);
        }
    }

    /// Take back the frames of negatively acknowledged sequences so they
    /// can be requeued with their original delivery metadata.
    pub fn resend_targets(&mut self, sequences: &[u32]) -> Vec<Frame> {
        let mut frames = Vec::new();
        for sequence in sequences {
            if let Some(mut backed_up) = self.backup.remove(sequence) {
                debug!("resending {} frame(s) of sequence {sequence}", backed_up.len());
                frames.append(&mut backed_up);
            }
        }
        frames
    }

    /// Number of outbound sequences awaiting acknowledgment.
    pub fn pending_ack_count(&self) -> usize {
        self.backup.len()
    }
}
