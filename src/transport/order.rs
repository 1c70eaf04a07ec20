//! Ordered and sequenced delivery across the 32 ordering channels.
//!
//! Each channel keeps an expected order index, a highest-seen sequence
//! index, and a backlog of early ordered arrivals. Sequenced frames drop
//! stale arrivals; order-exclusive frames are held until every predecessor
//! on their channel has been delivered.

use std::collections::HashMap;

use log::{debug, warn};

use crate::core::constants::{MAX_ORDERING_BACKLOG, ORDER_CHANNEL_COUNT};
use crate::protocol::Frame;

/// Per-channel ordering state.
#[derive(Debug, Default)]
struct Channel {
    /// Next order index expected for exclusive ordered delivery.
    order_index: u32,
    /// Highest sequence index seen, plus one.
    sequence_index: u32,
    /// Early ordered arrivals keyed by order index.
    backlog: HashMap<u32, Vec<u8>>,
}

/// Applies per-channel ordering rules to deframed payloads.
#[derive(Debug)]
pub struct OrderingReassembler {
    channels: [Channel; ORDER_CHANNEL_COUNT],
}

impl Default for OrderingReassembler {
    fn default() -> Self {
        Self {
            channels: std::array::from_fn(|_| Channel::default()),
        }
    }
}

impl OrderingReassembler {
    /// Create a reassembler with all channels at index zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of backlogged payloads on one channel, for introspection.
    pub fn backlog_len(&self, channel: u8) -> usize {
        self.channels
            .get(usize::from(channel))
            .map_or(0, |c| c.backlog.len())
    }

    /// Accept one reassembled frame and return the payloads now deliverable,
    /// in delivery order. Stale sequenced frames and out-of-range channels
    /// yield nothing; early ordered frames are backlogged.
    pub fn accept(&mut self, frame: Frame) -> Vec<Vec<u8>> {
        if !frame.is_ordered() {
            return vec![frame.body];
        }
        let Some(channel) = self.channels.get_mut(usize::from(frame.order_channel)) else {
            debug!("dropping frame on invalid order channel {}", frame.order_channel);
            return Vec::new();
        };

        if frame.is_sequenced() {
            if frame.sequence_index < channel.sequence_index
                || frame.order_index < channel.order_index
            {
                // Superseded by a newer arrival on this channel.
                return Vec::new();
            }
            channel.sequence_index = frame.sequence_index + 1;
            return vec![frame.body];
        }

        // Order-exclusive delivery.
        if frame.order_index < channel.order_index {
            return Vec::new();
        }
        if frame.order_index > channel.order_index {
            if channel.backlog.len() >= MAX_ORDERING_BACKLOG {
                warn!(
                    "ordering backlog full on channel {}, dropping frame {}",
                    frame.order_channel, frame.order_index
                );
                return Vec::new();
            }
            channel.backlog.insert(frame.order_index, frame.body);
            return Vec::new();
        }

        channel.sequence_index = 0;
        channel.order_index += 1;
        let mut out = vec![frame.body];
        while let Some(body) = channel.backlog.remove(&channel.order_index) {
            channel.order_index += 1;
            out.push(body);
        }
        out
    }
}
