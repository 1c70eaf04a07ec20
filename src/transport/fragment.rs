//! Reassembly of fragmented frames.
//!
//! Oversized bodies are split by the sender into fragments sharing one
//! fragment id. Fragments are buffered per group until the collected count
//! equals the declared group size, then concatenated in index order into one
//! logical frame carrying the original delivery metadata.
//!
//! Buffering is bounded: a per-connection byte budget rejects groups that
//! would exceed it, and incomplete groups are evicted after a timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::core::constants::MAX_FRAGMENT_BYTES;
use crate::protocol::Frame;

/// One incomplete fragment group.
#[derive(Debug)]
struct FragmentGroup {
    parts: HashMap<u32, Frame>,
    first_seen: Instant,
    bytes: usize,
}

/// Buffers fragments by group id until a group completes.
#[derive(Debug, Default)]
pub struct FragmentReassembler {
    groups: HashMap<u16, FragmentGroup>,
    buffered_bytes: usize,
}

impl FragmentReassembler {
    /// Create an empty reassembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes currently buffered across incomplete groups.
    pub fn buffered_bytes(&self) -> usize {
        self.buffered_bytes
    }

    /// Number of incomplete groups.
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Accept one fragment.
    ///
    /// Returns the reassembled logical frame when this fragment completes
    /// its group; the result still carries the original reliability and
    /// ordering metadata and must re-enter ordered delivery.
    pub fn accept(&mut self, frame: Frame) -> Option<Frame> {
        let meta = frame.fragment?;
        if meta.size == 0 || meta.index >= meta.size {
            debug!(
                "dropping fragment with invalid metadata (size {}, index {})",
                meta.size, meta.index
            );
            return None;
        }
        if self.buffered_bytes + frame.body.len() > MAX_FRAGMENT_BYTES {
            warn!(
                "fragment buffer budget exceeded ({} bytes), dropping fragment of group {}",
                self.buffered_bytes, meta.id
            );
            return None;
        }

        let inserted = frame.body.len();
        let group = self.groups.entry(meta.id).or_insert_with(|| FragmentGroup {
            parts: HashMap::new(),
            first_seen: Instant::now(),
            bytes: 0,
        });
        if let Some(previous) = group.parts.insert(meta.index, frame) {
            // Duplicate fragment; keep the budget accurate.
            group.bytes -= previous.body.len();
            self.buffered_bytes -= previous.body.len();
        }
        group.bytes += inserted;
        self.buffered_bytes += inserted;

        if group.parts.len() < meta.size as usize {
            return None;
        }

        let group = self.groups.remove(&meta.id)?;
        self.buffered_bytes -= group.bytes;

        let mut parts = group.parts;
        let first = parts.remove(&0)?;
        let mut body = first.body;
        body.reserve(group.bytes.saturating_sub(body.len()));
        for index in 1..meta.size {
            let part = parts.remove(&index)?;
            body.extend_from_slice(&part.body);
        }

        // Delivery metadata travels on the first fragment.
        Some(Frame {
            reliability: first.reliability,
            reliable_index: first.reliable_index,
            sequence_index: first.sequence_index,
            order_index: first.order_index,
            order_channel: first.order_channel,
            fragment: None,
            body,
        })
    }

    /// Evict incomplete groups older than `timeout`.
    pub fn evict_stale(&mut self, timeout: Duration) {
        let buffered = &mut self.buffered_bytes;
        self.groups.retain(|id, group| {
            if group.first_seen.elapsed() >= timeout {
                debug!("evicting stale fragment group {id} ({} bytes)", group.bytes);
                *buffered -= group.bytes;
                false
            } else {
                true
            }
        });
    }
}
