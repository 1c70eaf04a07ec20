//! Per-peer connection state machine.
//!
//! A [`Connection`] owns everything one remote peer needs after the offline
//! handshake: the reliability window, fragment and ordering reassembly, the
//! outbound frame queue and the connected-mode handshake. It performs no I/O
//! itself; inbound datagrams are pushed through [`Connection::incoming`] and
//! outbound datagrams plus lifecycle events are drained by the owning loop.

use std::collections::VecDeque;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, trace};

use crate::core::constants::{
    DATAGRAM_OVERHEAD, FLAG_ACK, FLAG_NACK, FLAG_VALID, FRAGMENT_TIMEOUT, FRAMESET_MTU_MARGIN,
    FRAME_HEADER_SIZE, ORDER_CHANNEL_COUNT,
};
use crate::protocol::online::{
    ConnectedPing, ConnectedPong, ConnectionRequest, ConnectionRequestAccepted, Disconnect,
    NewIncomingConnection,
};
use crate::protocol::{Ack, Frame, FrameSet, FragmentMeta, Nack, Reliability};

use super::fragment::FragmentReassembler;
use super::order::OrderingReassembler;
use super::reliability::{InboundVerdict, ReliabilityWindow};

/// 24-bit counter mask for indices and outer sequences.
const SEQUENCE_MASK: u32 = 0x00ff_ffff;

/// Number of system addresses advertised in the connection acceptance.
const SYSTEM_ADDRESS_COUNT: usize = 10;

/// Lifecycle state of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Offline handshake done, connected-mode handshake in progress.
    Connecting,
    /// Fully established; application payloads flow.
    Connected,
    /// Disconnect notice is being delivered.
    Disconnecting,
    /// Terminal state; the owning loop should drop the connection.
    Disconnected,
}

/// Send urgency of an outbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Priority {
    /// Batched into the next tick's FrameSet.
    #[default]
    Normal,
    /// Flushes the queue as soon as the frame is enqueued.
    Immediate,
}

/// Facts about the owning connection table, passed into
/// [`Connection::incoming`] instead of a shared reference back to the
/// server.
#[derive(Debug, Clone, Copy)]
pub struct ServerContext {
    /// Live connections in the owning table, this one included.
    pub connection_count: usize,
    /// Configured connection limit.
    pub max_connections: usize,
}

impl ServerContext {
    /// Whether the table holds more connections than the limit allows.
    pub fn at_capacity(&self) -> bool {
        self.connection_count > self.max_connections
    }
}

impl Default for ServerContext {
    /// Context for a connection driven without an owning table; never at
    /// capacity.
    fn default() -> Self {
        Self {
            connection_count: 0,
            max_connections: usize::MAX,
        }
    }
}

/// Lifecycle and payload events surfaced to the owning loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connected-mode handshake completed.
    Connected,
    /// The peer disconnected or the local side finished disconnecting.
    Disconnected,
    /// A reassembled application payload arrived.
    Message(Vec<u8>),
}

/// State machine for one connected peer.
#[derive(Debug)]
pub struct Connection {
    addr: SocketAddr,
    guid: u64,
    mtu: u16,
    status: Status,

    window: ReliabilityWindow,
    fragments: FragmentReassembler,
    ordering: OrderingReassembler,

    output_order_index: [u32; ORDER_CHANNEL_COUNT],
    output_sequence_index: [u32; ORDER_CHANNEL_COUNT],
    output_reliable_index: u32,
    output_fragment_id: u16,
    output_sequence: u32,

    queue: Vec<Frame>,
    queue_bytes: usize,
    outbound: VecDeque<Vec<u8>>,
    events: VecDeque<ConnectionEvent>,
}

/// Milliseconds since the Unix epoch, for handshake timestamps.
fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

impl Connection {
    /// Create a connection for a peer that completed the offline handshake
    /// with the given GUID and negotiated MTU.
    pub fn new(addr: SocketAddr, guid: u64, mtu: u16) -> Self {
        Self {
            addr,
            guid,
            mtu,
            status: Status::Connecting,
            window: ReliabilityWindow::new(),
            fragments: FragmentReassembler::new(),
            ordering: OrderingReassembler::new(),
            output_order_index: [0; ORDER_CHANNEL_COUNT],
            output_sequence_index: [0; ORDER_CHANNEL_COUNT],
            output_reliable_index: 0,
            output_fragment_id: 0,
            output_sequence: 0,
            queue: Vec::new(),
            queue_bytes: 0,
            outbound: VecDeque::new(),
            events: VecDeque::new(),
        }
    }

    /// Remote address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Peer GUID from the offline handshake.
    pub fn guid(&self) -> u64 {
        self.guid
    }

    /// Negotiated MTU.
    pub fn mtu(&self) -> u16 {
        self.mtu
    }

    /// Current lifecycle state.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Whether the owning loop should drop this connection.
    pub fn is_disconnected(&self) -> bool {
        self.status == Status::Disconnected
    }

    /// Next datagram to put on the wire, if any.
    pub fn poll_outbound(&mut self) -> Option<Vec<u8>> {
        self.outbound.pop_front()
    }

    /// Next lifecycle or payload event, if any.
    pub fn poll_event(&mut self) -> Option<ConnectionEvent> {
        self.events.pop_front()
    }

    /// Feed one inbound datagram from this peer. `ctx` carries the owning
    /// table's occupancy so a connection request can be refused when the
    /// server is full.
    ///
    /// Malformed datagrams are logged and dropped; they never tear down the
    /// connection.
    pub fn incoming(&mut self, data: &[u8], ctx: ServerContext) {
        if matches!(self.status, Status::Disconnecting | Status::Disconnected) {
            return;
        }
        let Some(&header) = data.first() else {
            return;
        };
        if header & FLAG_VALID == 0 {
            debug!("{}: offline datagram on connected peer, dropped", self.addr);
            return;
        }
        if header & FLAG_ACK != 0 {
            self.handle_ack(data);
        } else if header & FLAG_NACK != 0 {
            self.handle_nack(data);
        } else {
            self.handle_frameset(data, ctx);
        }
    }

    /// Queue an application payload for delivery to the peer.
    pub fn send(
        &mut self,
        payload: &[u8],
        reliability: Reliability,
        channel: u8,
        priority: Priority,
    ) {
        let mut frame = Frame::new(reliability, payload.to_vec());
        frame.order_channel = channel;
        self.send_frame(frame, priority);
    }

    /// Advance timers: flush pending ACK/NACK state, flush the frame queue
    /// and evict stale fragment groups.
    pub fn tick(&mut self) {
        if matches!(self.status, Status::Disconnecting | Status::Disconnected) {
            return;
        }
        let received = self.window.take_received();
        if !received.is_empty() {
            self.outbound.push_back(Ack { sequences: received }.encode());
        }
        let lost = self.window.take_lost();
        if !lost.is_empty() {
            self.outbound.push_back(Nack { sequences: lost }.encode());
        }
        self.flush_queue();
        self.fragments.evict_stale(FRAGMENT_TIMEOUT);
    }

    /// Send the disconnect notice and move to the terminal state.
    pub fn disconnect(&mut self) {
        if matches!(self.status, Status::Disconnecting | Status::Disconnected) {
            return;
        }
        self.status = Status::Disconnecting;
        self.send_frame(
            Frame::new(Reliability::Unreliable, Disconnect.encode()),
            Priority::Immediate,
        );
        self.status = Status::Disconnected;
        self.events.push_back(ConnectionEvent::Disconnected);
    }

    // ---- inbound ----

    fn handle_frameset(&mut self, data: &[u8], ctx: ServerContext) {
        let set = match FrameSet::decode(data) {
            Ok(set) => set,
            Err(err) => {
                debug!("{}: dropping malformed FrameSet: {err}", self.addr);
                return;
            }
        };
        match self.window.note_inbound(set.sequence) {
            InboundVerdict::Accepted => {}
            verdict => {
                trace!("{}: FrameSet {} dropped ({verdict:?})", self.addr, set.sequence);
                return;
            }
        }
        for frame in set.frames {
            self.handle_frame(frame, ctx);
        }
    }

    fn handle_ack(&mut self, data: &[u8]) {
        match Ack::decode(data) {
            Ok(ack) => self.window.acknowledge(&ack.sequences),
            Err(err) => debug!("{}: dropping malformed ACK: {err}", self.addr),
        }
    }

    /// Retransmit the frames of lost sequences with their original
    /// reliability metadata; indices are never reassigned on resend.
    fn handle_nack(&mut self, data: &[u8]) {
        let nack = match Nack::decode(data) {
            Ok(nack) => nack,
            Err(err) => {
                debug!("{}: dropping malformed NACK: {err}", self.addr);
                return;
            }
        };
        for frame in self.window.resend_targets(&nack.sequences) {
            self.add_frame_to_queue(frame, Priority::Immediate);
        }
    }

    fn handle_frame(&mut self, frame: Frame, ctx: ServerContext) {
        let frame = if frame.is_fragmented() {
            match self.fragments.accept(frame) {
                Some(whole) => whole,
                None => return,
            }
        } else {
            frame
        };
        for body in self.ordering.accept(frame) {
            self.deliver(body, ctx);
        }
    }

    /// Dispatch one reassembled, in-order payload according to lifecycle
    /// state. Anything unrecognized while connected is forwarded to the
    /// owner as an opaque message.
    fn deliver(&mut self, body: Vec<u8>, ctx: ServerContext) {
        let Some(&id) = body.first() else {
            return;
        };
        match self.status {
            Status::Connecting => match id {
                ConnectionRequest::ID => self.handle_connection_request(&body, ctx),
                NewIncomingConnection::ID => {
                    if NewIncomingConnection::decode(&body).is_ok() {
                        self.status = Status::Connected;
                        self.events.push_back(ConnectionEvent::Connected);
                    }
                }
                Disconnect::ID => {
                    self.status = Status::Disconnected;
                    self.events.push_back(ConnectionEvent::Disconnected);
                }
                _ => debug!("{}: unexpected packet 0x{id:02x} while connecting", self.addr),
            },
            Status::Connected => match id {
                Disconnect::ID => {
                    self.status = Status::Disconnected;
                    self.events.push_back(ConnectionEvent::Disconnected);
                }
                ConnectedPing::ID => self.handle_connected_ping(&body),
                _ => self.events.push_back(ConnectionEvent::Message(body)),
            },
            Status::Disconnecting | Status::Disconnected => {}
        }
    }

    fn handle_connection_request(&mut self, body: &[u8], ctx: ServerContext) {
        let request = match ConnectionRequest::decode(body) {
            Ok(request) => request,
            Err(err) => {
                debug!("{}: dropping malformed ConnectionRequest: {err}", self.addr);
                return;
            }
        };
        if ctx.at_capacity() {
            debug!("{}: connection table full, refusing request", self.addr);
            self.disconnect();
            return;
        }
        let accepted = ConnectionRequestAccepted {
            client_address: self.addr,
            system_index: 0,
            system_addresses: vec![
                SocketAddr::from((Ipv4Addr::LOCALHOST, 0));
                SYSTEM_ADDRESS_COUNT
            ],
            request_timestamp: request.timestamp,
            timestamp: now_millis(),
        };
        let mut frame = Frame::new(Reliability::ReliableOrdered, accepted.encode());
        frame.order_channel = 0;
        self.send_frame(frame, Priority::Immediate);
    }

    fn handle_connected_ping(&mut self, body: &[u8]) {
        let ping = match ConnectedPing::decode(body) {
            Ok(ping) => ping,
            Err(err) => {
                debug!("{}: dropping malformed ConnectedPing: {err}", self.addr);
                return;
            }
        };
        let pong = ConnectedPong {
            ping_timestamp: ping.timestamp,
            timestamp: now_millis(),
        };
        self.send_frame(
            Frame::new(Reliability::Unreliable, pong.encode()),
            Priority::Immediate,
        );
    }

    // ---- outbound ----

    /// Assign delivery indices, fragment oversized bodies and queue the
    /// result.
    ///
    /// Sequenced frames stamp the channel's current order index and advance
    /// only the sequence counter; order-exclusive frames advance the order
    /// counter and reset the channel's sequence counter. The reliable index
    /// is a single counter across all channels and is only consumed by
    /// frames that require acknowledgment.
    pub fn send_frame(&mut self, mut frame: Frame, priority: Priority) {
        let channel = usize::from(frame.order_channel) % ORDER_CHANNEL_COUNT;
        if frame.is_sequenced() {
            frame.order_index = self.output_order_index[channel];
            frame.sequence_index = self.output_sequence_index[channel] & SEQUENCE_MASK;
            self.output_sequence_index[channel] = self.output_sequence_index[channel]
                .wrapping_add(1);
        } else if frame.is_order_exclusive() {
            frame.order_index = self.output_order_index[channel] & SEQUENCE_MASK;
            self.output_order_index[channel] = self.output_order_index[channel].wrapping_add(1);
            self.output_sequence_index[channel] = 0;
        }

        let max_body = usize::from(self.mtu) - FRAME_HEADER_SIZE - DATAGRAM_OVERHEAD;
        if frame.body.len() > max_body {
            self.send_fragmented(frame, max_body);
            return;
        }
        if frame.is_reliable() {
            frame.reliable_index = self.next_reliable_index();
        }
        self.add_frame_to_queue(frame, priority);
    }

    /// Fragments always go out at Immediate priority so the peer's
    /// reassembly never stalls on a half-queued group.
    fn send_fragmented(&mut self, frame: Frame, max_body: usize) {
        let fragment_id = self.output_fragment_id;
        self.output_fragment_id = self.output_fragment_id.wrapping_add(1);
        let count = frame.body.len().div_ceil(max_body);
        trace!(
            "{}: splitting {} byte body into {count} fragments (group {fragment_id})",
            self.addr,
            frame.body.len()
        );
        for (index, chunk) in frame.body.chunks(max_body).enumerate() {
            let mut fragment = Frame::new(frame.reliability, chunk.to_vec());
            fragment.sequence_index = frame.sequence_index;
            fragment.order_index = frame.order_index;
            fragment.order_channel = frame.order_channel;
            fragment.fragment = Some(FragmentMeta {
                size: count as u32,
                id: fragment_id,
                index: index as u32,
            });
            if fragment.is_reliable() {
                fragment.reliable_index = self.next_reliable_index();
            }
            self.add_frame_to_queue(fragment, Priority::Immediate);
        }
    }

    fn next_reliable_index(&mut self) -> u32 {
        let index = self.output_reliable_index & SEQUENCE_MASK;
        self.output_reliable_index = self.output_reliable_index.wrapping_add(1);
        index
    }

    /// Append a ready frame to the queue, flushing first when it would not
    /// fit the current FrameSet and immediately after when asked to.
    fn add_frame_to_queue(&mut self, frame: Frame, priority: Priority) {
        let limit = usize::from(self.mtu) - FRAMESET_MTU_MARGIN;
        if 4 + self.queue_bytes + frame.byte_len() > limit {
            self.flush_queue();
        }
        self.queue_bytes += frame.byte_len();
        self.queue.push(frame);
        if priority == Priority::Immediate {
            self.flush_queue();
        }
    }

    /// Emit the queued frames as one FrameSet and snapshot its reliable
    /// frames for retransmission.
    fn flush_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        let set = FrameSet {
            sequence: self.output_sequence & SEQUENCE_MASK,
            frames: std::mem::take(&mut self.queue),
        };
        self.output_sequence = self.output_sequence.wrapping_add(1);
        self.queue_bytes = 0;

        let reliable: Vec<Frame> = set
            .frames
            .iter()
            .filter(|frame| frame.is_reliable())
            .cloned()
            .collect();
        self.window.record_sent(set.sequence, reliable);
        self.outbound.push_back(set.encode());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::constants::GAME_PACKET_ID;

    const CLIENT_GUID: u64 = 0x1122_3344_5566_7788;

    fn new_conn(mtu: u16) -> Connection {
        Connection::new("127.0.0.1:50000".parse().unwrap(), CLIENT_GUID, mtu)
    }

    fn ctx() -> ServerContext {
        ServerContext::default()
    }

    fn frameset(sequence: u32, frames: Vec<Frame>) -> Vec<u8> {
        FrameSet { sequence, frames }.encode()
    }

    fn ordered_frame(reliable_index: u32, order_index: u32, body: Vec<u8>) -> Frame {
        let mut frame = Frame::new(Reliability::ReliableOrdered, body);
        frame.reliable_index = reliable_index;
        frame.order_index = order_index;
        frame
    }

    fn message(byte: u8) -> Vec<u8> {
        vec![GAME_PACKET_ID, byte]
    }

    /// Drive the connected-mode handshake to completion and drain the
    /// resulting output and events.
    fn established(mtu: u16) -> Connection {
        let mut conn = new_conn(mtu);
        let request = ConnectionRequest {
            client_guid: CLIENT_GUID,
            timestamp: 7,
        };
        conn.incoming(&frameset(0, vec![ordered_frame(0, 0, request.encode())]), ctx());
        let incoming = NewIncomingConnection {
            server_address: "127.0.0.1:19132".parse().unwrap(),
            internal_address: "10.0.0.2:50000".parse().unwrap(),
        };
        conn.incoming(&frameset(1, vec![ordered_frame(1, 1, incoming.encode())]), ctx());
        assert_eq!(conn.status(), Status::Connected);
        assert_eq!(conn.poll_event(), Some(ConnectionEvent::Connected));
        // Flush the handshake ACKs so tests observe only their own traffic.
        conn.tick();
        while conn.poll_outbound().is_some() {}
        conn
    }

    fn drain_framesets(conn: &mut Connection) -> Vec<FrameSet> {
        let mut sets = Vec::new();
        while let Some(data) = conn.poll_outbound() {
            if data[0] & (FLAG_ACK | FLAG_NACK) == 0 {
                sets.push(FrameSet::decode(&data).unwrap());
            }
        }
        sets
    }

    #[test]
    fn test_handshake_accepts_connection_request() {
        let mut conn = new_conn(1492);
        let request = ConnectionRequest {
            client_guid: CLIENT_GUID,
            timestamp: 42,
        };
        conn.incoming(&frameset(0, vec![ordered_frame(0, 0, request.encode())]), ctx());
        assert_eq!(conn.status(), Status::Connecting);

        let sets = drain_framesets(&mut conn);
        assert_eq!(sets.len(), 1);
        let frame = &sets[0].frames[0];
        assert_eq!(frame.reliability, Reliability::ReliableOrdered);
        let accepted = ConnectionRequestAccepted::decode(&frame.body).unwrap();
        assert_eq!(accepted.client_address, conn.addr());
        assert_eq!(accepted.request_timestamp, 42);
    }

    #[test]
    fn test_connection_request_refused_at_capacity() {
        let mut conn = new_conn(1492);
        let request = ConnectionRequest {
            client_guid: CLIENT_GUID,
            timestamp: 42,
        };
        let full = ServerContext {
            connection_count: 2,
            max_connections: 1,
        };
        conn.incoming(&frameset(0, vec![ordered_frame(0, 0, request.encode())]), full);
        assert!(conn.is_disconnected());
        assert_eq!(conn.poll_event(), Some(ConnectionEvent::Disconnected));

        let sets = drain_framesets(&mut conn);
        assert_eq!(sets.len(), 1, "only the disconnect notice goes out");
        assert_eq!(sets[0].frames[0].body, vec![Disconnect::ID]);
    }

    #[test]
    fn test_handshake_completes_on_new_incoming_connection() {
        let conn = established(1492);
        assert_eq!(conn.status(), Status::Connected);
    }

    #[test]
    fn test_message_forwarded_as_event() {
        let mut conn = established(1492);
        conn.incoming(&frameset(2, vec![ordered_frame(2, 2, message(0xaa))]), ctx());
        assert_eq!(conn.poll_event(), Some(ConnectionEvent::Message(message(0xaa))));
    }

    #[test]
    fn test_duplicate_frameset_delivers_once() {
        let mut conn = established(1492);
        let data = frameset(2, vec![ordered_frame(2, 2, message(1))]);
        conn.incoming(&data, ctx());
        conn.incoming(&data, ctx());
        assert_eq!(conn.poll_event(), Some(ConnectionEvent::Message(message(1))));
        assert_eq!(conn.poll_event(), None);
    }

    #[test]
    fn test_tick_acks_received_and_nacks_gaps() {
        let mut conn = established(1492);
        conn.incoming(&frameset(2, vec![ordered_frame(2, 2, message(1))]), ctx());
        conn.incoming(&frameset(5, vec![ordered_frame(3, 3, message(2))]), ctx());
        conn.tick();

        let ack = Ack::decode(&conn.poll_outbound().unwrap()).unwrap();
        assert_eq!(ack.sequences, vec![2, 5]);
        let nack = Nack::decode(&conn.poll_outbound().unwrap()).unwrap();
        assert_eq!(nack.sequences, vec![3, 4]);
    }

    #[test]
    fn test_sequence_jump_dropped_without_nack_flood() {
        let mut conn = established(1492);
        // A forged FrameSet claiming the top of the 24-bit sequence space
        // must not enumerate millions of lost sequences.
        conn.incoming(
            &frameset(0x00ff_ffff, vec![ordered_frame(2, 2, message(1))]),
            ctx(),
        );
        assert_eq!(conn.poll_event(), None);
        conn.tick();
        assert_eq!(conn.poll_outbound(), None, "no ACK or NACK for the drop");
    }

    #[test]
    fn test_ordering_across_framesets() {
        let mut conn = established(1492);
        // Order index 3 arrives before 2 and is held back.
        conn.incoming(&frameset(2, vec![ordered_frame(3, 3, message(3))]), ctx());
        assert_eq!(conn.poll_event(), None);
        conn.incoming(&frameset(3, vec![ordered_frame(2, 2, message(2))]), ctx());
        assert_eq!(conn.poll_event(), Some(ConnectionEvent::Message(message(2))));
        assert_eq!(conn.poll_event(), Some(ConnectionEvent::Message(message(3))));
    }

    #[test]
    fn test_ping_answered_with_pong() {
        let mut conn = established(1492);
        let ping = ConnectedPing { timestamp: 999 };
        let frame = Frame::new(Reliability::Unreliable, ping.encode());
        conn.incoming(&frameset(2, vec![frame]), ctx());

        let sets = drain_framesets(&mut conn);
        assert_eq!(sets.len(), 1);
        let pong = ConnectedPong::decode(&sets[0].frames[0].body).unwrap();
        assert_eq!(pong.ping_timestamp, 999);
    }

    #[test]
    fn test_nack_resends_original_frame() {
        let mut conn = established(1492);
        conn.send(&message(7), Reliability::Reliable, 0, Priority::Immediate);
        let sent = drain_framesets(&mut conn).remove(0);
        let original = sent.frames[0].clone();

        conn.incoming(&Nack { sequences: vec![sent.sequence] }.encode(), ctx());
        let resent = drain_framesets(&mut conn).remove(0);
        assert_ne!(resent.sequence, sent.sequence);
        // Same reliable index and body; metadata is never reassigned.
        assert_eq!(resent.frames[0].reliable_index, original.reliable_index);
        assert_eq!(resent.frames[0].body, original.body);
    }

    #[test]
    fn test_ack_clears_retransmission_state() {
        let mut conn = established(1492);
        conn.send(&message(7), Reliability::Reliable, 0, Priority::Immediate);
        let sent = drain_framesets(&mut conn).remove(0);

        conn.incoming(&Ack { sequences: vec![sent.sequence] }.encode(), ctx());
        conn.incoming(&Nack { sequences: vec![sent.sequence] }.encode(), ctx());
        assert!(drain_framesets(&mut conn).is_empty());
    }

    #[test]
    fn test_normal_priority_waits_for_tick() {
        let mut conn = established(1492);
        conn.send(&message(1), Reliability::Reliable, 0, Priority::Normal);
        assert!(drain_framesets(&mut conn).is_empty());
        conn.tick();
        let sets = drain_framesets(&mut conn);
        assert_eq!(sets.len(), 1);
    }

    #[test]
    fn test_large_body_is_fragmented() {
        let mut conn = established(500);
        let payload = vec![GAME_PACKET_ID; 2000];
        conn.send(&payload, Reliability::ReliableOrdered, 0, Priority::Immediate);

        let frames: Vec<Frame> = drain_framesets(&mut conn)
            .into_iter()
            .flat_map(|set| set.frames)
            .collect();
        let expected = 2000usize.div_ceil(500 - FRAME_HEADER_SIZE - DATAGRAM_OVERHEAD);
        assert_eq!(frames.len(), expected);

        let meta = frames[0].fragment.unwrap();
        assert_eq!(meta.size as usize, expected);
        let mut reliable_indices: Vec<u32> =
            frames.iter().map(|f| f.reliable_index).collect();
        reliable_indices.dedup();
        assert_eq!(reliable_indices.len(), expected, "each fragment gets its own index");
        let total: usize = frames.iter().map(|f| f.body.len()).sum();
        assert_eq!(total, 2000);
    }

    #[test]
    fn test_fragmented_payload_reassembled_by_peer() {
        let mut sender = established(500);
        let mut receiver = established(1492);
        // Skip the sequences the handshake already consumed on the receiver.
        let mut payload = vec![GAME_PACKET_ID];
        payload.extend((0..2000u32).map(|i| i as u8));
        sender.send(&payload, Reliability::ReliableOrdered, 0, Priority::Immediate);

        let mut next_sequence = 2;
        for mut set in drain_framesets(&mut sender) {
            for frame in &mut set.frames {
                // Rebase onto the receiver's expected order index.
                frame.order_index = 2;
            }
            receiver.incoming(&frameset(next_sequence, std::mem::take(&mut set.frames)), ctx());
            next_sequence += 1;
        }
        assert_eq!(receiver.poll_event(), Some(ConnectionEvent::Message(payload)));
    }

    #[test]
    fn test_disconnect_sends_notice_and_emits_event() {
        let mut conn = established(1492);
        conn.disconnect();
        assert!(conn.is_disconnected());
        assert_eq!(conn.poll_event(), Some(ConnectionEvent::Disconnected));

        let sets = drain_framesets(&mut conn);
        assert_eq!(sets[0].frames[0].body, vec![Disconnect::ID]);

        // Idempotent.
        conn.disconnect();
        assert_eq!(conn.poll_event(), None);
    }

    #[test]
    fn test_peer_disconnect_notice() {
        let mut conn = established(1492);
        let frame = Frame::new(Reliability::Unreliable, Disconnect.encode());
        conn.incoming(&frameset(2, vec![frame]), ctx());
        assert!(conn.is_disconnected());
        assert_eq!(conn.poll_event(), Some(ConnectionEvent::Disconnected));
    }

    #[test]
    fn test_malformed_datagrams_dropped() {
        let mut conn = established(1492);
        conn.incoming(&[], ctx());
        conn.incoming(&[0x80], ctx());
        conn.incoming(&[0x80, 0x00, 0x00, 0x00, 0xe0, 0x00, 0x00], ctx());
        conn.incoming(&[0xc0, 0x00], ctx());
        conn.incoming(&[0x05, 0x00, 0x00], ctx());
        assert_eq!(conn.status(), Status::Connected);
        assert_eq!(conn.poll_event(), None);
    }

    #[test]
    fn test_queue_flushes_when_frameset_would_overflow() {
        let mut conn = established(500);
        // Three frames that cannot all share one 500 byte FrameSet.
        for byte in 0..3u8 {
            let mut payload = vec![GAME_PACKET_ID, byte];
            payload.resize(200, byte);
            conn.send(&payload, Reliability::Reliable, 0, Priority::Normal);
        }
        conn.tick();
        let sets = drain_framesets(&mut conn);
        assert_eq!(sets.len(), 2);
        for set in &sets {
            assert!(set.byte_len() <= 500 - FRAMESET_MTU_MARGIN);
        }
    }
}
