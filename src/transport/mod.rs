//! RANET Protocol - Transport Layer
//!
//! Everything that happens to a peer after the offline handshake:
//!
//! - **Connection state machine**: [`Connection`] with lifecycle management
//! - **Reliability window**: [`ReliabilityWindow`] sequence/ACK/NACK tracking
//! - **Fragment reassembly**: [`FragmentReassembler`] for split bodies
//! - **Ordered delivery**: [`OrderingReassembler`] across 32 channels
//! - **Async sockets**: [`RanetSocket`] wrapper for tokio UDP
//!
//! The connection layer is sans-IO: it consumes raw datagrams and produces
//! raw datagrams plus events, with sockets and timers owned by the server.

mod connection;
mod fragment;
mod order;
mod reliability;
#[cfg(feature = "server")]
mod socket;

pub use connection::{Connection, ConnectionEvent, Priority, ServerContext, Status};
pub use fragment::FragmentReassembler;
pub use order::OrderingReassembler;
pub use reliability::{InboundVerdict, ReliabilityWindow};
#[cfg(feature = "server")]
pub use socket::{RanetSocket, DEFAULT_RECV_BUFFER_SIZE};
