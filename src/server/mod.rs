//! RANET Protocol - Server Layer
//!
//! The outward-facing server surface:
//!
//! - **Offline handshake**: [`OfflineHandler`] answering discovery pings and
//!   the MTU/GUID negotiation
//! - **Datagram routing**: [`ServerDriver`] mapping datagrams to connections
//!   and handler callbacks, with no I/O of its own
//! - **Async front end**: [`RanetServer`] owning the socket and the tick
//!   loop (requires the `server` feature)

mod offline;
#[cfg(feature = "server")]
#[allow(clippy::module_inception)]
mod server;

pub use offline::{OfflineAction, OfflineConfig, OfflineHandler};
#[cfg(feature = "server")]
pub use server::{RanetServer, RanetServerBuilder, ServerConfig, ServerDriver};
