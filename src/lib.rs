//! # RANET Protocol
//!
//! **R**eliable **A**pplication **NET**work transport
//!
//! RANET is a RakNet-compatible reliable messaging layer over UDP, built
//! for server-side use. It provides:
//!
//! - **Reliability**: acknowledged delivery with NACK-driven retransmission
//! - **Ordering**: 32 independent channels with ordered and sequenced modes
//! - **Fragmentation**: transparent splitting and reassembly of large bodies
//! - **Discovery**: offline pings with MOTD and MTU/GUID negotiation
//! - **Robustness**: malformed input is logged and dropped, never fatal
//!
//! ## Feature Flags
//!
//! - `server` (default): async UDP server layer on tokio
//!
//! ## Modules
//!
//! - [`core`]: constants, error types and the handler trait (always included)
//! - [`protocol`]: wire format codecs for every packet type
//! - [`transport`]: per-connection reliability, ordering and fragmentation
//! - [`server`]: offline handshake, connection table and the receive loop
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ranet_protocol::prelude::*;
//!
//! struct Echo;
//!
//! impl ConnectionHandler for Echo {
//!     fn on_connect(&mut self, peer: &PeerInfo) {
//!         println!("{} connected", peer.addr);
//!     }
//!
//!     fn on_message(&mut self, peer: &PeerInfo, payload: &[u8]) {
//!         println!("{} sent {} bytes", peer.addr, payload.len());
//!     }
//! }
//!
//! # async fn run() -> Result<(), ServerError> {
//! let config = RanetServerBuilder::new()
//!     .bind_addr("0.0.0.0:19132".parse().unwrap())
//!     .motd("RANET;demo")
//!     .build();
//! let server = RanetServer::bind(config, Echo).await?;
//! // ... run until shutdown ...
//! server.stop().await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// Core module (always included)
pub mod core;

// Wire format codecs (always included)
pub mod protocol;

// Per-connection transport machinery
pub mod transport;

// Server API (socket loop feature-gated inside)
pub mod server;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::core::{
        CodecError, ConnectionHandler, NullHandler, PeerInfo, ServerError,
    };
    pub use crate::protocol::{Frame, FrameSet, Reliability};
    pub use crate::transport::{Connection, ConnectionEvent, Priority, ServerContext, Status};

    #[cfg(feature = "server")]
    pub use crate::server::{RanetServer, RanetServerBuilder, ServerConfig};
}

// Re-export commonly used items at crate root
pub use self::core::{CodecError, ConnectionHandler, PeerInfo, ServerError};
pub use protocol::{Frame, FrameSet, Reliability};
pub use transport::{Connection, ConnectionEvent, Priority, ServerContext, Status};

#[cfg(feature = "server")]
pub use server::{RanetServer, RanetServerBuilder, ServerConfig};
