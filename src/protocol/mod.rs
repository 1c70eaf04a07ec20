//! RANET Protocol - Wire Format Layer
//!
//! Explicit per-type packet codecs over an unreliable datagram transport:
//!
//! - **Byte cursors**: [`Reader`] and [`Writer`] field-by-field codecs
//! - **Framing**: [`Frame`], [`FrameSet`] and the [`Reliability`] flavors
//! - **Acknowledgments**: [`Ack`] / [`Nack`] range-compressed sequence lists
//! - **Connected packets**: handshake, keep-alive and disconnect bodies
//! - **Offline packets**: MTU/GUID negotiation preceding a connection
//!
//! Everything here is a pure bytes-to-struct transform; no socket or
//! connection state is touched.

mod acknowledge;
mod codec;
mod frame;
pub mod offline;
pub mod online;

pub use acknowledge::{Ack, Nack};
pub use codec::{Reader, Writer};
pub use frame::{Frame, FragmentMeta, FrameSet, Reliability};
