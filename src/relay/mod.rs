//! Packet relay
//!
//! Moves packets from the publisher into the output channel, re-muxed as FLV.

pub mod flv;
pub mod packet;
pub mod packet_relay;
pub mod pipe;

pub use flv::FlvMuxer;
pub use packet::{Packet, PacketKind, PacketSource};
pub use packet_relay::{PacketRelay, RelayOutcome};
pub use pipe::{ensure_fifo, open_output};
