//! Packet model
//!
//! A packet is one timestamped audio, video or metadata unit as produced by
//! the protocol layer. Payloads are relayed untouched.

use bytes::Bytes;
use std::future::Future;

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Audio,
    Video,
    Metadata,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: PacketKind,
    /// Milliseconds, as carried by the push-stream protocol
    pub timestamp: u32,
    pub payload: Bytes,
}

impl Packet {
    pub fn audio(timestamp: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: PacketKind::Audio,
            timestamp,
            payload: payload.into(),
        }
    }

    pub fn video(timestamp: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            kind: PacketKind::Video,
            timestamp,
            payload: payload.into(),
        }
    }

    pub fn metadata(payload: impl Into<Bytes>) -> Self {
        Self {
            kind: PacketKind::Metadata,
            timestamp: 0,
            payload: payload.into(),
        }
    }
}

/// Anything the relay can pull packets from.
pub trait PacketSource: Send {
    /// Reads the next packet in receipt order.
    ///
    /// `Ok(None)` means the publisher ended the stream.
    fn read_packet(&mut self) -> impl Future<Output = Result<Option<Packet>, ProtocolError>> + Send;
}
