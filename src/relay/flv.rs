//! FLV re-muxer
//!
//! # Layout
//!
//! File header (13 bytes):
//! - 3 bytes: signature "FLV"
//! - 1 byte: version (1)
//! - 1 byte: flags (audio | video)
//! - 4 bytes: header length (9, big-endian)
//! - 4 bytes: PreviousTagSize0 (0)
//!
//! Each tag:
//! - 1 byte: tag type (8 audio, 9 video, 18 script data)
//! - 3 bytes: payload length
//! - 3 bytes: timestamp, low 24 bits
//! - 1 byte: timestamp, high 8 bits
//! - 3 bytes: stream id (always 0)
//! - N bytes: payload
//! - 4 bytes: previous tag size (11 + N)

use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::OutputError;
use crate::relay::packet::{Packet, PacketKind};

pub const FLV_SIGNATURE: [u8; 3] = *b"FLV";

pub const FLV_HEADER_SIZE: usize = 13;

pub const TAG_HEADER_SIZE: usize = 11;

const FLAG_AUDIO: u8 = 0x04;
const FLAG_VIDEO: u8 = 0x01;

impl PacketKind {
    /// FLV tag type for this kind of packet.
    pub fn tag_type(self) -> u8 {
        match self {
            PacketKind::Audio => 8,
            PacketKind::Video => 9,
            PacketKind::Metadata => 18,
        }
    }
}

pub fn encode_header() -> Bytes {
    let mut buf = BytesMut::with_capacity(FLV_HEADER_SIZE);
    buf.put_slice(&FLV_SIGNATURE);
    buf.put_u8(1);
    buf.put_u8(FLAG_AUDIO | FLAG_VIDEO);
    buf.put_u32(9);
    buf.put_u32(0);
    buf.freeze()
}

/// Frames one packet as an FLV tag followed by its previous-tag-size trailer.
///
/// RTMP message lengths are 24-bit, so payloads always fit the size field.
pub fn encode_tag(packet: &Packet) -> Bytes {
    let len = packet.payload.len();
    let mut buf = BytesMut::with_capacity(TAG_HEADER_SIZE + len + 4);
    buf.put_u8(packet.kind.tag_type());
    buf.put_uint(len as u64, 3);
    buf.put_uint(u64::from(packet.timestamp & 0x00FF_FFFF), 3);
    buf.put_u8((packet.timestamp >> 24) as u8);
    buf.put_uint(0, 3);
    buf.put_slice(&packet.payload);
    buf.put_u32((TAG_HEADER_SIZE + len) as u32);
    buf.freeze()
}

/// Writes an FLV stream into `W`. The header goes out before the first tag.
pub struct FlvMuxer<W> {
    writer: W,
    header_written: bool,
}

impl<W: AsyncWrite + Unpin> FlvMuxer<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header_written: false,
        }
    }

    pub async fn write_header(&mut self) -> Result<(), OutputError> {
        if self.header_written {
            return Ok(());
        }
        self.write(&encode_header()).await?;
        self.header_written = true;
        Ok(())
    }

    pub async fn write_packet(&mut self, packet: &Packet) -> Result<(), OutputError> {
        self.write_header().await?;
        self.write(&encode_tag(packet)).await
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), OutputError> {
        self.writer.write_all(bytes).await.map_err(OutputError::Write)?;
        self.writer.flush().await.map_err(OutputError::Write)
    }
}
