//! Raw data-message capture
//!
//! `rml_rtmp` parses `@setDataFrame` into typed fields and drops the bytes.
//! The tap reads the same inbound chunk stream with its own deserializer and
//! keeps each metadata body exactly as the publisher sent it, so the script
//! tag in the FLV output is not rebuilt.

use bytes::Bytes;
use log::warn;
use rml_rtmp::chunk_io::ChunkDeserializer;
use std::collections::VecDeque;
use std::net::SocketAddr;

use crate::protocol::metadata::strip_set_data_frame;

const SET_CHUNK_SIZE: u8 = 1;
const AMF0_DATA: u8 = 18;

pub struct DataFrameTap {
    peer: SocketAddr,
    /// `None` once the tap lost track of the chunk stream.
    deserializer: Option<ChunkDeserializer>,
    frames: VecDeque<Bytes>,
}

impl DataFrameTap {
    pub fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            deserializer: Some(ChunkDeserializer::new()),
            frames: VecDeque::new(),
        }
    }

    /// Feeds bytes read from the publisher, in the order the session sees them.
    pub fn observe(&mut self, bytes: &[u8]) {
        let Some(deserializer) = self.deserializer.as_mut() else {
            return;
        };

        let mut input = bytes;
        loop {
            let payload = match deserializer.get_next_message(input) {
                Ok(Some(payload)) => payload,
                Ok(None) => return,
                Err(e) => {
                    warn!("Metadata from {} will be re-encoded: {:?}", self.peer, e);
                    self.deserializer = None;
                    self.frames.clear();
                    return;
                }
            };
            input = &[];

            match payload.type_id {
                SET_CHUNK_SIZE => {
                    let Some(size) = chunk_size(&payload.data) else {
                        continue;
                    };
                    if let Err(e) = deserializer.set_max_chunk_size(size) {
                        warn!("Metadata from {} will be re-encoded: {:?}", self.peer, e);
                        self.deserializer = None;
                        self.frames.clear();
                        return;
                    }
                }
                AMF0_DATA => {
                    if let Some(body) = strip_set_data_frame(&payload.data) {
                        self.frames.push_back(body);
                    }
                }
                _ => {}
            }
        }
    }

    /// Oldest captured `onMetaData` body not yet claimed.
    pub fn take_metadata(&mut self) -> Option<Bytes> {
        self.frames.pop_front()
    }

    /// Drops anything captured so far.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

/// Set Chunk Size carries a 31-bit big-endian size.
fn chunk_size(data: &[u8]) -> Option<usize> {
    let bytes: [u8; 4] = data.get(..4)?.try_into().ok()?;
    Some((u32::from_be_bytes(bytes) & 0x7FFF_FFFF) as usize)
}
