//! Notifications fired inward when a publisher connects or describes its stream.

use chrono::{DateTime, Utc};
use std::net::SocketAddr;

/// Capabilities the ingest core calls into. Injected once at construction.
///
/// Callbacks run on the connection's task and must not block.
pub trait IngestHandler: Send + Sync {
    /// A publisher was admitted. Fired once per session, before relaying starts.
    fn on_connected(&self);

    /// The publisher sent stream metadata (`onMetaData`).
    fn on_metadata(&self, info: BroadcasterInfo);
}

/// Who is broadcasting, and what they said about their stream.
#[derive(Debug, Clone, PartialEq)]
pub struct BroadcasterInfo {
    pub remote_addr: SocketAddr,
    pub observed_at: DateTime<Utc>,
    pub details: StreamDetails,
}

/// Parsed metadata fields. Publishers fill in whatever they like, so everything is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDetails {
    pub video_width: Option<u32>,
    pub video_height: Option<u32>,
    pub video_codec_id: Option<u32>,
    pub video_bitrate_kbps: Option<u32>,
    pub video_frame_rate: Option<f32>,
    pub audio_codec_id: Option<u32>,
    pub audio_bitrate_kbps: Option<u32>,
    pub audio_sample_rate: Option<u32>,
    pub audio_channels: Option<u32>,
    pub audio_is_stereo: Option<bool>,
    pub encoder: Option<String>,
}
