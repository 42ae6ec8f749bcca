//! Stream metadata translation
//!
//! Turns the publisher's `onMetaData` into the broadcaster details handed to
//! the rest of the system. The script payload written to the FLV output is
//! normally the publisher's own bytes; [`encode_on_metadata`] only rebuilds
//! one when those bytes could not be captured.

use bytes::Bytes;
use rml_amf0::Amf0Value;
use rml_rtmp::sessions::StreamMetadata;
use std::collections::HashMap;

use crate::error::ProtocolError;
use crate::session::StreamDetails;

/// AMF0 string marker, u16 length, then `@setDataFrame`.
const SET_DATA_FRAME: &[u8] = b"\x02\x00\x0d@setDataFrame";
const ON_METADATA: &[u8] = b"\x02\x00\x0aonMetaData";

impl From<&StreamMetadata> for StreamDetails {
    fn from(metadata: &StreamMetadata) -> Self {
        Self {
            video_width: metadata.video_width,
            video_height: metadata.video_height,
            video_codec_id: metadata.video_codec_id,
            video_bitrate_kbps: metadata.video_bitrate_kbps,
            video_frame_rate: metadata.video_frame_rate,
            audio_codec_id: metadata.audio_codec_id,
            audio_bitrate_kbps: metadata.audio_bitrate_kbps,
            audio_sample_rate: metadata.audio_sample_rate,
            audio_channels: metadata.audio_channels,
            audio_is_stereo: metadata.audio_is_stereo,
            encoder: metadata.encoder.clone(),
        }
    }
}

/// Strips the leading `@setDataFrame` from an AMF0 data message.
///
/// What is left (`onMetaData` and its properties) is the FLV script tag body,
/// untouched. `None` unless the message is `@setDataFrame` + `onMetaData`.
pub fn strip_set_data_frame(data: &Bytes) -> Option<Bytes> {
    let body = data.strip_prefix(SET_DATA_FRAME)?;
    body.starts_with(ON_METADATA)
        .then(|| data.slice(SET_DATA_FRAME.len()..))
}

/// Serializes `details` as an `onMetaData` script data payload.
pub fn encode_on_metadata(details: &StreamDetails) -> Result<Bytes, ProtocolError> {
    let mut properties = HashMap::new();
    let mut number = |key: &str, value: Option<f64>| {
        if let Some(value) = value {
            properties.insert(key.to_string(), Amf0Value::Number(value));
        }
    };
    number("width", details.video_width.map(f64::from));
    number("height", details.video_height.map(f64::from));
    number("videocodecid", details.video_codec_id.map(f64::from));
    number("videodatarate", details.video_bitrate_kbps.map(f64::from));
    number("framerate", details.video_frame_rate.map(f64::from));
    number("audiocodecid", details.audio_codec_id.map(f64::from));
    number("audiodatarate", details.audio_bitrate_kbps.map(f64::from));
    number("audiosamplerate", details.audio_sample_rate.map(f64::from));
    number("audiochannels", details.audio_channels.map(f64::from));

    if let Some(stereo) = details.audio_is_stereo {
        properties.insert("stereo".to_string(), Amf0Value::Boolean(stereo));
    }
    if let Some(encoder) = &details.encoder {
        properties.insert(
            "encoder".to_string(),
            Amf0Value::Utf8String(encoder.clone()),
        );
    }

    let values = vec![
        Amf0Value::Utf8String("onMetaData".to_string()),
        Amf0Value::Object(properties),
    ];
    rml_amf0::serialize(&values)
        .map(Bytes::from)
        .map_err(|e| ProtocolError::Session(format!("failed to encode metadata: {e:?}")))
}
