//! Push-stream protocol adapter
//!
//! RTMP handshake and publish negotiation, and the packet source the relay
//! reads from once a publisher has been admitted.

pub mod data_frames;
pub mod metadata;
pub mod rtmp;

pub use data_frames::DataFrameTap;
pub use metadata::{encode_on_metadata, strip_set_data_frame};
pub use rtmp::{PublishRequest, RtmpConnection, RtmpPublisher, negotiate};
