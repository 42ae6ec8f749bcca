//! RTMP ingest
//!
//! Accepts a single authenticated RTMP publisher and republishes its stream,
//! re-muxed as FLV, into a named pipe read by an external transcoder.

pub mod auth;
pub mod config;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod server;
pub mod session;

pub use config::ServerConfig;
pub use error::IngestError;
pub use server::{IngestControl, IngestServer};
pub use session::{BroadcasterInfo, IngestHandler};
