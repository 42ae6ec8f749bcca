//! Server core functionality
//!
//! The RTMP listener, per-connection handling and the outward control surface.

pub mod control;
pub mod core;

pub use control::IngestControl;
pub use core::IngestServer;
