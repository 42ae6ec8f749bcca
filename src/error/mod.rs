//! Error handling
//!
//! Defines error types and handling for the ingest server.

pub mod handlers;
pub mod types;

pub use types::*;
