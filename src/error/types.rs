//! Error types
//!
//! Defines domain-specific error types for each stage of an ingest session.

use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use thiserror::Error;

/// Admission failures. Both close the publisher's connection and leave
/// session state untouched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("stream already running; can not overtake an existing stream")]
    SessionActive,

    #[error("invalid streaming key; rejecting incoming stream")]
    InvalidStreamKey,
}

/// Push-stream protocol failures
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("session negotiation failed: {0}")]
    Session(String),

    #[error("peer closed the connection before publishing")]
    ClosedBeforePublish,

    #[error("timed out waiting for the publisher")]
    NegotiationTimeout,

    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

/// Output channel failures
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("failed to create pipe {path}: {source}")]
    Create { path: PathBuf, source: io::Error },

    #[error("failed to open pipe {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("{0} exists and is not a named pipe")]
    NotAFifo(PathBuf),

    #[error("failed to write to output channel: {0}")]
    Write(io::Error),
}

/// Top-level ingest server error
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to bind {addr}: {source}")]
    Bind { addr: String, source: io::Error },

    #[error("connection rejected: {0}")]
    Auth(#[from] AuthError),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("output channel error: {0}")]
    Output(#[from] OutputError),

    #[error("unrecoverable failure in session from {peer}: {reason}")]
    Unrecoverable { peer: SocketAddr, reason: String },
}

impl IngestError {
    /// Whether the pipeline must stop instead of continuing with the next publisher.
    ///
    /// Output channel failures are always unrecoverable: a broken downstream
    /// consumer leaves nothing to relay into.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(
            self,
            IngestError::Output(_) | IngestError::Unrecoverable { .. }
        )
    }
}
