//! Error handlers
//!
//! Logging and escalation for errors raised by connection tasks.

use log::{debug, error};
use std::net::SocketAddr;

use crate::error::types::{IngestError, ProtocolError};

/// Log an error raised while handling a connection, at a level matching its kind.
pub fn handle_error(peer: SocketAddr, err: &IngestError) {
    match err {
        IngestError::Auth(e) => error!("{} ({})", e, peer),
        // Scanners and aborted publishers; not worth more than a debug line
        IngestError::Protocol(ProtocolError::ClosedBeforePublish) => {
            debug!("{} closed the connection before publishing", peer)
        }
        IngestError::Protocol(e) => error!("Dropping connection from {}: {}", peer, e),
        e if e.is_unrecoverable() => error!("Ingest pipeline failed: {}", e),
        e => error!("Ingest error from {}: {}", peer, e),
    }
}

/// Turn an error into the unrecoverable kind, tagged with the offending peer.
pub fn escalate(peer: SocketAddr, err: impl std::fmt::Display) -> IngestError {
    IngestError::Unrecoverable {
        peer,
        reason: err.to_string(),
    }
}
