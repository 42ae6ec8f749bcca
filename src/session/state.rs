//! Session records
//!
//! The state kept for the one publisher currently admitted.

use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Instant;
use tokio::sync::watch;

pub type SessionId = u64;

/// Ability to close a publisher's transport from outside the task reading it.
pub trait Disconnect: Send + Sync {
    fn disconnect(&self);
}

/// A cloned socket handle: shutting it down makes the relay's pending read return.
impl Disconnect for TcpStream {
    fn disconnect(&self) {
        // Already closed by the peer is fine
        let _ = self.shutdown(Shutdown::Both);
    }
}

/// The admitted publisher.
///
/// The relay owns the output channel while it runs; `stop` tells it to drop
/// that handle.
pub struct ActiveSession {
    id: SessionId,
    peer: SocketAddr,
    started_at: Instant,
    transport: Box<dyn Disconnect>,
    stop: watch::Sender<bool>,
}

impl ActiveSession {
    pub(crate) fn new(
        id: SessionId,
        peer: SocketAddr,
        transport: Box<dyn Disconnect>,
        stop: watch::Sender<bool>,
    ) -> Self {
        Self {
            id,
            peer,
            started_at: Instant::now(),
            transport,
            stop,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    /// Close the transport and signal the relay to release the output channel.
    pub(crate) fn close(self) {
        self.transport.disconnect();
        self.stop.send_replace(true);
    }
}
