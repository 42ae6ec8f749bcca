//! Control surface for the rest of the system.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::session::SessionGate;

/// Cloneable handle for inspecting and ending the current ingest session.
#[derive(Clone)]
pub struct IngestControl {
    gate: Arc<SessionGate>,
}

impl IngestControl {
    pub(crate) fn new(gate: Arc<SessionGate>) -> Self {
        Self { gate }
    }

    /// Disconnects the current publisher, if any. Safe to call repeatedly.
    pub async fn force_disconnect(&self) {
        self.gate.force_disconnect().await;
    }

    pub async fn is_active(&self) -> bool {
        self.gate.is_active().await
    }

    pub async fn current_publisher(&self) -> Option<SocketAddr> {
        self.gate.current_peer().await
    }
}
