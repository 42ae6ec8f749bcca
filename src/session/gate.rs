//! Session gate
//!
//! Holds the single process-wide session slot. `admit` is the only way in,
//! `teardown`/`force_disconnect` the only ways out, and all of them run under
//! one lock so an admission can never interleave with a teardown.

use log::{error, info, trace};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

use crate::auth::{StreamingCredential, validate_stream_key};
use crate::error::AuthError;
use crate::session::handler::IngestHandler;
use crate::session::state::{ActiveSession, Disconnect, SessionId};

/// Proof of admission handed to the relay.
#[derive(Debug)]
pub struct Admission {
    id: SessionId,
    peer: SocketAddr,
    stop: watch::Receiver<bool>,
}

impl Admission {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Resolves once the session has been torn down.
    pub async fn stopped(&mut self) {
        // A dropped sender means the gate itself is gone; stop as well
        let _ = self.stop.wait_for(|stopped| *stopped).await;
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }
}

#[derive(Default)]
struct GateState {
    current: Option<ActiveSession>,
    next_id: SessionId,
}

/// Enforces the at-most-one-publisher policy.
pub struct SessionGate {
    credential: StreamingCredential,
    handler: Arc<dyn IngestHandler>,
    state: Mutex<GateState>,
}

impl SessionGate {
    pub fn new(credential: StreamingCredential, handler: Arc<dyn IngestHandler>) -> Self {
        Self {
            credential,
            handler,
            state: Mutex::new(GateState::default()),
        }
    }

    /// Authenticates a publisher and makes it the active session.
    ///
    /// On rejection the transport is closed and nothing else changes. On
    /// success the connected notification fires exactly once.
    pub async fn admit(
        &self,
        path: &str,
        peer: SocketAddr,
        transport: Box<dyn Disconnect>,
    ) -> Result<Admission, AuthError> {
        let mut state = self.state.lock().await;

        if state.current.is_some() {
            error!("{} ({})", AuthError::SessionActive, peer);
            transport.disconnect();
            return Err(AuthError::SessionActive);
        }

        if let Err(e) = validate_stream_key(path, &self.credential) {
            error!("{} ({})", e, peer);
            transport.disconnect();
            return Err(e);
        }

        info!("Incoming RTMP connected from {}", peer);
        self.handler.on_connected();

        state.next_id += 1;
        let id = state.next_id;
        let (stop_tx, stop_rx) = watch::channel(false);
        state.current = Some(ActiveSession::new(id, peer, transport, stop_tx));

        Ok(Admission {
            id,
            peer,
            stop: stop_rx,
        })
    }

    /// Ends session `id` if it is still the active one.
    ///
    /// Returns `false` when there was nothing to tear down: a stale relay can
    /// never end a newer publisher's session.
    pub async fn teardown(&self, id: SessionId) -> bool {
        let mut state = self.state.lock().await;
        match state.current.take_if(|session| session.id() == id) {
            Some(session) => {
                Self::close(session);
                true
            }
            None => false,
        }
    }

    /// Ends whatever session is active. No-op when idle.
    pub async fn force_disconnect(&self) -> bool {
        trace!("Inbound stream disconnect requested");
        let mut state = self.state.lock().await;
        match state.current.take() {
            Some(session) => {
                Self::close(session);
                true
            }
            None => false,
        }
    }

    pub async fn is_active(&self) -> bool {
        self.state.lock().await.current.is_some()
    }

    /// Whether `id` is still the active session.
    pub async fn is_current(&self, id: SessionId) -> bool {
        self.state
            .lock()
            .await
            .current
            .as_ref()
            .is_some_and(|session| session.id() == id)
    }

    /// Address of the active publisher, if any.
    pub async fn current_peer(&self) -> Option<SocketAddr> {
        self.state
            .lock()
            .await
            .current
            .as_ref()
            .map(ActiveSession::peer)
    }

    fn close(session: ActiveSession) {
        info!(
            "RTMP disconnected: {} after {:?}",
            session.peer(),
            session.started_at().elapsed()
        );
        session.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::handler::BroadcasterInfo;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingHandler {
        connected: AtomicUsize,
    }

    impl IngestHandler for CountingHandler {
        fn on_connected(&self) {
            self.connected.fetch_add(1, Ordering::SeqCst);
        }

        fn on_metadata(&self, _info: BroadcasterInfo) {}
    }

    #[derive(Clone, Default)]
    struct FakeTransport(Arc<AtomicBool>);

    impl FakeTransport {
        fn is_closed(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl Disconnect for FakeTransport {
        fn disconnect(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    fn gate() -> (SessionGate, Arc<CountingHandler>) {
        let handler = Arc::new(CountingHandler::default());
        let gate = SessionGate::new(StreamingCredential::new("abc123"), handler.clone());
        (gate, handler)
    }

    #[tokio::test]
    async fn admits_valid_key_once() {
        let (gate, handler) = gate();
        let transport = FakeTransport::default();

        let admission = gate
            .admit("/live/abc123", peer(1), Box::new(transport.clone()))
            .await
            .unwrap();

        assert!(gate.is_active().await);
        assert!(gate.is_current(admission.id()).await);
        assert_eq!(gate.current_peer().await, Some(peer(1)));
        assert_eq!(handler.connected.load(Ordering::SeqCst), 1);
        assert!(!transport.is_closed());
        assert!(!admission.is_stopped());
    }

    #[tokio::test]
    async fn rejects_wrong_key_without_side_effects() {
        let (gate, handler) = gate();
        let transport = FakeTransport::default();

        let result = gate
            .admit("/live/wrong", peer(1), Box::new(transport.clone()))
            .await;

        assert_eq!(result.unwrap_err(), AuthError::InvalidStreamKey);
        assert!(!gate.is_active().await);
        assert_eq!(handler.connected.load(Ordering::SeqCst), 0);
        assert!(transport.is_closed());
    }

    #[tokio::test]
    async fn rejects_second_publisher_and_keeps_first() {
        let (gate, handler) = gate();
        let first = FakeTransport::default();
        let second = FakeTransport::default();

        let admission = gate
            .admit("/live/abc123", peer(1), Box::new(first.clone()))
            .await
            .unwrap();
        let result = gate
            .admit("/live/abc123", peer(2), Box::new(second.clone()))
            .await;

        assert_eq!(result.unwrap_err(), AuthError::SessionActive);
        assert!(second.is_closed());
        assert!(!first.is_closed());
        assert!(gate.is_current(admission.id()).await);
        assert_eq!(gate.current_peer().await, Some(peer(1)));
        assert_eq!(handler.connected.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn wrong_key_while_active_is_rejected_as_duplicate() {
        let (gate, _handler) = gate();
        gate.admit("/live/abc123", peer(1), Box::new(FakeTransport::default()))
            .await
            .unwrap();

        let result = gate
            .admit("/live/wrong", peer(2), Box::new(FakeTransport::default()))
            .await;
        assert_eq!(result.unwrap_err(), AuthError::SessionActive);
    }

    #[tokio::test]
    async fn teardown_closes_and_allows_readmission() {
        let (gate, handler) = gate();
        let transport = FakeTransport::default();
        let mut admission = gate
            .admit("/live/abc123", peer(1), Box::new(transport.clone()))
            .await
            .unwrap();

        assert!(gate.teardown(admission.id()).await);
        admission.stopped().await;

        assert!(transport.is_closed());
        assert!(admission.is_stopped());
        assert!(!gate.is_active().await);

        let next = gate
            .admit("/live/abc123", peer(2), Box::new(FakeTransport::default()))
            .await
            .unwrap();
        assert_ne!(next.id(), admission.id());
        assert_eq!(handler.connected.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn teardown_is_idempotent() {
        let (gate, _handler) = gate();
        assert!(!gate.teardown(1).await);
        assert!(!gate.force_disconnect().await);

        let admission = gate
            .admit("/live/abc123", peer(1), Box::new(FakeTransport::default()))
            .await
            .unwrap();
        assert!(gate.teardown(admission.id()).await);
        assert!(!gate.teardown(admission.id()).await);
        assert!(!gate.force_disconnect().await);
    }

    #[tokio::test]
    async fn stale_teardown_leaves_newer_session_alone() {
        let (gate, _handler) = gate();
        let old = gate
            .admit("/live/abc123", peer(1), Box::new(FakeTransport::default()))
            .await
            .unwrap();
        gate.force_disconnect().await;

        let current = FakeTransport::default();
        let new = gate
            .admit("/live/abc123", peer(2), Box::new(current.clone()))
            .await
            .unwrap();

        assert!(!gate.teardown(old.id()).await);
        assert!(gate.is_current(new.id()).await);
        assert!(!current.is_closed());
    }

    #[tokio::test]
    async fn force_disconnect_matches_natural_teardown() {
        let (gate, _handler) = gate();
        let transport = FakeTransport::default();
        let admission = gate
            .admit("/live/abc123", peer(1), Box::new(transport.clone()))
            .await
            .unwrap();

        assert!(gate.force_disconnect().await);
        assert!(transport.is_closed());
        assert!(admission.is_stopped());
        assert!(!gate.is_active().await);
    }

    #[tokio::test]
    async fn concurrent_admissions_yield_exactly_one_session() {
        let (gate, handler) = gate();
        let gate = Arc::new(gate);

        let mut tasks = Vec::new();
        for port in 0..16 {
            let gate = gate.clone();
            tasks.push(tokio::spawn(async move {
                gate.admit("/live/abc123", peer(port), Box::new(FakeTransport::default()))
                    .await
                    .is_ok()
            }));
        }

        let mut admitted = 0;
        for task in tasks {
            if task.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, 1);
        assert_eq!(handler.connected.load(Ordering::SeqCst), 1);
    }
}
