//! Packet relay loop
//!
//! Reads one packet at a time from the publisher and writes it, re-muxed,
//! to the output channel. Nothing is buffered in between, so a stalled
//! consumer stalls the reads and backpressure reaches the publisher.

use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;

use crate::error::IngestError;
use crate::error::handlers::escalate;
use crate::relay::flv::FlvMuxer;
use crate::relay::packet::PacketSource;
use crate::session::{Admission, SessionGate};

/// Why a relay stopped without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The publisher closed the stream.
    EndOfStream,
    /// Nothing arrived within the read deadline.
    TimedOut,
    /// The session was torn down from outside.
    Stopped,
}

/// Relays one admitted session. Consumed by [`PacketRelay::run`].
pub struct PacketRelay<S, W> {
    gate: Arc<SessionGate>,
    admission: Admission,
    source: S,
    muxer: FlvMuxer<W>,
    read_timeout: Duration,
}

impl<S, W> PacketRelay<S, W>
where
    S: PacketSource,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(
        gate: Arc<SessionGate>,
        admission: Admission,
        source: S,
        muxer: FlvMuxer<W>,
        read_timeout: Duration,
    ) -> Self {
        Self {
            gate,
            admission,
            source,
            muxer,
            read_timeout,
        }
    }

    /// Runs until the stream ends, goes silent, is stopped, or fails.
    ///
    /// Every exit leaves the session torn down and the output handle closed.
    /// Read errors other than end-of-stream and write errors come back as
    /// [`IngestError::Unrecoverable`].
    pub async fn run(mut self) -> Result<RelayOutcome, IngestError> {
        let id = self.admission.id();
        let peer = self.admission.peer();

        let result = self.relay().await;
        match &result {
            Ok(RelayOutcome::Stopped) => debug!("Relay for {} stopped", peer),
            Ok(outcome) => info!("Relay for {} finished: {:?}", peer, outcome),
            Err(_) => {}
        }

        // No-op when the stop came from a teardown elsewhere
        self.gate.teardown(id).await;
        result
    }

    async fn relay(&mut self) -> Result<RelayOutcome, IngestError> {
        let peer = self.admission.peer();

        tokio::select! {
            biased;
            _ = self.admission.stopped() => return Ok(RelayOutcome::Stopped),
            written = self.muxer.write_header() => {
                written.map_err(|e| escalate(peer, e))?;
            }
        }

        loop {
            if !self.gate.is_current(self.admission.id()).await {
                return Ok(RelayOutcome::Stopped);
            }

            let read = tokio::select! {
                biased;
                _ = self.admission.stopped() => return Ok(RelayOutcome::Stopped),
                read = tokio::time::timeout(self.read_timeout, self.source.read_packet()) => read,
            };

            let packet = match read {
                Err(_elapsed) => {
                    debug!(
                        "Timeout reading the inbound stream from {}. Assuming that they disconnected and ending the stream.",
                        peer
                    );
                    return Ok(RelayOutcome::TimedOut);
                }
                Ok(Ok(None)) => return Ok(RelayOutcome::EndOfStream),
                Ok(Ok(Some(packet))) => packet,
                Ok(Err(e)) => return Err(escalate(peer, e)),
            };

            tokio::select! {
                biased;
                _ = self.admission.stopped() => return Ok(RelayOutcome::Stopped),
                written = self.muxer.write_packet(&packet) => {
                    written.map_err(|e| escalate(peer, e))?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StreamingCredential;
    use crate::error::ProtocolError;
    use crate::relay::flv::{FLV_HEADER_SIZE, encode_header, encode_tag};
    use crate::relay::packet::Packet;
    use crate::session::{BroadcasterInfo, Disconnect, IngestHandler};
    use std::collections::VecDeque;
    use std::io;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt;

    struct NoopHandler;

    impl IngestHandler for NoopHandler {
        fn on_connected(&self) {}
        fn on_metadata(&self, _info: BroadcasterInfo) {}
    }

    struct NoopTransport;

    impl Disconnect for NoopTransport {
        fn disconnect(&self) {}
    }

    enum Step {
        Packet(Packet),
        Eof,
        Fail,
        Stall,
    }

    struct ScriptedSource(VecDeque<Step>);

    impl PacketSource for ScriptedSource {
        async fn read_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
            match self.0.pop_front().unwrap_or(Step::Eof) {
                Step::Packet(packet) => Ok(Some(packet)),
                Step::Eof => Ok(None),
                Step::Fail => Err(ProtocolError::Io(io::Error::from(
                    io::ErrorKind::ConnectionReset,
                ))),
                Step::Stall => std::future::pending().await,
            }
        }
    }

    async fn admitted() -> (Arc<SessionGate>, Admission) {
        let gate = Arc::new(SessionGate::new(
            StreamingCredential::new("abc123"),
            Arc::new(NoopHandler),
        ));
        let peer = SocketAddr::from(([127, 0, 0, 1], 4000));
        let admission = gate
            .admit("/live/abc123", peer, Box::new(NoopTransport))
            .await
            .unwrap();
        (gate, admission)
    }

    fn packets() -> Vec<Packet> {
        vec![
            Packet::metadata(vec![2, 0, 10]),
            Packet::video(0, vec![0x17, 0, 0, 0, 0]),
            Packet::audio(0, vec![0xAF, 0]),
            Packet::video(33, vec![0x27, 1, 2, 3]),
            Packet::audio(23, vec![0xAF, 1, 9]),
        ]
    }

    #[tokio::test]
    async fn relays_in_order_until_eof() {
        let (gate, admission) = admitted().await;
        let (writer, mut reader) = tokio::io::duplex(1 << 16);
        let mut steps: VecDeque<Step> = packets().into_iter().map(Step::Packet).collect();
        steps.push_back(Step::Eof);

        let relay = PacketRelay::new(
            gate.clone(),
            admission,
            ScriptedSource(steps),
            FlvMuxer::new(writer),
            Duration::from_secs(10),
        );
        let outcome = relay.run().await.unwrap();

        let mut expected = encode_header().to_vec();
        for packet in packets() {
            expected.extend_from_slice(&encode_tag(&packet));
        }
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();

        assert_eq!(outcome, RelayOutcome::EndOfStream);
        assert_eq!(out, expected);
        assert!(!gate.is_active().await);
    }

    #[tokio::test(start_paused = true)]
    async fn silence_ends_session() {
        let (gate, admission) = admitted().await;
        let (writer, mut reader) = tokio::io::duplex(1 << 16);
        let steps = VecDeque::from([Step::Packet(Packet::audio(0, vec![1])), Step::Stall]);

        let relay = PacketRelay::new(
            gate.clone(),
            admission,
            ScriptedSource(steps),
            FlvMuxer::new(writer),
            Duration::from_secs(10),
        );
        let started = tokio::time::Instant::now();
        let outcome = relay.run().await.unwrap();

        assert_eq!(outcome, RelayOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(!gate.is_active().await);

        // Writer dropped: the channel handle is closed
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out.len(), FLV_HEADER_SIZE + encode_tag(&Packet::audio(0, vec![1])).len());
    }

    #[tokio::test]
    async fn forced_disconnect_stops_relay() {
        let (gate, admission) = admitted().await;
        let (writer, mut reader) = tokio::io::duplex(1 << 16);

        let relay = PacketRelay::new(
            gate.clone(),
            admission,
            ScriptedSource(VecDeque::from([Step::Stall])),
            FlvMuxer::new(writer),
            Duration::from_secs(3600),
        );
        let task = tokio::spawn(relay.run());

        // Header reaches the channel before the relay blocks on the read
        let mut header = [0u8; FLV_HEADER_SIZE];
        reader.read_exact(&mut header).await.unwrap();

        assert!(gate.force_disconnect().await);
        let outcome = task.await.unwrap().unwrap();

        assert_eq!(outcome, RelayOutcome::Stopped);
        assert!(!gate.is_active().await);
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());
    }

    #[tokio::test]
    async fn read_error_is_unrecoverable() {
        let (gate, admission) = admitted().await;
        let (writer, _reader) = tokio::io::duplex(1 << 16);

        let relay = PacketRelay::new(
            gate.clone(),
            admission,
            ScriptedSource(VecDeque::from([Step::Fail])),
            FlvMuxer::new(writer),
            Duration::from_secs(10),
        );
        let err = relay.run().await.unwrap_err();

        assert!(err.is_unrecoverable());
        assert!(!gate.is_active().await);
    }

    #[tokio::test]
    async fn write_error_is_unrecoverable() {
        let (gate, admission) = admitted().await;
        let (writer, reader) = tokio::io::duplex(1 << 16);
        drop(reader);

        let relay = PacketRelay::new(
            gate.clone(),
            admission,
            ScriptedSource(VecDeque::from([Step::Packet(Packet::video(0, vec![1]))])),
            FlvMuxer::new(writer),
            Duration::from_secs(10),
        );
        let err = relay.run().await.unwrap_err();

        assert!(matches!(err, IngestError::Unrecoverable { .. }));
        assert!(!gate.is_active().await);
    }
}
