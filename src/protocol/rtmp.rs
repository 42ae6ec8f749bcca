//! RTMP connection handling
//!
//! Drives the server side of an RTMP connection with `rml_rtmp`: handshake,
//! `connect`, then `publish`. The publish request is handed back to the caller
//! for admission; only once admitted does the connection become a packet
//! source.

use chrono::Utc;
use log::{debug, trace, warn};
use rml_rtmp::handshake::{Handshake, HandshakeProcessResult, PeerType};
use rml_rtmp::sessions::{
    ServerSession, ServerSessionConfig, ServerSessionEvent, ServerSessionResult,
};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::error::ProtocolError;
use crate::protocol::data_frames::DataFrameTap;
use crate::protocol::metadata::encode_on_metadata;
use crate::relay::{Packet, PacketSource};
use crate::session::{BroadcasterInfo, IngestHandler, StreamDetails};

const READ_BUFFER_SIZE: usize = 4096;

fn session_error(e: impl std::fmt::Debug) -> ProtocolError {
    ProtocolError::Session(format!("{e:?}"))
}

/// A publisher asking to publish `/<app_name>/<stream_key>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    request_id: u32,
    pub app_name: String,
    pub stream_key: String,
}

impl PublishRequest {
    /// The connect path; its final segment is the presented stream key.
    pub fn path(&self) -> String {
        format!("/{}/{}", self.app_name, self.stream_key)
    }
}

/// A negotiated RTMP connection, not yet publishing.
pub struct RtmpConnection {
    stream: TcpStream,
    peer: SocketAddr,
    session: ServerSession,
    tap: DataFrameTap,
    events: VecDeque<ServerSessionEvent>,
    buf: Vec<u8>,
}

/// Runs the handshake and session setup until the peer asks to publish.
///
/// Every read waits at most `read_timeout`.
pub async fn negotiate(
    mut stream: TcpStream,
    peer: SocketAddr,
    read_timeout: Duration,
) -> Result<(RtmpConnection, PublishRequest), ProtocolError> {
    let remaining = handshake(&mut stream, read_timeout).await?;
    trace!("Handshake with {} complete", peer);

    let (session, initial) =
        ServerSession::new(ServerSessionConfig::new()).map_err(session_error)?;
    let mut connection = RtmpConnection {
        stream,
        peer,
        session,
        tap: DataFrameTap::new(peer),
        events: VecDeque::new(),
        buf: vec![0; READ_BUFFER_SIZE],
    };
    connection.apply(initial).await?;
    if !remaining.is_empty() {
        connection.feed(&remaining).await?;
    }

    loop {
        while let Some(event) = connection.events.pop_front() {
            match event {
                ServerSessionEvent::ConnectionRequested {
                    request_id,
                    app_name,
                    ..
                } => {
                    debug!("{} connecting to app '{}'", peer, app_name);
                    let results = connection
                        .session
                        .accept_request(request_id)
                        .map_err(session_error)?;
                    connection.apply(results).await?;
                }
                ServerSessionEvent::PublishStreamRequested {
                    request_id,
                    app_name,
                    stream_key,
                    ..
                } => {
                    debug!("{} requested to publish on app '{}'", peer, app_name);
                    let request = PublishRequest {
                        request_id,
                        app_name,
                        stream_key,
                    };
                    return Ok((connection, request));
                }
                _ => {}
            }
        }

        match tokio::time::timeout(read_timeout, connection.read_more()).await {
            Err(_) => return Err(ProtocolError::NegotiationTimeout),
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => return Err(ProtocolError::ClosedBeforePublish),
            Ok(Err(e)) => return Err(e),
        }
    }
}

/// Server side of the RTMP handshake. Returns bytes received past its end.
async fn handshake(stream: &mut TcpStream, read_timeout: Duration) -> Result<Vec<u8>, ProtocolError> {
    let mut handshake = Handshake::new(PeerType::Server);
    let mut buf = [0u8; READ_BUFFER_SIZE];

    loop {
        let n = match tokio::time::timeout(read_timeout, stream.read(&mut buf)).await {
            Err(_) => return Err(ProtocolError::NegotiationTimeout),
            Ok(read) => read?,
        };
        if n == 0 {
            return Err(ProtocolError::ClosedBeforePublish);
        }

        match handshake
            .process_bytes(&buf[..n])
            .map_err(|e| ProtocolError::Handshake(format!("{e:?}")))?
        {
            HandshakeProcessResult::InProgress { response_bytes } => {
                stream.write_all(&response_bytes).await?;
            }
            HandshakeProcessResult::Completed {
                response_bytes,
                remaining_bytes,
            } => {
                stream.write_all(&response_bytes).await?;
                return Ok(remaining_bytes);
            }
        }
    }
}

impl RtmpConnection {
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Accepts the publish request. Only call this after admission.
    pub async fn accept_publish(&mut self, request: &PublishRequest) -> Result<(), ProtocolError> {
        let results = self
            .session
            .accept_request(request.request_id)
            .map_err(session_error)?;
        self.apply(results).await
    }

    pub fn into_publisher(mut self, handler: Arc<dyn IngestHandler>) -> RtmpPublisher {
        // Only metadata sent while publishing is relayed
        self.tap.clear();
        RtmpPublisher {
            connection: self,
            handler,
            finished: false,
        }
    }

    /// Reads once from the socket and feeds the session. `false` on EOF.
    async fn read_more(&mut self) -> Result<bool, ProtocolError> {
        let n = self.stream.read(&mut self.buf).await?;
        if n == 0 {
            return Ok(false);
        }
        self.tap.observe(&self.buf[..n]);
        let results = self
            .session
            .handle_input(&self.buf[..n])
            .map_err(session_error)?;
        self.apply(results).await?;
        Ok(true)
    }

    async fn feed(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.tap.observe(bytes);
        let results = self.session.handle_input(bytes).map_err(session_error)?;
        self.apply(results).await
    }

    /// Sends outbound packets; queues raised events in order.
    async fn apply(&mut self, results: Vec<ServerSessionResult>) -> Result<(), ProtocolError> {
        for result in results {
            match result {
                ServerSessionResult::OutboundResponse(packet) => {
                    self.stream.write_all(&packet.bytes).await?;
                }
                ServerSessionResult::RaisedEvent(event) => self.events.push_back(event),
                _ => trace!("Ignoring unhandleable message from {}", self.peer),
            }
        }
        Ok(())
    }
}

/// An admitted, publishing connection.
pub struct RtmpPublisher {
    connection: RtmpConnection,
    handler: Arc<dyn IngestHandler>,
    finished: bool,
}

impl RtmpPublisher {
    fn on_event(&mut self, event: ServerSessionEvent) -> Option<Packet> {
        match event {
            ServerSessionEvent::AudioDataReceived {
                data, timestamp, ..
            } => Some(Packet::audio(timestamp.value, data)),
            ServerSessionEvent::VideoDataReceived {
                data, timestamp, ..
            } => Some(Packet::video(timestamp.value, data)),
            ServerSessionEvent::StreamMetadataChanged { metadata, .. } => {
                let details = StreamDetails::from(&metadata);
                debug!("Broadcaster {} metadata: {:?}", self.connection.peer, details);
                let payload = match self.connection.tap.take_metadata() {
                    Some(raw) => Ok(raw),
                    None => encode_on_metadata(&details),
                };
                self.handler.on_metadata(BroadcasterInfo {
                    remote_addr: self.connection.peer,
                    observed_at: Utc::now(),
                    details,
                });
                match payload {
                    Ok(payload) => Some(Packet::metadata(payload)),
                    Err(e) => {
                        warn!("Dropping metadata from {}: {}", self.connection.peer, e);
                        None
                    }
                }
            }
            ServerSessionEvent::PublishStreamFinished { .. } => {
                debug!("{} finished publishing", self.connection.peer);
                self.finished = true;
                None
            }
            _ => None,
        }
    }
}

impl PacketSource for RtmpPublisher {
    async fn read_packet(&mut self) -> Result<Option<Packet>, ProtocolError> {
        loop {
            while let Some(event) = self.connection.events.pop_front() {
                if let Some(packet) = self.on_event(event) {
                    return Ok(Some(packet));
                }
            }
            if self.finished || !self.connection.read_more().await? {
                return Ok(None);
            }
        }
    }
}
