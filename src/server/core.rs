use log::{error, info};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use crate::config::ServerConfig;
use crate::error::handlers::handle_error;
use crate::error::{IngestError, ProtocolError};
use crate::protocol::negotiate;
use crate::relay::{FlvMuxer, PacketRelay, open_output};
use crate::server::control::IngestControl;
use crate::session::{IngestHandler, SessionGate};

pub struct IngestServer {
    listener: TcpListener,
    gate: Arc<SessionGate>,
    handler: Arc<dyn IngestHandler>,
    config: Arc<ServerConfig>,
}

/// Shared state each connection task gets a copy of.
#[derive(Clone)]
struct ConnectionContext {
    gate: Arc<SessionGate>,
    handler: Arc<dyn IngestHandler>,
    config: Arc<ServerConfig>,
}

impl IngestServer {
    /// Binds the configured port. Failing to bind is fatal for startup.
    pub async fn bind(
        config: ServerConfig,
        handler: Arc<dyn IngestHandler>,
    ) -> Result<Self, IngestError> {
        let addr = config.listen_socket();
        let listener = match TcpListener::bind(&addr).await {
            Ok(listener) => {
                info!("RTMP server bound to {}", addr);
                listener
            }
            Err(source) => {
                error!("Failed to bind to {}: {}", addr, source);
                return Err(IngestError::Bind { addr, source });
            }
        };

        let gate = Arc::new(SessionGate::new(config.credential(), handler.clone()));

        Ok(Self {
            listener,
            gate,
            handler,
            config: Arc::new(config),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn control(&self) -> IngestControl {
        IngestControl::new(self.gate.clone())
    }

    /// Accepts publishers until a session hits an unrecoverable error.
    ///
    /// Transient accept errors are logged and retried after a short pause.
    pub async fn run(self) -> Result<(), IngestError> {
        info!(
            "RTMP server is listening for incoming stream on {}",
            self.config.listen_socket()
        );

        let (fatal_tx, mut fatal_rx) = mpsc::channel::<IngestError>(1);
        let context = ConnectionContext {
            gate: self.gate.clone(),
            handler: self.handler.clone(),
            config: self.config.clone(),
        };

        loop {
            tokio::select! {
                Some(err) = fatal_rx.recv() => {
                    error!("Stopping ingest: {}", err);
                    return Err(err);
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        info!("Accepted connection from {}", addr);
                        let context = context.clone();
                        let fatal_tx = fatal_tx.clone();

                        // Spawn a task per connection so a slow handshake can't block accepts
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, addr, context).await {
                                handle_error(addr, &e);
                                if e.is_unrecoverable() {
                                    let _ = fatal_tx.send(e).await;
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(self.config.accept_backoff()).await;
                    }
                }
            }
        }
    }
}

/// Negotiates, admits and relays one publisher.
async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    context: ConnectionContext,
) -> Result<(), IngestError> {
    let ConnectionContext {
        gate,
        handler,
        config,
    } = context;

    // A second handle on the socket lets teardown close it from any task
    let std_stream = stream.into_std().map_err(ProtocolError::from)?;
    let closer = std_stream.try_clone().map_err(ProtocolError::from)?;
    let stream = TcpStream::from_std(std_stream).map_err(ProtocolError::from)?;

    let (mut connection, request) = negotiate(stream, peer, config.read_timeout()).await?;
    let admission = gate.admit(&request.path(), peer, Box::new(closer)).await?;

    if let Err(e) = connection.accept_publish(&request).await {
        gate.teardown(admission.id()).await;
        return Err(e.into());
    }

    let output = match open_output(&config.pipe_path()) {
        Ok(output) => output,
        Err(e) => {
            gate.teardown(admission.id()).await;
            return Err(e.into());
        }
    };

    let relay = PacketRelay::new(
        gate.clone(),
        admission,
        connection.into_publisher(handler),
        FlvMuxer::new(output),
        config.read_timeout(),
    );
    relay.run().await?;
    Ok(())
}
