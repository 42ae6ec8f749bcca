//! RTMP Ingest Server - Entry Point
//!
//! Listens for one live RTMP publisher and feeds its stream to the transcoder pipe.

use log::{error, info};
use std::sync::Arc;

use rtmp_ingest::{BroadcasterInfo, IngestHandler, IngestServer, ServerConfig};

/// Reports stream events to the log.
struct LogHandler;

impl IngestHandler for LogHandler {
    fn on_connected(&self) {
        info!("Stream connected");
    }

    fn on_metadata(&self, info: BroadcasterInfo) {
        let details = &info.details;
        info!(
            "Broadcaster {}: {}x{} video codec {:?} @ {:?} kbps, audio codec {:?} @ {:?} kbps, encoder {:?}",
            info.remote_addr,
            details.video_width.unwrap_or_default(),
            details.video_height.unwrap_or_default(),
            details.video_codec_id,
            details.video_bitrate_kbps,
            details.audio_codec_id,
            details.audio_bitrate_kbps,
            details.encoder,
        );
    }
}

#[tokio::main]
async fn main() {
    // Initialize the logger (env_logger picks up RUST_LOG environment variable)
    env_logger::init();

    info!("Launching RTMP ingest server...");

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let server = match IngestServer::bind(config, Arc::new(LogHandler)).await {
        Ok(server) => server,
        Err(e) => {
            error!("Server startup failed: {}", e);
            std::process::exit(1);
        }
    };
    let control = server.control();

    tokio::select! {
        result = server.run() => {
            if let Err(e) = result {
                error!("Ingest server stopped: {}", e);
                std::process::exit(1);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            control.force_disconnect().await;
        }
    }
}
