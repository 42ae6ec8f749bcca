//! Configuration management for the RTMP ingest server
//!
//! Settings come from `config.toml` with environment overrides
//! (`RTMP_INGEST_<KEY>`). Everything here is read once at startup.

use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::StreamingCredential;

/// Complete ingest server configuration
///
/// Keys missing from the file fall back to [`ServerConfig::default`].
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    // ═══ NETWORK ═══
    /// IP address the RTMP listener binds to
    pub bind_address: String,

    /// Port for inbound RTMP publishers
    pub rtmp_port: u16,

    // ═══ STREAM ═══
    /// Secret a publisher must present as the final segment of the connect URL
    pub stream_key: String,

    /// Named pipe the re-muxed stream is written to
    pub pipe_path: String,

    // ═══ BEHAVIOR ═══
    /// Seconds without a packet before the publisher is considered gone
    pub read_timeout_secs: u64,

    /// Pause after a transient accept error
    pub accept_backoff_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            rtmp_port: 1935,
            stream_key: String::new(),
            pipe_path: std::env::temp_dir()
                .join("rtmp-ingest.flv.pipe")
                .to_string_lossy()
                .to_string(),
            read_timeout_secs: 10,
            accept_backoff_ms: 1000,
        }
    }
}

impl ServerConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, config::ConfigError> {
        // Packaged layout first, then the working directory
        let config_paths = ["rtmp-ingest/config", "config"];

        let mut last_error = None;

        for config_path in &config_paths {
            match Config::builder()
                .add_source(File::with_name(config_path))
                .add_source(
                    Environment::with_prefix("RTMP_INGEST")
                        .prefix_separator("_")
                        .separator("__"),
                )
                .build()
            {
                Ok(settings) => {
                    let config: ServerConfig = settings.try_deserialize()?;
                    config.validate()?;
                    return Ok(config);
                }
                Err(e) => {
                    last_error = Some(e);
                    continue;
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            config::ConfigError::Message(format!(
                "no configuration found, tried {config_paths:?}"
            ))
        }))
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.rtmp_port == 0 {
            return Err(config::ConfigError::Message("rtmp_port cannot be 0".into()));
        }

        if self.stream_key.is_empty() {
            return Err(config::ConfigError::Message(
                "stream_key cannot be empty".into(),
            ));
        }

        if self.pipe_path.is_empty() {
            return Err(config::ConfigError::Message(
                "pipe_path cannot be empty".into(),
            ));
        }

        if self.read_timeout_secs == 0 {
            return Err(config::ConfigError::Message(
                "read_timeout_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Bind address and port as a socket address string
    pub fn listen_socket(&self) -> String {
        format!("{}:{}", self.bind_address, self.rtmp_port)
    }

    pub fn credential(&self) -> StreamingCredential {
        StreamingCredential::new(self.stream_key.clone())
    }

    pub fn pipe_path(&self) -> PathBuf {
        PathBuf::from(&self.pipe_path)
    }

    /// Liveness deadline applied before every read from the publisher
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn accept_backoff(&self) -> Duration {
        Duration::from_millis(self.accept_backoff_ms)
    }
}
