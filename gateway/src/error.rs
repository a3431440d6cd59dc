//! Error types for the gateway.

use std::io;

/// Result type alias for gateway operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Wire protocol violation by the device.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Handshake token did not resolve to a registered device.
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// Device failed to identify itself in time.
    #[error("handshake timeout")]
    HandshakeTimeout,

    /// Connection closed by peer.
    #[error("connection closed")]
    ConnectionClosed,

    /// Device stayed silent after a keep-alive probe.
    #[error("keep-alive timeout")]
    KeepAliveTimeout,

    /// Malformed audio payload.
    #[error("audio error: {0}")]
    Audio(#[from] auris_audio::AudioError),

    /// Outbound publish failed or could not be queued.
    #[error("publish error: {0}")]
    Publish(String),

    /// Payload could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),

    /// Registry file could not be parsed.
    #[error("registry error: {0}")]
    Registry(#[from] serde_yaml::Error),

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Gateway is already running.
    #[error("gateway already running")]
    AlreadyRunning,

    /// Gateway is shutting down.
    #[error("gateway shutting down")]
    ShuttingDown,
}
