use thiserror::Error;
use venuebook_common::{external_service_error, VenuebookError};

/// Live event channel errors.
#[derive(Error, Debug)]
pub enum LiveError {
    /// WebSocket transport failure
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// A frame that does not follow the Socket.IO protocol
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The server refused the namespace connection
    #[error("Connection rejected: {0}")]
    Rejected(String),

    #[error("Invalid live channel URL: {0}")]
    InvalidUrl(String),

    /// Handshake or heartbeat deadline passed
    #[error("Live channel timed out")]
    Timeout,

    /// Connection ended by the server or the network
    #[error("Connection closed: {0}")]
    Closed(String),
}

impl From<LiveError> for VenuebookError {
    fn from(err: LiveError) -> Self {
        match err {
            LiveError::Rejected(msg) => VenuebookError::AuthError(msg),
            LiveError::InvalidUrl(msg) => VenuebookError::ConfigError(msg),
            LiveError::Timeout => VenuebookError::TimeoutError("live channel".into()),
            other => external_service_error("live-channel", other),
        }
    }
}
