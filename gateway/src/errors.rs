//! Error types for the a8s gateway

use thiserror::Error;

/// Main error type for the a8s gateway
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Transport error: {0}")]
    TransportError(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Unexpected response body (HTTP {status}): {body}")]
    DecodeError { status: u16, body: String },

    #[error("Overseer returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

/// Failure classes a caller has to tell apart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing or malformed configuration; fatal, never retried
    Configuration,
    /// Network or socket failure
    Transport,
    /// Malformed service address or connection details
    Validation,
    /// Remote-desktop handshake or decoding failure
    Protocol,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::Transport => "transport",
            ErrorKind::Validation => "validation",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Internal => "internal",
        }
    }
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::ConfigError(_) => ErrorKind::Configuration,
            GatewayError::TransportError(_)
            | GatewayError::WebSocketError(_)
            | GatewayError::IoError(_)
            | GatewayError::Timeout(_)
            | GatewayError::Upstream { .. } => ErrorKind::Transport,
            GatewayError::ValidationError(_) => ErrorKind::Validation,
            GatewayError::ProtocolError(_)
            | GatewayError::DecodeError { .. }
            | GatewayError::JsonError(_) => ErrorKind::Protocol,
            GatewayError::ServerError(_)
            | GatewayError::ShutdownError(_)
            | GatewayError::NotFound(_) => ErrorKind::Internal,
        }
    }
}
