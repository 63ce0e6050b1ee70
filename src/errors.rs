//! Error types shared across the transport.

use std::fmt::{Display, Formatter};

/// Shared transport result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Error enumeration covering every transport failure mode.
///
/// [`AppError::Transport`] and [`AppError::Decode`] are per-exchange
/// failures: the dispatcher and the server-push listener deliver them on
/// the inbound channel and keep running.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Connection, timeout, or unexpected HTTP status for one exchange.
    Transport(String),
    /// Payload was not valid JSON or did not match a JSON-RPC 2.0 shape.
    Decode(String),
    /// The peer answered with a JSON-RPC error during the lifecycle handshake.
    Mcp(String),
    /// File-system or stdio failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Transport(msg) => write!(f, "transport: {msg}"),
            Self::Decode(msg) => write!(f, "decode: {msg}"),
            Self::Mcp(msg) => write!(f, "mcp: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(format!("malformed json: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Transport(format!("request timed out: {err}"))
        } else {
            Self::Transport(err.to_string())
        }
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
