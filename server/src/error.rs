//! Error types for the query server.

use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by the listener and by individual connections.
///
/// Only the bind variants ever reach the owning process; connection errors
/// are absorbed and logged by the handler that produced them.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error("invalid bind address {addr}: {source}")]
    InvalidAddress {
        addr: String,
        source: std::io::Error,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("no request line within {0:?}")]
    ReadTimeout(Duration),
}

impl QueryError {
    /// True for failures to bring up the listening socket.
    pub fn is_bind_error(&self) -> bool {
        matches!(
            self,
            QueryError::Bind { .. } | QueryError::InvalidAddress { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read properties: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },
}

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Invalid port received.")]
    InvalidPort(String),

    #[error("unknown command: {0}")]
    UnknownCommand(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error(transparent)]
    Query(#[from] QueryError),
}
