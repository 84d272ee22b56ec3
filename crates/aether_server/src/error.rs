//! Error types for the aether server.

use aether_protocol::{ProtocolError, Severity};
use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the aether server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// A protocol-level fault.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The aether loop has stopped.
    #[error("server stopped")]
    Stopped,

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Returns the severity this error carries on the wire.
    pub fn severity(&self) -> Severity {
        match self {
            ServerError::Protocol(e) => e.severity(),
            ServerError::Config(_) => Severity::Error,
            ServerError::Stopped | ServerError::Io(_) => Severity::Fatal,
        }
    }
}
