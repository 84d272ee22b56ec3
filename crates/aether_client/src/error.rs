//! Error types for the aether client.

use aether_protocol::{ProtocolError, Severity};
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by client calls.
#[derive(Error, Debug)]
pub enum ClientError {
    /// The server answered DENY.
    #[error("denied: {reason}")]
    Denied {
        /// Reason given by the server.
        reason: String,
    },

    /// The server answered ERROR.
    #[error("server error ({severity}): {message}")]
    Remote {
        /// Severity reported by the server.
        severity: Severity,
        /// Error message.
        message: String,
    },

    /// The session has stopped; no further operations are possible.
    #[error("disconnected")]
    Disconnected,

    /// Local protocol fault.
    #[error(transparent)]
    Protocol(ProtocolError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The URL names a wire format this client cannot speak.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
}

impl ClientError {
    /// Returns true if retrying the same call may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ClientError::Denied { .. } => true,
            ClientError::Remote { severity, .. } => *severity < Severity::Error,
            _ => false,
        }
    }

    /// Returns true if the session is gone after this error.
    pub fn is_fatal(&self) -> bool {
        match self {
            ClientError::Disconnected | ClientError::Io(_) => true,
            ClientError::Remote { severity, .. } => *severity == Severity::Fatal,
            ClientError::Protocol(e) => e.is_fatal(),
            ClientError::Denied { .. } | ClientError::UnsupportedScheme(_) => false,
        }
    }
}

impl From<ProtocolError> for ClientError {
    fn from(error: ProtocolError) -> Self {
        match error {
            ProtocolError::Io(e) => ClientError::Io(e),
            ProtocolError::Closed => ClientError::Disconnected,
            ProtocolError::UnsupportedScheme(scheme) => ClientError::UnsupportedScheme(scheme),
            ProtocolError::Remote { severity, message } => {
                ClientError::Remote { severity, message }
            }
            other => ClientError::Protocol(other),
        }
    }
}
