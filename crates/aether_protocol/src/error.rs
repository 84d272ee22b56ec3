//! Error types and severities for the protocol.

use aether_tree::TreeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// How bad an error is.
///
/// A `Fatal` error always ends the session. Anything below that ends it
/// only when the endpoint is not running error-tolerant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational.
    Info,
    /// Something unexpected that did not affect the outcome.
    Warning,
    /// The operation failed.
    Error,
    /// The session cannot continue.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Fatal => "fatal",
        };
        f.write_str(name)
    }
}

/// Errors raised by the token model, codecs, transports and sessions.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// An opcode outside the closed set.
    #[error("unknown {family} opcode {code}")]
    UnknownOpcode {
        /// "server" or "client".
        family: &'static str,
        /// The raw opcode.
        code: u8,
    },

    /// A token arrived where the endpoint cannot handle it.
    #[error("unexpected token: {0}")]
    UnexpectedToken(String),

    /// A frame could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// The transport failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The transport is closed.
    #[error("transport closed")]
    Closed,

    /// KICK is internal to the server and never crosses the wire.
    #[error("kick token received on the wire")]
    KickOnWire,

    /// A reply named a sequence nobody is waiting for.
    #[error("no waiter for sequence {0}")]
    UnknownSequence(u64),

    /// A participant id is not registered.
    #[error("unknown participant {0}")]
    UnknownParticipant(i64),

    /// A participant id belongs to another session.
    #[error("participant {0} belongs to another session")]
    ForeignParticipant(i64),

    /// A participant id is already registered.
    #[error("participant {0} already registered")]
    DuplicateParticipant(i64),

    /// A notification target referenced a node that is not there.
    #[error("node index {index} out of range ({len} nodes)")]
    BadNodeIndex {
        /// The referenced index.
        index: usize,
        /// How many nodes the notification carries.
        len: usize,
    },

    /// A dimension could not be parsed.
    #[error("bad dimension: {0}")]
    Dimension(#[from] TreeError),

    /// The peer reported an error.
    #[error("remote {severity}: {message}")]
    Remote {
        /// Severity reported by the peer.
        severity: Severity,
        /// Message reported by the peer.
        message: String,
    },

    /// The URL scheme is unknown or has no codec in this build.
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
}

impl ProtocolError {
    /// Create a codec error.
    pub fn codec(message: impl Into<String>) -> Self {
        Self::Codec(message.into())
    }

    /// Create an unexpected-token error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::UnexpectedToken(message.into())
    }

    /// Returns the severity of this error.
    pub fn severity(&self) -> Severity {
        match self {
            ProtocolError::UnknownOpcode { .. }
            | ProtocolError::UnexpectedToken(_)
            | ProtocolError::Codec(_)
            | ProtocolError::Io(_)
            | ProtocolError::Closed
            | ProtocolError::KickOnWire => Severity::Fatal,
            ProtocolError::UnknownSequence(_)
            | ProtocolError::UnknownParticipant(_)
            | ProtocolError::ForeignParticipant(_)
            | ProtocolError::DuplicateParticipant(_)
            | ProtocolError::BadNodeIndex { .. }
            | ProtocolError::Dimension(_)
            | ProtocolError::UnsupportedScheme(_) => Severity::Error,
            ProtocolError::Remote { severity, .. } => *severity,
        }
    }

    /// Returns true if the session cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}
