//! The two closed opcode families.

use crate::error::{ProtocolError, ProtocolResult};

/// Opcodes of tokens a server receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ServerOpcode {
    /// Barrier: flush and reply.
    Synch = 0,
    /// The client is leaving.
    ClientDisconnect = 1,
    /// Register a participant.
    Join = 2,
    /// Deregister a participant.
    Leave = 3,
    /// Replace a subtree.
    Assign = 4,
    /// Apply a delta.
    Apply = 5,
    /// Clear a subtree.
    Clear = 6,
    /// Server-internal eviction. Never on the wire.
    Kick = 7,
}

/// Opcodes of tokens a client receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ClientOpcode {
    /// Local end-of-stream marker. Never on the wire.
    ClientTerminate = 0,
    /// The server is going away.
    ServerDisconnect = 1,
    /// Changes for participants of this client.
    Notify = 2,
    /// Success reply.
    Ack = 3,
    /// Recoverable rejection.
    Deny = 4,
    /// Protocol or internal fault.
    Error = 5,
}

const SERVER_NAMES: [(ServerOpcode, &str); 8] = [
    (ServerOpcode::Synch, "SYNCH"),
    (ServerOpcode::ClientDisconnect, "CLIENT_DISCONNECT"),
    (ServerOpcode::Join, "JOIN"),
    (ServerOpcode::Leave, "LEAVE"),
    (ServerOpcode::Assign, "ASSIGN"),
    (ServerOpcode::Apply, "APPLY"),
    (ServerOpcode::Clear, "CLEAR"),
    (ServerOpcode::Kick, "KICK"),
];

const CLIENT_NAMES: [(ClientOpcode, &str); 6] = [
    (ClientOpcode::ClientTerminate, "CLIENT_TERMINATE"),
    (ClientOpcode::ServerDisconnect, "SERVER_DISCONNECT"),
    (ClientOpcode::Notify, "NOTIFY"),
    (ClientOpcode::Ack, "ACK"),
    (ClientOpcode::Deny, "DENY"),
    (ClientOpcode::Error, "ERROR"),
];

impl ServerOpcode {
    /// Returns the wire name used by the text codec.
    pub fn name(self) -> &'static str {
        SERVER_NAMES[self as usize].1
    }

    /// Looks an opcode up by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        SERVER_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(op, _)| *op)
    }

    /// Returns true for the tokens that act as barriers on the tree.
    pub fn is_synchronous(self) -> bool {
        matches!(
            self,
            ServerOpcode::Synch
                | ServerOpcode::ClientDisconnect
                | ServerOpcode::Join
                | ServerOpcode::Leave
        )
    }
}

impl ClientOpcode {
    /// Returns the wire name used by the text codec.
    pub fn name(self) -> &'static str {
        CLIENT_NAMES[self as usize].1
    }

    /// Looks an opcode up by wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        CLIENT_NAMES
            .iter()
            .find(|(_, n)| *n == name)
            .map(|(op, _)| *op)
    }
}

impl TryFrom<u8> for ServerOpcode {
    type Error = ProtocolError;

    fn try_from(code: u8) -> ProtocolResult<Self> {
        SERVER_NAMES
            .get(usize::from(code))
            .map(|(op, _)| *op)
            .ok_or(ProtocolError::UnknownOpcode {
                family: "server",
                code,
            })
    }
}

impl TryFrom<u8> for ClientOpcode {
    type Error = ProtocolError;

    fn try_from(code: u8) -> ProtocolResult<Self> {
        CLIENT_NAMES
            .get(usize::from(code))
            .map(|(op, _)| *op)
            .ok_or(ProtocolError::UnknownOpcode {
                family: "client",
                code,
            })
    }
}
