//! Tokens: every message exchanged between client and server.

use crate::error::Severity;
use crate::notify::NotifyToken;
use crate::opcode::{ClientOpcode, ServerOpcode};
use aether_tree::{Delta, Dimension, Value};
use serde::{Deserialize, Serialize};

/// Identifies a participant. Ids `<= 0` address the root of the aether.
pub type ParticipantId = i64;

/// The participant id used for operations that are not issued through a
/// participant.
pub const ROOT_PARTICIPANT: ParticipantId = 0;

/// Flag bits carried by asynchronous tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Flags(u8);

impl Flags {
    /// No flags.
    pub const NONE: Flags = Flags(0);
    /// Flush prior accumulation before this operation.
    pub const PRE_FENCE: Flags = Flags(0x01);
    /// Apply this operation immediately.
    pub const POST_FENCE: Flags = Flags(0x02);
    /// With both fences: notify the issuing participant too.
    pub const NOTIFY_SELF: Flags = Flags(0x04);
    /// With both fences: notify other participants of the issuing session.
    pub const NOTIFY_CLIENT: Flags = Flags(0x08);
    /// Both fences.
    pub const FENCED: Flags = Flags(0x03);

    /// Builds flags from raw bits.
    pub const fn from_bits(bits: u8) -> Self {
        Flags(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    pub const fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns these flags with the bits of `other` added.
    pub const fn with(self, other: Flags) -> Self {
        Flags(self.0 | other.0)
    }

    /// Flush-before requested.
    pub fn pre_fence(self) -> bool {
        self.contains(Self::PRE_FENCE)
    }

    /// Apply-immediately requested.
    pub fn post_fence(self) -> bool {
        self.contains(Self::POST_FENCE)
    }

    /// Both fence bits set; only then do the notify bits mean anything.
    pub fn fenced(self) -> bool {
        self.contains(Self::FENCED)
    }

    /// Notify the issuing participant.
    pub fn notify_self(self) -> bool {
        self.contains(Self::NOTIFY_SELF)
    }

    /// Notify co-resident participants of the issuing session.
    pub fn notify_client(self) -> bool {
        self.contains(Self::NOTIFY_CLIENT)
    }
}

impl std::ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        self.with(rhs)
    }
}

/// What a participant wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capabilities(u8);

impl Capabilities {
    /// Notified of assigns.
    pub const ASSIGN_NOTIFY: Capabilities = Capabilities(0x01);
    /// Notified of applies.
    pub const APPLY_NOTIFY: Capabilities = Capabilities(0x02);
    /// Notified of clears.
    pub const CLEAR_NOTIFY: Capabilities = Capabilities(0x04);
    /// Notified when kicked.
    pub const KICK_NOTIFY: Capabilities = Capabilities(0x08);
    /// Observe-only: writes through this participant are denied.
    pub const PURE: Capabilities = Capabilities(0x10);

    /// No notifications at all.
    pub const fn none() -> Self {
        Capabilities(0)
    }

    /// Every notification kind, not pure.
    pub const fn all() -> Self {
        Capabilities(0x0f)
    }

    /// Builds capabilities from raw bits.
    pub const fn from_bits(bits: u8) -> Self {
        Capabilities(bits)
    }

    /// Returns the raw bits.
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    pub const fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns these capabilities with the bits of `other` added.
    pub const fn with(self, other: Capabilities) -> Self {
        Capabilities(self.0 | other.0)
    }

    /// Returns these capabilities with the bits of `other` removed.
    pub const fn without(self, other: Capabilities) -> Self {
        Capabilities(self.0 & !other.0)
    }

    /// Observe-only participant.
    pub fn is_pure(self) -> bool {
        self.contains(Self::PURE)
    }

    /// Returns true if the participant wants notifications of `kind`.
    pub fn wants(self, kind: OpKind) -> bool {
        let bit = match kind {
            OpKind::Assign => Self::ASSIGN_NOTIFY,
            OpKind::Apply => Self::APPLY_NOTIFY,
            OpKind::Clear => Self::CLEAR_NOTIFY,
        };
        self.contains(bit)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::all()
    }
}

/// The three kinds of asynchronous operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Replace a subtree.
    Assign,
    /// Apply a delta.
    Apply,
    /// Clear a subtree.
    Clear,
}

/// The payload of an asynchronous token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AsyncOp {
    /// Replace the subtree with this value.
    Assign(Value),
    /// Apply this delta.
    Apply(Delta),
    /// Clear the subtree.
    Clear,
}

impl AsyncOp {
    /// Returns the kind of this operation.
    pub fn kind(&self) -> OpKind {
        match self {
            AsyncOp::Assign(_) => OpKind::Assign,
            AsyncOp::Apply(_) => OpKind::Apply,
            AsyncOp::Clear => OpKind::Clear,
        }
    }

    /// Returns the server opcode that carries this operation.
    pub fn opcode(&self) -> ServerOpcode {
        match self {
            AsyncOp::Assign(_) => ServerOpcode::Assign,
            AsyncOp::Apply(_) => ServerOpcode::Apply,
            AsyncOp::Clear => ServerOpcode::Clear,
        }
    }
}

/// SYNCH: flush the accumulation and reply with the current global sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynchToken {
    /// Local sequence of the sender.
    pub sequence: u64,
}

/// CLIENT_DISCONNECT: the client is going away.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectToken {
    /// Local sequence of the sender.
    pub sequence: u64,
}

/// JOIN: register a participant at an absolute dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinToken {
    /// Local sequence of the sender.
    pub sequence: u64,
    /// Absolute position of the participant.
    pub dimension: Dimension,
    /// Notification capabilities.
    #[serde(default)]
    pub capabilities: Capabilities,
}

/// LEAVE: deregister a participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveToken {
    /// Local sequence of the sender.
    pub sequence: u64,
    /// The participant leaving.
    pub participant: ParticipantId,
}

/// KICK: evict a participant. Server-internal only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KickToken {
    /// The participant to evict.
    pub participant: ParticipantId,
}

/// ASSIGN, APPLY or CLEAR.
///
/// The dimension is relative to the participant's position, or absolute
/// when `participant <= 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AsyncToken {
    /// Local sequence of the sender.
    pub sequence: u64,
    /// Issuing participant, or `<= 0` for the root.
    pub participant: ParticipantId,
    /// Target dimension.
    pub dimension: Dimension,
    /// Fence and notify bits.
    #[serde(default)]
    pub flags: Flags,
    /// The operation.
    pub op: AsyncOp,
}

/// A token received by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerToken {
    /// SYNCH.
    Synch(SynchToken),
    /// CLIENT_DISCONNECT.
    ClientDisconnect(DisconnectToken),
    /// JOIN.
    Join(JoinToken),
    /// LEAVE.
    Leave(LeaveToken),
    /// ASSIGN, APPLY or CLEAR.
    Async(AsyncToken),
    /// KICK.
    Kick(KickToken),
}

impl ServerToken {
    /// Returns the opcode of this token.
    pub fn opcode(&self) -> ServerOpcode {
        match self {
            ServerToken::Synch(_) => ServerOpcode::Synch,
            ServerToken::ClientDisconnect(_) => ServerOpcode::ClientDisconnect,
            ServerToken::Join(_) => ServerOpcode::Join,
            ServerToken::Leave(_) => ServerOpcode::Leave,
            ServerToken::Async(token) => token.op.opcode(),
            ServerToken::Kick(_) => ServerOpcode::Kick,
        }
    }

    /// Returns the sender's local sequence. KICK has none and reports 0.
    pub fn sequence(&self) -> u64 {
        match self {
            ServerToken::Synch(t) => t.sequence,
            ServerToken::ClientDisconnect(t) => t.sequence,
            ServerToken::Join(t) => t.sequence,
            ServerToken::Leave(t) => t.sequence,
            ServerToken::Async(t) => t.sequence,
            ServerToken::Kick(_) => 0,
        }
    }

    /// Returns true for barrier tokens.
    pub fn is_synchronous(&self) -> bool {
        self.opcode().is_synchronous()
    }
}

/// ACK: success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    /// Local sequence of the request.
    pub sequence: u64,
    /// Global sequence assigned to (or observed by) the request.
    pub global_sequence: u64,
    /// The participant id handed out by a JOIN.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<ParticipantId>,
}

/// DENY: recoverable rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deny {
    /// Local sequence of the request.
    pub sequence: u64,
    /// Why.
    pub reason: String,
}

/// ERROR: protocol or internal fault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Local sequence of the request, if one was known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// Severity of the fault.
    pub severity: Severity,
    /// Description.
    pub message: String,
}

/// A token received by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientToken {
    /// Local end-of-stream marker.
    ClientTerminate,
    /// The server is going away.
    ServerDisconnect,
    /// Changes for participants of this client.
    Notify(NotifyToken),
    /// Success.
    Ack(Ack),
    /// Rejection.
    Deny(Deny),
    /// Fault.
    Error(ErrorReply),
}

impl ClientToken {
    /// Returns the opcode of this token.
    pub fn opcode(&self) -> ClientOpcode {
        match self {
            ClientToken::ClientTerminate => ClientOpcode::ClientTerminate,
            ClientToken::ServerDisconnect => ClientOpcode::ServerDisconnect,
            ClientToken::Notify(_) => ClientOpcode::Notify,
            ClientToken::Ack(_) => ClientOpcode::Ack,
            ClientToken::Deny(_) => ClientOpcode::Deny,
            ClientToken::Error(_) => ClientOpcode::Error,
        }
    }

    /// Returns the request sequence a reply answers.
    pub fn reply_sequence(&self) -> Option<u64> {
        match self {
            ClientToken::Ack(ack) => Some(ack.sequence),
            ClientToken::Deny(deny) => Some(deny.sequence),
            ClientToken::Error(error) => error.sequence,
            _ => None,
        }
    }

    /// Returns the global sequence this token proves has been reached.
    pub fn global_sequence(&self) -> Option<u64> {
        match self {
            ClientToken::Ack(ack) => Some(ack.global_sequence),
            ClientToken::Notify(notify) => Some(notify.global_sequence),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_bits() {
        let flags = Flags::PRE_FENCE | Flags::POST_FENCE;
        assert!(flags.fenced());
        assert_eq!(flags, Flags::FENCED);
        assert!(!flags.notify_self());
        assert!(Flags::from_bits(0x0f).notify_client());
        assert!(!Flags::POST_FENCE.fenced());
        assert!(Flags::POST_FENCE.post_fence());
    }

    #[test]
    fn capabilities_default_notify_all() {
        let caps = Capabilities::default();
        assert!(caps.wants(OpKind::Assign));
        assert!(caps.wants(OpKind::Clear));
        assert!(caps.contains(Capabilities::KICK_NOTIFY));
        assert!(!caps.is_pure());
        let pure = caps.with(Capabilities::PURE).without(Capabilities::APPLY_NOTIFY);
        assert!(pure.is_pure());
        assert!(!pure.wants(OpKind::Apply));
    }

    #[test]
    fn token_opcodes() {
        let token = ServerToken::Async(AsyncToken {
            sequence: 9,
            participant: ROOT_PARTICIPANT,
            dimension: Dimension::root(),
            flags: Flags::NONE,
            op: AsyncOp::Clear,
        });
        assert_eq!(token.opcode(), ServerOpcode::Clear);
        assert_eq!(token.sequence(), 9);
        assert!(!token.is_synchronous());
        assert!(ServerToken::Synch(SynchToken { sequence: 1 }).is_synchronous());
    }

    #[test]
    fn reply_accessors() {
        let ack = ClientToken::Ack(Ack {
            sequence: 4,
            global_sequence: 17,
            participant: None,
        });
        assert_eq!(ack.reply_sequence(), Some(4));
        assert_eq!(ack.global_sequence(), Some(17));
        assert_eq!(ClientToken::ServerDisconnect.reply_sequence(), None);
        assert_eq!(ack.opcode(), ClientOpcode::Ack);
    }
}
