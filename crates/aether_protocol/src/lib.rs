//! # Aether Protocol
//!
//! Tokens, wire codecs, transports and the session driver shared by the
//! aether server and client.
//!
//! This crate provides:
//! - [`ServerToken`] / [`ClientToken`] - the two closed token families
//! - [`NotifyToken`] - batched per-session change records with node dedup
//! - [`BinaryCodec`] / [`TextCodec`] - the two wire formats
//! - [`Transport`] - TCP and in-process links
//! - [`SessionDriver`] - the receive/dispatch loop with optional intake queue
//!
//! ## Opcodes
//!
//! | Server receives | Code | Client receives | Code |
//! |---|---|---|---|
//! | SYNCH | 0 | CLIENT_TERMINATE (local) | 0 |
//! | CLIENT_DISCONNECT | 1 | SERVER_DISCONNECT | 1 |
//! | JOIN | 2 | NOTIFY | 2 |
//! | LEAVE | 3 | ACK | 3 |
//! | ASSIGN | 4 | DENY | 4 |
//! | APPLY | 5 | ERROR | 5 |
//! | CLEAR | 6 | | |
//! | KICK (internal) | 7 | | |

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod codec;
mod error;
mod notify;
mod opcode;
mod session;
mod token;
mod transport;
mod url;

pub use codec::{BinaryCodec, BodyFormat, Cbor, Codec, Frame, Json, TextCodec, MAX_FRAME_LEN};
pub use error::{ProtocolError, ProtocolResult, Severity};
pub use notify::{Node, NodeRef, NotifyToken, Target};
pub use opcode::{ClientOpcode, ServerOpcode};
pub use session::{Dispatch, DriverState, Flow, SessionDriver};
pub use token::{
    Ack, AsyncOp, AsyncToken, Capabilities, ClientToken, Deny, DisconnectToken, ErrorReply, Flags,
    JoinToken, KickToken, LeaveToken, OpKind, ParticipantId, ServerToken, SynchToken,
    ROOT_PARTICIPANT,
};
pub use transport::{
    connect, memory_pair, stream_transport, ClientLink, MemoryTransport, ServerLink,
    StreamTransport, Transport,
};
pub use url::{AetherUrl, WireFormat, DEFAULT_PORT};
