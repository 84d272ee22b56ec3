//! # Aether Server
//!
//! The authoritative end of the aether protocol. One server owns one value
//! tree and serializes every operation against it.
//!
//! This crate provides:
//! - [`AetherServer`] - TCP listener, in-process links and sessions
//! - [`Accumulator`] - write coalescing under fences and a size cap
//! - [`merge`] - the merge table for pending asynchronous operations
//! - [`Origin`] - per-operation notification builder
//! - [`Registry`] - the participant arena
//!
//! # Architecture
//!
//! ```text
//! connection -> SessionDriver -> ServerDispatcher --submit--> aether loop
//!                                                              |- Accumulator
//!                                                              |- ValueTree
//!                                                              |- Registry
//!                                                              `- Origin -> NOTIFY
//! ```
//!
//! Only the aether loop thread touches the tree. Sessions block in
//! [`AetherHandle::submit`] until their token has been answered, so
//! replies on one connection leave in request order.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod accumulator;
mod aether;
mod config;
mod error;
mod merge;
mod origin;
mod registry;
mod server;
mod session;

pub use accumulator::Accumulator;
pub use aether::{AetherHandle, AetherStats, Outcome};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use merge::{merge, Merge, Operation, Pending, Source};
pub use origin::Origin;
pub use registry::{ParticipantEntry, Placement, Registry, SessionId};
pub use server::AetherServer;
