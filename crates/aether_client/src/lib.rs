//! # Aether Client
//!
//! A blocking client for the aether protocol.
//!
//! This crate provides:
//! - [`Client`] - connect, join, write, synch and disconnect
//! - [`Participant`] - a joined participant with relative addressing
//! - [`Handler`] / [`ChannelHandler`] - per-participant change callbacks
//! - [`Correlator`] - matches replies and global sequences to waiting callers
//!
//! # Example
//!
//! ```no_run
//! use aether_client::{ChannelHandler, Client};
//! use aether_protocol::Capabilities;
//! use aether_tree::Dimension;
//! use std::sync::{mpsc, Arc};
//!
//! let client = Client::connect("aep://localhost/").unwrap();
//! let (tx, rx) = mpsc::channel();
//! let room = Dimension::parse("house:kitchen").unwrap();
//! let _me = client
//!     .join(&room, Capabilities::default(), Arc::new(ChannelHandler::new(tx)))
//!     .unwrap();
//! for change in rx {
//!     println!("{:?} at {:?}", change.kind, change.dimension);
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
mod config;
mod correlator;
mod dispatch;
mod error;
mod participant;

pub use client::{Client, Participant};
pub use config::ClientConfig;
pub use correlator::{Correlator, Resume, Signal, Waiter};
pub use error::{ClientError, ClientResult};
pub use participant::{
    Change, ChangeKind, ChannelHandler, Handler, NullHandler, ParticipantTable,
};
