//! # Aether Testkit
//!
//! Test utilities for Aether.
//!
//! This crate provides:
//! - In-process server and client fixtures
//! - A recording participant handler
//! - Property-based generators for dimensions, values, deltas and
//!   operations
//! - Cross-crate integration tests (under `tests/`)
//!
//! ## Usage
//!
//! ```rust
//! use aether_testkit::prelude::*;
//! use aether_protocol::Capabilities;
//! use aether_tree::Value;
//!
//! let aether = TestAether::new();
//! let client = aether.client();
//! let recorder = RecordingHandler::new();
//! let me = client.join(&dim("room"), Capabilities::default(), recorder.clone()).unwrap();
//! me.assign(&dim("light"), Value::leaf(1)).unwrap();
//! client.synch().unwrap();
//! assert_eq!(recorder.wait_for(1).len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
