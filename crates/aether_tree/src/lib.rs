//! # Aether Tree
//!
//! The hierarchical value store that an aether server mutates.
//!
//! This crate provides:
//! - [`Dimension`] - a path of named steps into the tree
//! - [`Value`] - a snapshot of a node and everything below it
//! - [`Delta`] - a composable change description ("apply" operation)
//! - [`ValueTree`] - the node-operation interface the protocol engine relies on
//! - [`MemoryTree`] - an in-memory implementation
//!
//! ## Design Principles
//!
//! - The tree knows nothing about participants, sessions or notifications
//! - Addressing a missing node behaves as addressing an empty node
//! - Every mutation creates the addressed path
//!
//! ## Example
//!
//! ```rust
//! use aether_tree::{Datum, Dimension, MemoryTree, Value, ValueTree};
//!
//! let mut tree = MemoryTree::new();
//! let dim: Dimension = "rooms:lobby".parse().unwrap();
//! tree.assign(&dim, Value::leaf(Datum::from("open")));
//! assert_eq!(tree.value(&dim).data(), Some(&Datum::from("open")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod delta;
mod dimension;
mod error;
mod tree;
mod value;

pub use delta::Delta;
pub use dimension::{Ancestry, Dimension, STEP_SEPARATOR};
pub use error::{TreeError, TreeResult};
pub use tree::{MemoryTree, ValueTree};
pub use value::{Datum, Value};
