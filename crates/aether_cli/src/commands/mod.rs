//! CLI command implementations.

pub mod serve;
pub mod synch;
pub mod watch;
pub mod write;
