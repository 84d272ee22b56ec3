//! Server configuration.

use aether_protocol::{WireFormat, DEFAULT_PORT};
use std::net::SocketAddr;

/// Configuration for the aether server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to listen on.
    pub bind_addr: SocketAddr,
    /// Wire format spoken by accepted connections.
    pub wire_format: WireFormat,
    /// Folded operations after which the accumulation is applied.
    pub accumulation_cap: usize,
    /// Capacity of each session's intake queue, or `None` to dispatch
    /// straight from the reader.
    pub intake_capacity: Option<usize>,
    /// Keep sessions alive after non-fatal errors.
    pub error_tolerant: bool,
    /// Live participants after which JOIN is denied.
    pub max_participants: usize,
}

impl ServerConfig {
    /// Creates a configuration listening on `bind_addr`.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            wire_format: WireFormat::Binary,
            accumulation_cap: 64,
            intake_capacity: Some(256),
            error_tolerant: false,
            max_participants: 65536,
        }
    }

    /// Sets the wire format.
    pub fn with_wire_format(mut self, format: WireFormat) -> Self {
        self.wire_format = format;
        self
    }

    /// Sets the accumulation cap.
    pub fn with_accumulation_cap(mut self, cap: usize) -> Self {
        self.accumulation_cap = cap;
        self
    }

    /// Sets the intake queue capacity.
    pub fn with_intake_capacity(mut self, capacity: Option<usize>) -> Self {
        self.intake_capacity = capacity;
        self
    }

    /// Enables or disables error-tolerant sessions.
    pub fn with_error_tolerant(mut self, tolerant: bool) -> Self {
        self.error_tolerant = tolerant;
        self
    }

    /// Sets the participant limit.
    pub fn with_max_participants(mut self, max: usize) -> Self {
        self.max_participants = max;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], DEFAULT_PORT)))
    }
}
