//! Serve command implementation.

use aether_protocol::WireFormat;
use aether_server::{AetherServer, ServerConfig};
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;
use tracing::info;

/// Options for `aether serve`.
#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// Address to listen on.
    pub bind: SocketAddr,
    /// Wire format of accepted connections.
    pub format: WireFormat,
    /// Accumulation cap.
    pub cap: usize,
    /// Error-tolerant sessions.
    pub tolerant: bool,
    /// Participant limit.
    pub max_participants: usize,
    /// Seconds between statistics log lines.
    pub stats_interval: u64,
}

impl ServeOptions {
    fn config(&self) -> ServerConfig {
        ServerConfig::new(self.bind)
            .with_wire_format(self.format)
            .with_accumulation_cap(self.cap)
            .with_error_tolerant(self.tolerant)
            .with_max_participants(self.max_participants)
    }
}

/// Runs a server until the process is killed.
pub fn run(options: &ServeOptions) -> Result<(), Box<dyn std::error::Error>> {
    let server = AetherServer::new(options.config())?;
    let addr = server.listen()?;
    println!("aether listening on {}://{addr}/", options.format.scheme());

    let interval = Duration::from_secs(options.stats_interval.max(1));
    loop {
        thread::sleep(interval);
        let stats = server.stats();
        info!(
            global_sequence = stats.global_sequence,
            participants = stats.participants,
            applied = stats.applied_operations,
            folded = stats.folded_operations,
            notifications = stats.notifications_sent,
            "stats"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_map_onto_config() {
        let options = ServeOptions {
            bind: "127.0.0.1:7000".parse().unwrap(),
            format: WireFormat::Text,
            cap: 8,
            tolerant: true,
            max_participants: 3,
            stats_interval: 1,
        };
        let config = options.config();
        assert_eq!(config.bind_addr.port(), 7000);
        assert_eq!(config.wire_format, WireFormat::Text);
        assert_eq!(config.accumulation_cap, 8);
        assert!(config.error_tolerant);
        assert_eq!(config.max_participants, 3);
    }
}
