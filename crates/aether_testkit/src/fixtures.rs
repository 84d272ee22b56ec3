//! In-process fixtures.
//!
//! Provides servers, clients and handlers wired together without sockets
//! unless a test asks for TCP.

use aether_client::{Change, ChangeKind, Client, ClientConfig, Handler};
use aether_protocol::{
    memory_pair, ClientLink, ClientToken, MemoryTransport, ServerToken, WireFormat,
};
use aether_server::{AetherServer, ServerConfig};
use aether_tree::Dimension;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How long fixtures wait for asynchronous deliveries.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Parses a dimension, panicking on malformed input.
pub fn dim(text: &str) -> Dimension {
    Dimension::parse(text).expect("invalid dimension in test")
}

/// A server over an in-memory tree, shut down on drop.
pub struct TestAether {
    server: AetherServer,
}

impl TestAether {
    /// Creates a server with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    /// Creates a server with `config`.
    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            server: AetherServer::new(config).expect("failed to start server"),
        }
    }

    /// Returns the server.
    pub fn server(&self) -> &AetherServer {
        &self.server
    }

    /// Connects a client over an in-process link.
    pub fn client(&self) -> Client {
        self.client_with(ClientConfig::default())
    }

    /// Connects a client with `config` over an in-process link.
    pub fn client_with(&self, config: ClientConfig) -> Client {
        let (client_end, server_end) =
            memory_pair::<ServerToken, ClientToken>(config.channel_capacity);
        self.server
            .accept_link(Arc::new(server_end))
            .expect("failed to attach link");
        Client::over(Arc::new(client_end), config).expect("failed to start client")
    }

    /// Connects a bare link that speaks tokens directly.
    pub fn raw(&self) -> Arc<ClientLink> {
        self.server.connect_local().expect("failed to attach link")
    }
}

impl Default for TestAether {
    fn default() -> Self {
        Self::new()
    }
}

/// Starts a TCP server on an ephemeral port speaking `format` and returns
/// it with its base URL.
pub fn tcp_aether(format: WireFormat) -> (AetherServer, String) {
    let config = ServerConfig::new("127.0.0.1:0".parse().expect("valid address"))
        .with_wire_format(format);
    let server = AetherServer::new(config).expect("failed to start server");
    let addr = server.listen().expect("failed to listen");
    let url = format!("{}://{addr}/", format.scheme());
    (server, url)
}

/// A client attached to a scripted peer instead of a server.
///
/// The returned transport is the server end; the test reads the client's
/// requests from it and writes whatever replies it wants.
pub fn scripted_peer(config: ClientConfig) -> (Client, MemoryTransport<ClientToken, ServerToken>) {
    let (client_end, server_end) = memory_pair::<ServerToken, ClientToken>(config.channel_capacity);
    let client = Client::over(Arc::new(client_end), config).expect("failed to start client");
    (client, server_end)
}

/// A handler that records every change it receives.
#[derive(Default)]
pub struct RecordingHandler {
    changes: Mutex<Vec<Change>>,
    arrived: Condvar,
}

impl RecordingHandler {
    /// Creates a shared recorder.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn record(&self, change: &Change) {
        self.changes.lock().push(change.clone());
        self.arrived.notify_all();
    }

    /// Returns everything recorded so far.
    pub fn changes(&self) -> Vec<Change> {
        self.changes.lock().clone()
    }

    /// Returns the kinds recorded so far, in order.
    pub fn kinds(&self) -> Vec<ChangeKind> {
        self.changes.lock().iter().map(|c| c.kind).collect()
    }

    /// Waits until at least `count` changes arrived or
    /// [`DELIVERY_TIMEOUT`] passed, then returns everything recorded.
    pub fn wait_for(&self, count: usize) -> Vec<Change> {
        let deadline = Instant::now() + DELIVERY_TIMEOUT;
        let mut changes = self.changes.lock();
        while changes.len() < count {
            if self.arrived.wait_until(&mut changes, deadline).timed_out() {
                break;
            }
        }
        changes.clone()
    }
}

impl Handler for RecordingHandler {
    fn on_assign(&self, change: &Change) {
        self.record(change);
    }

    fn on_apply(&self, change: &Change) {
        self.record(change);
    }

    fn on_clear(&self, change: &Change) {
        self.record(change);
    }

    fn on_kick(&self, change: &Change) {
        self.record(change);
    }
}
