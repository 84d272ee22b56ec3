//! The aether server: one aether loop plus one session per connection.

use crate::aether::{Aether, AetherHandle, AetherStats, Outcome};
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::registry::SessionId;
use crate::session::ServerDispatcher;
use aether_protocol::{
    memory_pair, stream_transport, ClientLink, ClientToken, DriverState, KickToken,
    ParticipantId, ServerLink, ServerToken, SessionDriver,
};
use aether_tree::{MemoryTree, ValueTree};
use parking_lot::Mutex;
use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

/// Session id used for server-internal requests such as KICK.
const INTERNAL_SESSION: SessionId = SessionId(0);

/// Capacity of each direction of an in-process link.
const LOCAL_LINK_CAPACITY: usize = 1024;

struct Shared {
    config: ServerConfig,
    aether: AetherHandle,
    next_session: AtomicU64,
    sessions: Mutex<Vec<SessionDriver>>,
}

impl Shared {
    fn accept_link(&self, link: Arc<ServerLink>) -> ServerResult<SessionId> {
        let session = SessionId(self.next_session.fetch_add(1, Ordering::SeqCst));
        self.aether.attach(session, Arc::clone(&link))?;
        let dispatcher =
            ServerDispatcher::new(session, self.aether.clone(), self.config.error_tolerant);
        let driver = SessionDriver::start(
            &session.to_string(),
            link,
            dispatcher,
            self.config.intake_capacity,
        )
        .inspect_err(|_| self.aether.detach(session))?;
        info!(%session, "session accepted");
        let finished = {
            let mut sessions = self.sessions.lock();
            let (running, finished): (Vec<_>, Vec<_>) = sessions
                .drain(..)
                .partition(|d| d.state() == DriverState::Running);
            *sessions = running;
            sessions.push(driver);
            finished
        };
        for driver in &finished {
            driver.join();
        }
        if !finished.is_empty() {
            debug!(reaped = finished.len(), "finished sessions released");
        }
        Ok(session)
    }
}

/// An authoritative aether server.
///
/// # Example
///
/// ```
/// use aether_server::{AetherServer, ServerConfig};
///
/// let server = AetherServer::new(ServerConfig::default()).unwrap();
/// let link = server.connect_local().unwrap();
/// assert!(link.is_open());
/// server.shutdown();
/// ```
pub struct AetherServer {
    shared: Arc<Shared>,
    aether_thread: Mutex<Option<JoinHandle<()>>>,
    listening: Arc<AtomicBool>,
    local_addr: Mutex<Option<SocketAddr>>,
}

impl AetherServer {
    /// Creates a server over an empty in-memory tree.
    ///
    /// # Errors
    ///
    /// Returns an error if the aether loop cannot be started.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        Self::with_tree(config, Box::new(MemoryTree::new()))
    }

    /// Creates a server over `tree`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the aether loop
    /// cannot be started.
    pub fn with_tree(config: ServerConfig, tree: Box<dyn ValueTree>) -> ServerResult<Self> {
        if config.max_participants == 0 {
            return Err(ServerError::Config("max_participants must be positive".into()));
        }
        let (aether, aether_thread) = Aether::spawn(tree, &config)?;
        Ok(Self {
            shared: Arc::new(Shared {
                config,
                aether,
                next_session: AtomicU64::new(1),
                sessions: Mutex::new(Vec::new()),
            }),
            aether_thread: Mutex::new(Some(aether_thread)),
            listening: Arc::new(AtomicBool::new(false)),
            local_addr: Mutex::new(None),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Binds the configured address and accepts connections on a
    /// background thread. Returns the bound address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound.
    pub fn listen(&self) -> ServerResult<SocketAddr> {
        let listener = TcpListener::bind(self.shared.config.bind_addr)?;
        let addr = listener.local_addr()?;
        self.listening.store(true, Ordering::SeqCst);
        *self.local_addr.lock() = Some(addr);

        let shared = Arc::clone(&self.shared);
        let listening = Arc::clone(&self.listening);
        thread::Builder::new()
            .name("aether-listener".into())
            .spawn(move || accept_loop(listener, shared, listening))?;
        info!(%addr, format = self.shared.config.wire_format.scheme(), "listening");
        Ok(addr)
    }

    /// Starts a session over an already connected link.
    ///
    /// # Errors
    ///
    /// Returns an error if the aether loop has stopped.
    pub fn accept_link(&self, link: Arc<ServerLink>) -> ServerResult<SessionId> {
        self.shared.accept_link(link)
    }

    /// Opens an in-process link to this server and returns the client end.
    ///
    /// # Errors
    ///
    /// Returns an error if the aether loop has stopped.
    pub fn connect_local(&self) -> ServerResult<Arc<ClientLink>> {
        let (client, server) = memory_pair::<ServerToken, ClientToken>(LOCAL_LINK_CAPACITY);
        self.accept_link(Arc::new(server))?;
        Ok(Arc::new(client))
    }

    /// Evicts a participant. Returns false if it was not live.
    ///
    /// # Errors
    ///
    /// Returns an error if the aether loop has stopped.
    pub fn kick(&self, participant: ParticipantId) -> ServerResult<bool> {
        let outcome = self
            .shared
            .aether
            .submit(INTERNAL_SESSION, ServerToken::Kick(KickToken { participant }))?;
        Ok(outcome == Outcome::Acked)
    }

    /// Returns the aether loop's counters.
    pub fn stats(&self) -> AetherStats {
        self.shared.aether.stats()
    }

    /// Flushes the accumulation, tells every client the server is going
    /// away and stops all sessions.
    pub fn shutdown(&self) {
        self.listening.store(false, Ordering::SeqCst);
        if let Some(addr) = self.local_addr.lock().take() {
            // Unblock the accept loop.
            let _ = std::net::TcpStream::connect(addr);
        }
        if let Err(e) = self.shared.aether.shutdown() {
            debug!(error = %e, "aether loop already stopped");
        }
        let sessions: Vec<_> = self.shared.sessions.lock().drain(..).collect();
        for session in &sessions {
            session.stop();
        }
        for session in &sessions {
            session.join();
        }
        if let Some(handle) = self.aether_thread.lock().take() {
            if handle.join().is_err() {
                error!("aether loop panicked");
            }
        }
        info!("server stopped");
    }
}

impl Drop for AetherServer {
    fn drop(&mut self) {
        if self.aether_thread.lock().is_some() {
            self.shutdown();
        }
    }
}

fn accept_loop(listener: TcpListener, shared: Arc<Shared>, listening: Arc<AtomicBool>) {
    for stream in listener.incoming() {
        if !listening.load(Ordering::SeqCst) {
            break;
        }
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let peer = stream.peer_addr().ok();
        let result = stream_transport::<ClientToken, ServerToken>(stream, shared.config.wire_format)
            .map_err(ServerError::from)
            .and_then(|link| shared.accept_link(link));
        match result {
            Ok(session) => debug!(%session, ?peer, "connection attached"),
            Err(ServerError::Stopped) => break,
            Err(e) => warn!(?peer, error = %e, "connection rejected"),
        }
    }
    debug!("accept loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_protocol::{Ack, SynchToken, WireFormat};
    use std::time::{Duration, Instant};

    #[test]
    fn local_link_round_trip() {
        let server = AetherServer::new(ServerConfig::default()).unwrap();
        let link = server.connect_local().unwrap();
        link.send(ServerToken::Synch(SynchToken { sequence: 3 })).unwrap();
        assert_eq!(
            link.recv().unwrap(),
            Some(ClientToken::Ack(Ack {
                sequence: 3,
                global_sequence: 0,
                participant: None,
            }))
        );
        server.shutdown();
        assert_eq!(link.recv().unwrap(), Some(ClientToken::ServerDisconnect));
    }

    #[test]
    fn tcp_listener_accepts_text_clients() {
        let config = ServerConfig::new("127.0.0.1:0".parse().unwrap())
            .with_wire_format(WireFormat::Text);
        let server = AetherServer::new(config).unwrap();
        let addr = server.listen().unwrap();

        let stream = std::net::TcpStream::connect(addr).unwrap();
        let link = stream_transport::<ServerToken, ClientToken>(stream, WireFormat::Text).unwrap();
        link.send(ServerToken::Synch(SynchToken { sequence: 1 })).unwrap();
        assert!(matches!(link.recv().unwrap(), Some(ClientToken::Ack(a)) if a.sequence == 1));
        server.shutdown();
    }

    #[test]
    fn finished_sessions_are_released() {
        let server = AetherServer::new(ServerConfig::default()).unwrap();
        for _ in 0..50 {
            server.connect_local().unwrap().close();
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while server
            .shared
            .sessions
            .lock()
            .iter()
            .any(|d| d.state() == DriverState::Running)
        {
            assert!(Instant::now() < deadline, "sessions did not stop");
            thread::sleep(Duration::from_millis(10));
        }

        let link = server.connect_local().unwrap();
        assert_eq!(server.shared.sessions.lock().len(), 1);
        link.send(ServerToken::Synch(SynchToken { sequence: 1 })).unwrap();
        assert!(matches!(link.recv().unwrap(), Some(ClientToken::Ack(a)) if a.sequence == 1));
        server.shutdown();
    }

    #[test]
    fn kicking_unknown_participant_reports_false() {
        let server = AetherServer::new(ServerConfig::default()).unwrap();
        assert!(!server.kick(5).unwrap());
        server.shutdown();
    }

    #[test]
    fn zero_participant_limit_is_rejected() {
        let config = ServerConfig::default().with_max_participants(0);
        assert!(matches!(
            AetherServer::new(config),
            Err(ServerError::Config(_))
        ));
    }
}
