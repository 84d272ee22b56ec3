//! The blocking aether client.

use crate::config::ClientConfig;
use crate::correlator::{Correlator, Signal};
use crate::dispatch::ClientDispatcher;
use crate::error::{ClientError, ClientResult};
use crate::participant::{Handler, ParticipantTable};
use aether_protocol::{
    connect, Ack, AetherUrl, AsyncOp, AsyncToken, Capabilities, ClientLink, ClientToken,
    DisconnectToken, DriverState, Flags, JoinToken, LeaveToken, ParticipantId, ProtocolError,
    ServerToken, SessionDriver, SynchToken, ROOT_PARTICIPANT,
};
use aether_tree::{Delta, Dimension, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A connection to one aether server.
///
/// Every call blocks until the server has answered it. Asynchronous
/// writes return once the server has queued them, together with the
/// global sequence they were assigned; [`Client::synch`] and
/// [`Client::synch_to`] wait for their effects.
///
/// # Example
///
/// ```no_run
/// use aether_client::Client;
/// use aether_tree::{Dimension, Value};
///
/// let client = Client::connect("aep://localhost/").unwrap();
/// let dimension = Dimension::parse("lights:kitchen").unwrap();
/// let global = client.assign(&dimension, Value::leaf("on")).unwrap();
/// client.synch_to(global).unwrap();
/// client.disconnect().unwrap();
/// ```
pub struct Client {
    link: Arc<ClientLink>,
    driver: SessionDriver,
    correlator: Arc<Correlator>,
    participants: Arc<ParticipantTable>,
    sequence: AtomicU64,
}

impl Client {
    /// Connects to the server named by `url` with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid, its scheme has no codec, or
    /// the connection fails.
    pub fn connect(url: &str) -> ClientResult<Self> {
        let url = AetherUrl::parse(url)?;
        Self::connect_with(&url, ClientConfig::default())
    }

    /// Connects to the server named by `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheme has no codec or the connection fails.
    pub fn connect_with(url: &AetherUrl, config: ClientConfig) -> ClientResult<Self> {
        let link = connect(url)?;
        info!(%url, "client connected");
        Self::over(link, config)
    }

    /// Runs a client over an already connected link.
    ///
    /// # Errors
    ///
    /// Returns an error if the session threads cannot be started.
    pub fn over(link: Arc<ClientLink>, config: ClientConfig) -> ClientResult<Self> {
        let correlator = Arc::new(Correlator::new());
        let participants = Arc::new(ParticipantTable::new());
        let dispatcher = ClientDispatcher::new(
            Arc::clone(&correlator),
            Arc::clone(&participants),
            config.error_tolerant,
        );
        let driver = SessionDriver::start(
            "client",
            Arc::clone(&link),
            dispatcher,
            config.intake_capacity,
        )?;
        Ok(Self {
            link,
            driver,
            correlator,
            participants,
            sequence: AtomicU64::new(1),
        })
    }

    /// Returns true until the session stops.
    pub fn is_running(&self) -> bool {
        self.driver.state() == DriverState::Running
    }

    /// Returns the highest global sequence this client has observed.
    pub fn observed(&self) -> u64 {
        self.correlator.observed()
    }

    /// Returns the ids of the participants joined through this client.
    pub fn participants(&self) -> Vec<ParticipantId> {
        self.participants.ids()
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }

    /// Sends `token` and waits for its ACK.
    fn exchange(&self, token: ServerToken, terminate: bool) -> ClientResult<Ack> {
        let sequence = token.sequence();
        let waiter = self
            .correlator
            .register(sequence, terminate, token.is_synchronous());
        debug!(sequence, opcode = token.opcode().name(), "sending");
        if let Err(e) = self.link.send(token) {
            self.correlator.abandon(sequence);
            return Err(e.into());
        }
        match waiter.wait() {
            Signal::Reply(ClientToken::Ack(ack)) => Ok(ack),
            Signal::Reply(ClientToken::Deny(deny)) => Err(ClientError::Denied {
                reason: deny.reason,
            }),
            Signal::Reply(ClientToken::Error(reply)) => Err(ClientError::Remote {
                severity: reply.severity,
                message: reply.message,
            }),
            Signal::Terminated => Err(ClientError::Disconnected),
            Signal::Reply(other) => {
                self.driver.stop();
                Err(ProtocolError::unexpected(format!(
                    "{} in reply to request {sequence}",
                    other.opcode().name()
                ))
                .into())
            }
            Signal::Reached(global) => {
                self.driver.stop();
                Err(ProtocolError::unexpected(format!(
                    "global sequence {global} in reply to request {sequence}"
                ))
                .into())
            }
        }
    }

    /// Joins a participant at the absolute `dimension`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Denied`] if the server refuses the join.
    pub fn join(
        &self,
        dimension: &Dimension,
        capabilities: Capabilities,
        handler: Arc<dyn Handler>,
    ) -> ClientResult<Participant<'_>> {
        let sequence = self.next_sequence();
        self.participants.stage(sequence, dimension.clone(), handler);
        let token = ServerToken::Join(JoinToken {
            sequence,
            dimension: dimension.clone(),
            capabilities,
        });
        let ack = self
            .exchange(token, false)
            .inspect_err(|_| self.participants.discard(sequence))?;
        let id = ack.participant.ok_or_else(|| {
            ProtocolError::unexpected("JOIN acknowledged without a participant id")
        })?;
        debug!(participant = id, %dimension, "joined");
        Ok(Participant {
            client: self,
            id,
            dimension: dimension.clone(),
        })
    }

    /// Removes participant `id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server does not know the participant.
    pub fn leave(&self, id: ParticipantId) -> ClientResult<()> {
        let sequence = self.next_sequence();
        self.exchange(
            ServerToken::Leave(LeaveToken {
                sequence,
                participant: id,
            }),
            false,
        )?;
        self.participants.remove(id);
        Ok(())
    }

    /// Issues an asynchronous operation and returns its global sequence.
    ///
    /// `dimension` is relative to `participant`, or absolute when
    /// `participant` is [`ROOT_PARTICIPANT`].
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the operation.
    pub fn write(
        &self,
        participant: ParticipantId,
        dimension: &Dimension,
        flags: Flags,
        op: AsyncOp,
    ) -> ClientResult<u64> {
        let sequence = self.next_sequence();
        let ack = self.exchange(
            ServerToken::Async(AsyncToken {
                sequence,
                participant,
                dimension: dimension.clone(),
                flags,
                op,
            }),
            false,
        )?;
        Ok(ack.global_sequence)
    }

    /// Replaces the subtree at the absolute `dimension`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the operation.
    pub fn assign(&self, dimension: &Dimension, value: Value) -> ClientResult<u64> {
        self.write(ROOT_PARTICIPANT, dimension, Flags::NONE, AsyncOp::Assign(value))
    }

    /// Applies a delta at the absolute `dimension`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the operation.
    pub fn apply(&self, dimension: &Dimension, delta: Delta) -> ClientResult<u64> {
        self.write(ROOT_PARTICIPANT, dimension, Flags::NONE, AsyncOp::Apply(delta))
    }

    /// Clears the subtree at the absolute `dimension`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the operation.
    pub fn clear(&self, dimension: &Dimension) -> ClientResult<u64> {
        self.write(ROOT_PARTICIPANT, dimension, Flags::NONE, AsyncOp::Clear)
    }

    /// Waits until every operation queued so far has been applied and
    /// notified. Returns the server's global sequence.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Disconnected`] if the session stops first.
    pub fn synch(&self) -> ClientResult<u64> {
        let sequence = self.next_sequence();
        let ack = self.exchange(ServerToken::Synch(SynchToken { sequence }), false)?;
        Ok(ack.global_sequence)
    }

    /// Waits until global sequence `target` has been observed. Returns the
    /// observed global sequence.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Disconnected`] if the session stops first.
    pub fn synch_to(&self, target: u64) -> ClientResult<u64> {
        if target > self.correlator.observed() {
            self.synch()?;
        }
        match self.correlator.register_global(target).wait() {
            Signal::Reached(observed) => Ok(observed),
            _ => Err(ClientError::Disconnected),
        }
    }

    /// Says goodbye to the server and stops the session.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Disconnected`] if the session had already
    /// stopped.
    pub fn disconnect(&self) -> ClientResult<()> {
        let sequence = self.next_sequence();
        let result = self
            .exchange(
                ServerToken::ClientDisconnect(DisconnectToken { sequence }),
                true,
            )
            .map(|_| ());
        self.driver.stop();
        self.driver.join();
        info!("client disconnected");
        result
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        self.driver.stop();
        self.driver.join();
    }
}

/// A participant joined through a [`Client`].
///
/// Dimensions passed to its methods are relative to its position.
pub struct Participant<'a> {
    client: &'a Client,
    id: ParticipantId,
    dimension: Dimension,
}

impl Participant<'_> {
    /// Returns the participant id.
    pub fn id(&self) -> ParticipantId {
        self.id
    }

    /// Returns the absolute position.
    pub fn dimension(&self) -> &Dimension {
        &self.dimension
    }

    /// Issues an operation relative to this participant.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Denied`] for observe-only participants.
    pub fn write(&self, dimension: &Dimension, flags: Flags, op: AsyncOp) -> ClientResult<u64> {
        self.client.write(self.id, dimension, flags, op)
    }

    /// Replaces the subtree at `dimension`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the operation.
    pub fn assign(&self, dimension: &Dimension, value: Value) -> ClientResult<u64> {
        self.write(dimension, Flags::NONE, AsyncOp::Assign(value))
    }

    /// Applies a delta at `dimension`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the operation.
    pub fn apply(&self, dimension: &Dimension, delta: Delta) -> ClientResult<u64> {
        self.write(dimension, Flags::NONE, AsyncOp::Apply(delta))
    }

    /// Clears the subtree at `dimension`.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the operation.
    pub fn clear(&self, dimension: &Dimension) -> ClientResult<u64> {
        self.write(dimension, Flags::NONE, AsyncOp::Clear)
    }

    /// Leaves the aether.
    ///
    /// # Errors
    ///
    /// Returns an error if the server no longer knows the participant.
    pub fn leave(self) -> ClientResult<()> {
        self.client.leave(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::participant::{ChangeKind, ChannelHandler, NullHandler};
    use aether_server::{AetherServer, ServerConfig};
    use std::sync::mpsc;

    fn dim(text: &str) -> Dimension {
        text.parse().unwrap()
    }

    fn local(server: &AetherServer) -> Client {
        Client::over(server.connect_local().unwrap(), ClientConfig::default()).unwrap()
    }

    #[test]
    fn writes_reach_other_clients() {
        let server = AetherServer::new(ServerConfig::default()).unwrap();
        let watcher = local(&server);
        let writer = local(&server);

        let (tx, rx) = mpsc::channel();
        let participant = watcher
            .join(&dim("room"), Capabilities::default(), Arc::new(ChannelHandler::new(tx)))
            .unwrap();

        let global = writer.assign(&dim("room:temp"), Value::leaf(21)).unwrap();
        assert_eq!(writer.synch().unwrap(), global);

        let change = rx.recv().unwrap();
        assert_eq!(change.kind, ChangeKind::Assign);
        assert_eq!(change.participant, participant.id());
        assert_eq!(change.global_sequence, global);
        assert_eq!(change.dimension, Some(dim("temp")));

        assert_eq!(watcher.synch_to(global).unwrap(), global);
        participant.leave().unwrap();
        assert!(watcher.participants().is_empty());

        watcher.disconnect().unwrap();
        writer.disconnect().unwrap();
        server.shutdown();
    }

    #[test]
    fn relative_writes_and_denial() {
        let server = AetherServer::new(ServerConfig::default()).unwrap();
        let client = local(&server);

        let writer = client
            .join(&dim("a"), Capabilities::default(), Arc::new(NullHandler))
            .unwrap();
        writer.assign(&dim("b"), Value::leaf(1)).unwrap();

        let observer = client
            .join(&dim("a"), Capabilities::PURE, Arc::new(NullHandler))
            .unwrap();
        let err = observer.clear(&Dimension::root()).unwrap_err();
        assert!(matches!(err, ClientError::Denied { .. }));
        assert!(err.is_recoverable());
        assert!(client.is_running());

        client.disconnect().unwrap();
        assert!(!client.is_running());
        server.shutdown();
    }

    #[test]
    fn leave_of_unknown_participant_fails() {
        let server = AetherServer::new(ServerConfig::default().with_error_tolerant(true)).unwrap();
        let client = local(&server);
        let err = client.leave(77).unwrap_err();
        assert!(matches!(err, ClientError::Remote { .. }));
        client.synch().unwrap();
        client.disconnect().unwrap();
        server.shutdown();
    }

    #[test]
    fn server_shutdown_releases_blocked_callers() {
        let server = AetherServer::new(ServerConfig::default()).unwrap();
        let client = local(&server);
        client.synch().unwrap();
        server.shutdown();
        let err = client.synch_to(1_000).unwrap_err();
        assert!(matches!(err, ClientError::Disconnected));
        assert!(matches!(client.synch(), Err(ClientError::Disconnected)));
    }
}
