//! The aether loop: the single writer of one value tree.
//!
//! Sessions submit tokens through an [`AetherHandle`] and block until the
//! loop has handled them. Synchronous tokens flush the accumulation before
//! they run. Asynchronous tokens are acknowledged as soon as they are
//! queued; their tree effect and notifications come later, on this loop.

use crate::accumulator::Accumulator;
use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::merge::{Operation, Pending, Source};
use crate::origin::Origin;
use crate::registry::{ParticipantEntry, Placement, Registry, SessionId};
use aether_protocol::{
    Ack, AsyncToken, Capabilities, ClientToken, Deny, ErrorReply, Flags, JoinToken, LeaveToken,
    OpKind, ParticipantId, ProtocolError, ServerLink, ServerToken, Severity, Target,
};
use aether_tree::ValueTree;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, info, trace, warn};

/// Counters describing what the loop has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AetherStats {
    /// Accumulated operations applied to the tree.
    pub applied_operations: u64,
    /// Original operations folded into those applications.
    pub folded_operations: u64,
    /// Notifications handed to sessions.
    pub notifications_sent: u64,
    /// Last global sequence handed out.
    pub global_sequence: u64,
    /// Live participants.
    pub participants: usize,
}

/// How the loop answered a submitted token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// ACK was sent.
    Acked,
    /// DENY was sent.
    Denied,
    /// ERROR with this severity was sent.
    Failed(Severity),
}

pub(crate) enum Command {
    Attach {
        session: SessionId,
        link: Arc<ServerLink>,
    },
    Submit {
        session: SessionId,
        token: ServerToken,
        done: Sender<Outcome>,
    },
    Detach {
        session: SessionId,
    },
    Shutdown {
        done: Sender<()>,
    },
}

/// A cloneable handle to the aether loop.
#[derive(Clone)]
pub struct AetherHandle {
    tx: Sender<Command>,
    stats: Arc<Mutex<AetherStats>>,
}

impl AetherHandle {
    pub(crate) fn attach(&self, session: SessionId, link: Arc<ServerLink>) -> ServerResult<()> {
        self.tx
            .send(Command::Attach { session, link })
            .map_err(|_| ServerError::Stopped)
    }

    /// Submits a token for `session` and waits until the loop has replied.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Stopped`] if the loop is gone.
    pub fn submit(&self, session: SessionId, token: ServerToken) -> ServerResult<Outcome> {
        let (done, wait) = mpsc::channel();
        self.tx
            .send(Command::Submit {
                session,
                token,
                done,
            })
            .map_err(|_| ServerError::Stopped)?;
        wait.recv().map_err(|_| ServerError::Stopped)
    }

    pub(crate) fn detach(&self, session: SessionId) {
        // The loop may already be gone during shutdown.
        let _ = self.tx.send(Command::Detach { session });
    }

    pub(crate) fn shutdown(&self) -> ServerResult<()> {
        let (done, wait) = mpsc::channel();
        self.tx
            .send(Command::Shutdown { done })
            .map_err(|_| ServerError::Stopped)?;
        wait.recv().map_err(|_| ServerError::Stopped)
    }

    /// Returns a snapshot of the loop's counters.
    pub fn stats(&self) -> AetherStats {
        self.stats.lock().clone()
    }
}

/// Everything the loop mutates when it applies an operation.
struct Engine {
    tree: Box<dyn ValueTree>,
    registry: Registry,
    origin: Origin,
    sessions: HashMap<SessionId, Arc<ServerLink>>,
    stats: Arc<Mutex<AetherStats>>,
}

impl Engine {
    fn send(&self, session: SessionId, token: ClientToken) {
        let Some(link) = self.sessions.get(&session) else {
            trace!(%session, "dropping token for detached session");
            return;
        };
        if let Err(e) = link.send(token) {
            debug!(%session, error = %e, "send failed");
        }
    }

    /// Performs an accumulated operation and notifies affected participants.
    fn apply(&mut self, pending: Pending, folded: usize) {
        pending.operation.perform(self.tree.as_mut(), &pending.target);
        debug!(
            global_sequence = pending.global_sequence,
            target = %pending.target,
            folded,
            "applied accumulated operation"
        );

        let kind = pending.operation.kind();
        self.origin
            .begin_operation(pending.global_sequence, Some(pending.source), pending.flags);

        for (entry, placement) in self.registry.related(&pending.target) {
            if !entry.capabilities.wants(kind) || self.origin.suppresses(entry) {
                continue;
            }
            let (at, relative) = match placement {
                Placement::Above(path) => {
                    let relative = (!path.is_root()).then_some(path);
                    (pending.target.clone(), relative)
                }
                Placement::Below(path) => {
                    if !pending.operation.touches(&path) {
                        continue;
                    }
                    (entry.dimension.clone(), None)
                }
            };

            let notify = self.origin.add_server_map_entry(entry.session);
            let target = match kind {
                OpKind::Clear => Target::Clear {
                    participant: entry.id,
                    dimension: relative,
                },
                OpKind::Assign | OpKind::Apply => {
                    let tree = &self.tree;
                    let node = notify.add_node(&at, || tree.value(&at));
                    if kind == OpKind::Assign {
                        Target::Assign {
                            participant: entry.id,
                            node,
                            dimension: relative,
                        }
                    } else {
                        Target::Apply {
                            participant: entry.id,
                            node,
                            dimension: relative,
                        }
                    }
                }
            };
            notify.add_target(target);
        }

        let sessions = &self.sessions;
        let sent = self.origin.execute(|session, notify| {
            if let Some(link) = sessions.get(&session) {
                if let Err(e) = link.send(ClientToken::Notify(notify)) {
                    debug!(%session, error = %e, "notify failed");
                }
            }
        });

        let mut stats = self.stats.lock();
        stats.applied_operations += 1;
        stats.folded_operations += folded as u64;
        stats.notifications_sent += sent as u64;
    }

    /// Removes a participant and tells it, if it asked to be told. The
    /// notification is stamped with `global_sequence`, which the caller
    /// commits only when this returns true.
    fn kick(&mut self, participant: ParticipantId, global_sequence: u64) -> bool {
        let Some(entry) = self.registry.deregister(participant) else {
            return false;
        };
        info!(participant, session = %entry.session, "participant kicked");
        if entry.capabilities.contains(Capabilities::KICK_NOTIFY) {
            self.origin.begin_operation(global_sequence, None, Flags::NONE);
            self.origin
                .add_server_map_entry(entry.session)
                .add_target(Target::Kick { participant });
            let sessions = &self.sessions;
            let sent = self.origin.execute(|session, notify| {
                if let Some(link) = sessions.get(&session) {
                    let _ = link.send(ClientToken::Notify(notify));
                }
            });
            self.stats.lock().notifications_sent += sent as u64;
        }
        true
    }
}

/// The state owned by the loop thread.
pub(crate) struct Aether {
    engine: Engine,
    accumulator: Accumulator,
    global_sequence: u64,
    max_participants: usize,
}

impl Aether {
    /// Spawns the loop thread over `tree`.
    pub(crate) fn spawn(
        tree: Box<dyn ValueTree>,
        config: &ServerConfig,
    ) -> ServerResult<(AetherHandle, JoinHandle<()>)> {
        let stats = Arc::new(Mutex::new(AetherStats::default()));
        let aether = Aether {
            engine: Engine {
                tree,
                registry: Registry::new(config.max_participants),
                origin: Origin::new(),
                sessions: HashMap::new(),
                stats: Arc::clone(&stats),
            },
            accumulator: Accumulator::new(config.accumulation_cap),
            global_sequence: 0,
            max_participants: config.max_participants,
        };
        let (tx, rx) = mpsc::channel();
        let handle = thread::Builder::new()
            .name("aether-loop".into())
            .spawn(move || aether.run(rx))?;
        Ok((AetherHandle { tx, stats }, handle))
    }

    fn run(mut self, commands: Receiver<Command>) {
        info!(max_participants = self.max_participants, "aether loop started");
        for command in commands.iter() {
            match command {
                Command::Attach { session, link } => {
                    self.engine.sessions.insert(session, link);
                }
                Command::Submit {
                    session,
                    token,
                    done,
                } => {
                    let outcome = self.submit(session, token);
                    let _ = done.send(outcome);
                }
                Command::Detach { session } => self.detach(session),
                Command::Shutdown { done } => {
                    self.flush();
                    for (session, link) in self.engine.sessions.drain() {
                        if let Err(e) = link.send(ClientToken::ServerDisconnect) {
                            debug!(%session, error = %e, "disconnect notice failed");
                        }
                    }
                    info!(global_sequence = self.global_sequence, "aether loop stopped");
                    let _ = done.send(());
                    return;
                }
            }
            self.publish();
        }
        self.flush();
        debug!("every handle dropped, aether loop exiting");
    }

    fn publish(&self) {
        let mut stats = self.engine.stats.lock();
        stats.global_sequence = self.global_sequence;
        stats.participants = self.engine.registry.len();
    }

    fn flush(&mut self) {
        let engine = &mut self.engine;
        self.accumulator
            .flush(&mut |pending, folded| engine.apply(pending, folded));
    }

    fn submit(&mut self, session: SessionId, token: ServerToken) -> Outcome {
        trace!(%session, opcode = token.opcode().name(), "dispatching");
        let sequence = token.sequence();
        let result = match token {
            ServerToken::Synch(_) => {
                self.flush();
                Ok(self.ack(session, sequence, None))
            }
            ServerToken::ClientDisconnect(_) => {
                self.flush();
                let removed = self.engine.registry.remove_session(session);
                debug!(%session, participants = removed.len(), "client disconnecting");
                Ok(self.ack(session, sequence, None))
            }
            ServerToken::Join(join) => {
                self.flush();
                Ok(self.join(session, join))
            }
            ServerToken::Leave(leave) => {
                self.flush();
                self.leave(session, leave)
            }
            ServerToken::Async(token) => self.queue(session, token),
            ServerToken::Kick(kick) => {
                self.flush();
                let global_sequence = self.global_sequence + 1;
                if self.engine.kick(kick.participant, global_sequence) {
                    self.global_sequence = global_sequence;
                    Ok(Outcome::Acked)
                } else {
                    Err(ProtocolError::UnknownParticipant(kick.participant))
                }
            }
        };

        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                let severity = e.severity();
                warn!(%session, sequence, error = %e, "request failed");
                if sequence > 0 {
                    self.engine.send(
                        session,
                        ClientToken::Error(ErrorReply {
                            sequence: Some(sequence),
                            severity,
                            message: e.to_string(),
                        }),
                    );
                }
                Outcome::Failed(severity)
            }
        }
    }

    fn ack(
        &self,
        session: SessionId,
        sequence: u64,
        participant: Option<ParticipantId>,
    ) -> Outcome {
        self.ack_at(session, sequence, self.global_sequence, participant)
    }

    fn ack_at(
        &self,
        session: SessionId,
        sequence: u64,
        global_sequence: u64,
        participant: Option<ParticipantId>,
    ) -> Outcome {
        self.engine.send(
            session,
            ClientToken::Ack(Ack {
                sequence,
                global_sequence,
                participant,
            }),
        );
        Outcome::Acked
    }

    fn deny(&self, session: SessionId, sequence: u64, reason: String) -> Outcome {
        debug!(%session, sequence, %reason, "denied");
        self.engine
            .send(session, ClientToken::Deny(Deny { sequence, reason }));
        Outcome::Denied
    }

    fn join(&mut self, session: SessionId, join: JoinToken) -> Outcome {
        if self.engine.registry.is_full() {
            let reason = format!("participant limit {} reached", self.max_participants);
            return self.deny(session, join.sequence, reason);
        }
        let id = self.engine.registry.allocate();
        let entry = ParticipantEntry {
            id,
            session,
            dimension: join.dimension,
            capabilities: join.capabilities,
        };
        self.engine.tree.ensure(&entry.dimension);
        debug!(%session, participant = id, dimension = %entry.dimension, "joined");
        if let Err(e) = self.engine.registry.register(entry) {
            // Fresh ids cannot collide; keep the registry consistent anyway.
            warn!(participant = id, error = %e, "join failed");
            return self.deny(session, join.sequence, e.to_string());
        }
        self.ack(session, join.sequence, Some(id))
    }

    fn leave(&mut self, session: SessionId, leave: LeaveToken) -> Result<Outcome, ProtocolError> {
        self.engine.registry.owned(leave.participant, session)?;
        self.engine.registry.deregister(leave.participant);
        debug!(%session, participant = leave.participant, "left");
        Ok(self.ack(session, leave.sequence, None))
    }

    fn queue(&mut self, session: SessionId, token: AsyncToken) -> Result<Outcome, ProtocolError> {
        let target = if token.participant > 0 {
            let entry = self.engine.registry.owned(token.participant, session)?;
            if entry.capabilities.is_pure() {
                let reason = format!("participant {} is observe-only", entry.id);
                return Ok(self.deny(session, token.sequence, reason));
            }
            entry.dimension.join(&token.dimension)
        } else {
            token.dimension.clone()
        };

        self.global_sequence += 1;
        let global_sequence = self.global_sequence;
        let outcome = self.ack_at(session, token.sequence, global_sequence, None);

        let pending = Pending {
            target,
            operation: Operation::from(token.op),
            global_sequence,
            source: Source {
                session,
                participant: token.participant,
            },
            flags: token.flags,
        };
        let engine = &mut self.engine;
        self.accumulator
            .accumulate(pending, &mut |pending, folded| engine.apply(pending, folded));
        Ok(outcome)
    }

    fn detach(&mut self, session: SessionId) {
        self.flush();
        let removed = self.engine.registry.remove_session(session);
        self.engine.sessions.remove(&session);
        debug!(%session, participants = removed.len(), "session detached");
    }
}
