//! Client-side participants and their handlers.

use aether_protocol::{NotifyToken, ParticipantId, ProtocolResult, Target};
use aether_tree::{Dimension, Value};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tracing::{trace, warn};

/// The kind of change a participant is told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A subtree was replaced.
    Assign,
    /// A delta was applied.
    Apply,
    /// A subtree was cleared.
    Clear,
    /// The participant was evicted.
    Kick,
}

/// One change delivered to a participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// What happened.
    pub kind: ChangeKind,
    /// The receiving participant.
    pub participant: ParticipantId,
    /// Global sequence of the operation.
    pub global_sequence: u64,
    /// Where, relative to the participant; `None` when at or above it.
    pub dimension: Option<Dimension>,
    /// The new contents for assigns and applies.
    pub value: Option<Value>,
}

/// Receives the changes of one participant.
///
/// Callbacks run on the client's dispatcher thread. They must not block on
/// a reply from the same client.
pub trait Handler: Send + Sync {
    /// A subtree was replaced.
    fn on_assign(&self, _change: &Change) {}

    /// A delta was applied.
    fn on_apply(&self, _change: &Change) {}

    /// A subtree was cleared.
    fn on_clear(&self, _change: &Change) {}

    /// The participant was evicted. No further changes follow.
    fn on_kick(&self, _change: &Change) {}
}

/// A handler that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl Handler for NullHandler {}

/// Forwards every change to a channel.
///
/// # Example
///
/// ```
/// use aether_client::{ChannelHandler, Change, ChangeKind, Handler};
/// use std::sync::mpsc;
///
/// let (tx, rx) = mpsc::channel();
/// let handler = ChannelHandler::new(tx);
/// handler.on_clear(&Change {
///     kind: ChangeKind::Clear,
///     participant: 1,
///     global_sequence: 4,
///     dimension: None,
///     value: None,
/// });
/// assert_eq!(rx.recv().unwrap().global_sequence, 4);
/// ```
#[derive(Debug)]
pub struct ChannelHandler {
    tx: Sender<Change>,
}

impl ChannelHandler {
    /// Wraps the sending half of a channel.
    pub fn new(tx: Sender<Change>) -> Self {
        Self { tx }
    }

    fn forward(&self, change: &Change) {
        if self.tx.send(change.clone()).is_err() {
            trace!(participant = change.participant, "change receiver dropped");
        }
    }
}

impl Handler for ChannelHandler {
    fn on_assign(&self, change: &Change) {
        self.forward(change);
    }

    fn on_apply(&self, change: &Change) {
        self.forward(change);
    }

    fn on_clear(&self, change: &Change) {
        self.forward(change);
    }

    fn on_kick(&self, change: &Change) {
        self.forward(change);
    }
}

#[derive(Clone)]
struct Registration {
    dimension: Dimension,
    handler: Arc<dyn Handler>,
}

#[derive(Default)]
struct Table {
    live: HashMap<ParticipantId, Registration>,
    staged: HashMap<u64, Registration>,
}

/// The participants joined through one client, keyed by id.
///
/// A participant is staged under its JOIN sequence while the request is in
/// flight. The dispatcher promotes it when the ACK arrives, before any
/// notification for the new id can be read.
#[derive(Default)]
pub struct ParticipantTable {
    inner: Mutex<Table>,
}

impl ParticipantTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a participant joining with request `sequence`.
    pub fn stage(&self, sequence: u64, dimension: Dimension, handler: Arc<dyn Handler>) {
        self.inner
            .lock()
            .staged
            .insert(sequence, Registration { dimension, handler });
    }

    /// Makes the participant staged under `sequence` live as `id`.
    ///
    /// Returns false if nothing was staged under `sequence`.
    pub fn promote(&self, sequence: u64, id: ParticipantId) -> bool {
        let mut table = self.inner.lock();
        match table.staged.remove(&sequence) {
            Some(registration) => {
                table.live.insert(id, registration);
                true
            }
            None => false,
        }
    }

    /// Drops whatever was staged under `sequence`.
    pub fn discard(&self, sequence: u64) {
        self.inner.lock().staged.remove(&sequence);
    }

    /// Removes a live participant.
    pub fn remove(&self, id: ParticipantId) -> bool {
        self.inner.lock().live.remove(&id).is_some()
    }

    /// Returns the position of a live participant.
    pub fn dimension(&self, id: ParticipantId) -> Option<Dimension> {
        self.inner.lock().live.get(&id).map(|r| r.dimension.clone())
    }

    /// Returns true if `id` is live.
    pub fn contains(&self, id: ParticipantId) -> bool {
        self.inner.lock().live.contains_key(&id)
    }

    /// Returns the live ids in ascending order.
    pub fn ids(&self) -> Vec<ParticipantId> {
        let mut ids: Vec<_> = self.inner.lock().live.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Forgets every participant.
    pub fn clear(&self) {
        let mut table = self.inner.lock();
        table.live.clear();
        table.staged.clear();
    }

    /// Runs the handlers for every target of `notify`.
    ///
    /// Targets for participants this table does not know, for example ones
    /// that left while the notification was in flight, are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if a target references a node the notification does
    /// not carry.
    pub fn dispatch(&self, notify: &NotifyToken) -> ProtocolResult<usize> {
        let mut delivered = 0;
        for target in &notify.targets {
            let id = target.participant();
            let handler = match target {
                Target::Kick { .. } => self.inner.lock().live.remove(&id),
                _ => self.inner.lock().live.get(&id).cloned(),
            };
            let Some(Registration { handler, .. }) = handler else {
                warn!(participant = id, "notification for unknown participant");
                continue;
            };

            let mut change = Change {
                kind: ChangeKind::Kick,
                participant: id,
                global_sequence: notify.global_sequence,
                dimension: None,
                value: None,
            };
            match target {
                Target::Assign { node, dimension, .. } => {
                    change.kind = ChangeKind::Assign;
                    change.dimension = dimension.clone();
                    change.value = Some(notify.resolve(node)?);
                    handler.on_assign(&change);
                }
                Target::Apply { node, dimension, .. } => {
                    change.kind = ChangeKind::Apply;
                    change.dimension = dimension.clone();
                    change.value = Some(notify.resolve(node)?);
                    handler.on_apply(&change);
                }
                Target::Clear { dimension, .. } => {
                    change.kind = ChangeKind::Clear;
                    change.dimension = dimension.clone();
                    handler.on_clear(&change);
                }
                Target::Kick { .. } => handler.on_kick(&change),
            }
            delivered += 1;
        }
        Ok(delivered)
    }
}
