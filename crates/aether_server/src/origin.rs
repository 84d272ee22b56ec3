//! Notification builder.
//!
//! An `Origin` is scoped to the application of one accumulated operation.
//! It collects one [`NotifyToken`] per destination session and hands each
//! of them out exactly once.

use crate::merge::Source;
use crate::registry::{ParticipantEntry, SessionId};
use aether_protocol::{Flags, NotifyToken};
use std::collections::BTreeMap;

/// Per-operation notification accumulator.
#[derive(Debug, Default)]
pub struct Origin {
    global_sequence: u64,
    source: Option<Source>,
    flags: Flags,
    destinations: BTreeMap<SessionId, NotifyToken>,
}

impl Origin {
    /// Creates an idle builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts collecting for the operation stamped `global_sequence`.
    ///
    /// `source` is `None` for server-internal operations, which are never
    /// suppressed.
    pub fn begin_operation(&mut self, global_sequence: u64, source: Option<Source>, flags: Flags) {
        self.destinations.clear();
        self.global_sequence = global_sequence;
        self.source = source;
        self.flags = flags;
    }

    /// Returns true if `entry` must not hear about the current operation.
    ///
    /// Only fenced operations suppress: the issuing participant is skipped
    /// unless NOTIFY_SELF is set, and the other participants of the issuing
    /// session are skipped unless NOTIFY_CLIENT is set.
    pub fn suppresses(&self, entry: &ParticipantEntry) -> bool {
        let Some(source) = self.source else {
            return false;
        };
        if !self.flags.fenced() {
            return false;
        }
        if source.participant > 0 && entry.id == source.participant {
            return !self.flags.notify_self();
        }
        entry.session == source.session && !self.flags.notify_client()
    }

    /// Returns the notification for `session`, creating it on first use.
    pub fn add_server_map_entry(&mut self, session: SessionId) -> &mut NotifyToken {
        let global_sequence = self.global_sequence;
        self.destinations
            .entry(session)
            .or_insert_with(|| NotifyToken::new(global_sequence))
    }

    /// Returns how many sessions have something to receive.
    pub fn destination_count(&self) -> usize {
        self.destinations.values().filter(|n| !n.is_empty()).count()
    }

    /// Hands every non-empty notification to `send` and resets the builder.
    ///
    /// Returns the number of notifications handed out.
    pub fn execute<F>(&mut self, mut send: F) -> usize
    where
        F: FnMut(SessionId, NotifyToken),
    {
        let mut sent = 0;
        for (session, notify) in std::mem::take(&mut self.destinations) {
            if notify.is_empty() {
                continue;
            }
            send(session, notify);
            sent += 1;
        }
        self.source = None;
        sent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_protocol::{Capabilities, Target};
    use aether_tree::{Dimension, Value};

    fn entry(id: i64, session: u64) -> ParticipantEntry {
        ParticipantEntry {
            id,
            session: SessionId(session),
            dimension: Dimension::root(),
            capabilities: Capabilities::default(),
        }
    }

    fn source(session: u64, participant: i64) -> Option<Source> {
        Some(Source {
            session: SessionId(session),
            participant,
        })
    }

    #[test]
    fn unfenced_never_suppresses() {
        let mut origin = Origin::new();
        origin.begin_operation(1, source(1, 5), Flags::PRE_FENCE);
        assert!(!origin.suppresses(&entry(5, 1)));
        assert!(!origin.suppresses(&entry(6, 1)));
    }

    #[test]
    fn fenced_suppresses_self_and_session() {
        let mut origin = Origin::new();
        origin.begin_operation(1, source(1, 5), Flags::FENCED);
        assert!(origin.suppresses(&entry(5, 1)));
        assert!(origin.suppresses(&entry(6, 1)));
        assert!(!origin.suppresses(&entry(7, 2)));

        origin.begin_operation(2, source(1, 5), Flags::FENCED | Flags::NOTIFY_SELF);
        assert!(!origin.suppresses(&entry(5, 1)));
        assert!(origin.suppresses(&entry(6, 1)));

        origin.begin_operation(3, source(1, 5), Flags::FENCED | Flags::NOTIFY_CLIENT);
        assert!(origin.suppresses(&entry(5, 1)));
        assert!(!origin.suppresses(&entry(6, 1)));
    }

    #[test]
    fn internal_operations_are_not_suppressed() {
        let mut origin = Origin::new();
        origin.begin_operation(1, None, Flags::FENCED);
        assert!(!origin.suppresses(&entry(5, 1)));
    }

    #[test]
    fn one_notification_per_session_sent_once() {
        let mut origin = Origin::new();
        origin.begin_operation(9, source(1, 0), Flags::NONE);
        for (session, participant) in [(1, 1), (2, 2), (1, 3)] {
            let notify = origin.add_server_map_entry(SessionId(session));
            let node = notify.add_node(&Dimension::root(), Value::empty);
            notify.add_target(Target::Apply {
                participant,
                node,
                dimension: None,
            });
        }
        origin.add_server_map_entry(SessionId(3));
        assert_eq!(origin.destination_count(), 2);

        let mut delivered = Vec::new();
        let sent = origin.execute(|session, notify| delivered.push((session, notify)));
        assert_eq!(sent, 2);
        assert_eq!(delivered[0].0, SessionId(1));
        assert_eq!(delivered[0].1.targets.len(), 2);
        assert_eq!(delivered[0].1.nodes.len(), 1);
        assert!(delivered.iter().all(|(_, n)| n.global_sequence == 9));

        assert_eq!(origin.execute(|_, _| panic!("already sent")), 0);
    }
}
