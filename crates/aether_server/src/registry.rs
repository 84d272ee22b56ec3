//! Participant registry: an arena keyed by participant id.
//!
//! Entries store their owning session as a plain key, so participants,
//! sessions and the aether never point at each other.

use aether_protocol::{Capabilities, ParticipantId, ProtocolError, ProtocolResult};
use aether_tree::{Ancestry, Dimension};
use std::collections::BTreeMap;
use std::fmt;

/// Identifies a server-side session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// A registered participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantEntry {
    /// Participant id.
    pub id: ParticipantId,
    /// Session the participant joined through.
    pub session: SessionId,
    /// Absolute position in the tree.
    pub dimension: Dimension,
    /// Notification capabilities.
    pub capabilities: Capabilities,
}

/// How a participant is positioned relative to an operation's target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// The participant sits at the target or above it; carries the path
    /// from the participant down to the target (empty when equal).
    Above(Dimension),
    /// The participant sits strictly below the target; carries the path
    /// from the target down to the participant.
    Below(Dimension),
}

/// Every live participant of one aether.
#[derive(Debug)]
pub struct Registry {
    entries: BTreeMap<ParticipantId, ParticipantEntry>,
    next_id: ParticipantId,
    capacity: usize,
}

impl Registry {
    /// Creates an empty registry that holds at most `capacity` participants.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            next_id: 1,
            capacity,
        }
    }

    /// Returns true if no further participant fits.
    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }

    /// Returns the number of live participants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no participant is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hands out the next id. Ids are never reused.
    pub fn allocate(&mut self) -> ParticipantId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Registers a participant under an id from [`Registry::allocate`].
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DuplicateParticipant`] if the id is live.
    pub fn register(&mut self, entry: ParticipantEntry) -> ProtocolResult<()> {
        if self.entries.contains_key(&entry.id) {
            return Err(ProtocolError::DuplicateParticipant(entry.id));
        }
        self.entries.insert(entry.id, entry);
        Ok(())
    }

    /// Looks a participant up.
    pub fn get(&self, id: ParticipantId) -> Option<&ParticipantEntry> {
        self.entries.get(&id)
    }

    /// Looks a participant up on behalf of `session`.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is unknown or owned by another session.
    pub fn owned(
        &self,
        id: ParticipantId,
        session: SessionId,
    ) -> ProtocolResult<&ParticipantEntry> {
        let entry = self
            .entries
            .get(&id)
            .ok_or(ProtocolError::UnknownParticipant(id))?;
        if entry.session != session {
            return Err(ProtocolError::ForeignParticipant(id));
        }
        Ok(entry)
    }

    /// Removes a participant.
    pub fn deregister(&mut self, id: ParticipantId) -> Option<ParticipantEntry> {
        self.entries.remove(&id)
    }

    /// Removes every participant of `session`.
    pub fn remove_session(&mut self, session: SessionId) -> Vec<ParticipantEntry> {
        let ids: Vec<_> = self
            .entries
            .values()
            .filter(|e| e.session == session)
            .map(|e| e.id)
            .collect();
        ids.into_iter()
            .filter_map(|id| self.entries.remove(&id))
            .collect()
    }

    /// Returns every participant on the same path as `target`, ordered by
    /// position (ancestors first) and then by id.
    pub fn related(&self, target: &Dimension) -> Vec<(&ParticipantEntry, Placement)> {
        let mut out: Vec<_> = self
            .entries
            .values()
            .filter_map(|entry| {
                let placement = match entry.dimension.ancestry(target)? {
                    Ancestry::Same => Placement::Above(Dimension::root()),
                    Ancestry::Ancestor(path) => Placement::Above(path),
                    Ancestry::Descendant(path) => Placement::Below(path),
                };
                Some((entry, placement))
            })
            .collect();
        out.sort_by(|(a, _), (b, _)| a.dimension.cmp(&b.dimension).then(a.id.cmp(&b.id)));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dim(text: &str) -> Dimension {
        text.parse().unwrap()
    }

    fn join(registry: &mut Registry, session: u64, at: &str) -> ParticipantId {
        let id = registry.allocate();
        registry
            .register(ParticipantEntry {
                id,
                session: SessionId(session),
                dimension: dim(at),
                capabilities: Capabilities::default(),
            })
            .unwrap();
        id
    }

    #[test]
    fn ids_are_never_reused() {
        let mut registry = Registry::new(10);
        let a = join(&mut registry, 1, "a");
        registry.deregister(a);
        let b = join(&mut registry, 1, "a");
        assert!(b > a);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn duplicate_is_rejected() {
        let mut registry = Registry::new(10);
        let id = join(&mut registry, 1, "a");
        let err = registry
            .register(ParticipantEntry {
                id,
                session: SessionId(2),
                dimension: dim("b"),
                capabilities: Capabilities::default(),
            })
            .unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateParticipant(i) if i == id));
    }

    #[test]
    fn ownership_is_checked() {
        let mut registry = Registry::new(10);
        let id = join(&mut registry, 1, "a");
        assert!(registry.owned(id, SessionId(1)).is_ok());
        assert!(matches!(
            registry.owned(id, SessionId(2)),
            Err(ProtocolError::ForeignParticipant(_))
        ));
        assert!(matches!(
            registry.owned(99, SessionId(1)),
            Err(ProtocolError::UnknownParticipant(99))
        ));
    }

    #[test]
    fn related_orders_by_position() {
        let mut registry = Registry::new(10);
        let deep = join(&mut registry, 1, "a:b:c");
        let top = join(&mut registry, 2, "a");
        let _other = join(&mut registry, 1, "z");
        let same = join(&mut registry, 2, "a:b");

        let related = registry.related(&dim("a:b"));
        let ids: Vec<_> = related.iter().map(|(e, _)| e.id).collect();
        assert_eq!(ids, vec![top, same, deep]);
        assert_eq!(related[0].1, Placement::Above(dim("b")));
        assert_eq!(related[1].1, Placement::Above(Dimension::root()));
        assert_eq!(related[2].1, Placement::Below(dim("c")));
    }

    #[test]
    fn remove_session_and_capacity() {
        let mut registry = Registry::new(2);
        join(&mut registry, 1, "a");
        join(&mut registry, 2, "b");
        assert!(registry.is_full());
        let removed = registry.remove_session(SessionId(1));
        assert_eq!(removed.len(), 1);
        assert!(!registry.is_full());
    }
}
