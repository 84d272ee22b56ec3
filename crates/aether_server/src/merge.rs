//! Merging of pending asynchronous operations.
//!
//! Two operations merge when their targets lie on one path. The result is
//! an explicit [`Merge`] outcome rather than an aliased token, so the
//! accumulator always knows which operation it owns afterwards.

use crate::registry::SessionId;
use aether_protocol::{AsyncOp, Flags, OpKind, ParticipantId};
use aether_tree::{Ancestry, Delta, Dimension, Value, ValueTree};

/// A resolved asynchronous operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// Replace the subtree.
    Assign(Value),
    /// Apply a delta.
    Apply(Delta),
    /// Clear the subtree.
    Clear,
}

impl Operation {
    /// Returns the kind of this operation.
    pub fn kind(&self) -> OpKind {
        match self {
            Operation::Assign(_) => OpKind::Assign,
            Operation::Apply(_) => OpKind::Apply,
            Operation::Clear => OpKind::Clear,
        }
    }

    /// Performs the operation on `tree` at `target`.
    pub fn perform(&self, tree: &mut dyn ValueTree, target: &Dimension) {
        match self {
            Operation::Assign(value) => tree.assign(target, value.clone()),
            Operation::Apply(delta) => tree.apply(target, delta),
            Operation::Clear => tree.clear(target),
        }
    }

    /// Returns true if performing the operation at the target may change
    /// the node at `path` below it.
    pub fn touches(&self, path: &Dimension) -> bool {
        match self {
            Operation::Assign(_) | Operation::Clear => true,
            Operation::Apply(delta) => delta.touches(path),
        }
    }
}

impl From<AsyncOp> for Operation {
    fn from(op: AsyncOp) -> Self {
        match op {
            AsyncOp::Assign(value) => Operation::Assign(value),
            AsyncOp::Apply(delta) => Operation::Apply(delta),
            AsyncOp::Clear => Operation::Clear,
        }
    }
}

/// Who issued an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source {
    /// Issuing session.
    pub session: SessionId,
    /// Issuing participant, or `<= 0` for the session's root operations.
    pub participant: ParticipantId,
}

/// An operation queued for the tree, addressed absolutely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    /// Absolute target.
    pub target: Dimension,
    /// What to do there.
    pub operation: Operation,
    /// Global sequence assigned when the operation was queued.
    pub global_sequence: u64,
    /// Issuer.
    pub source: Source,
    /// Fence and notify bits.
    pub flags: Flags,
}

/// Outcome of folding an incoming operation into a pending one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Merge {
    /// The incoming operation makes the pending one obsolete.
    Dominated(Pending),
    /// The incoming operation was folded into the pending one in place.
    Absorbed,
    /// A new operation replaces both.
    Synthesized(Pending),
    /// The targets are unrelated; the pending operation must be applied
    /// before the incoming one is queued.
    Refused(Pending),
}

/// Position of the incoming target relative to the pending one.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    /// Incoming is a strict ancestor; path leads down to the pending target.
    Covers(Dimension),
    /// Same target.
    Same,
    /// Incoming is a strict descendant; path leads down from the pending
    /// target.
    Within(Dimension),
}

fn scope(pending: &Dimension, incoming: &Dimension) -> Option<Scope> {
    Some(match incoming.ancestry(pending)? {
        Ancestry::Ancestor(path) => Scope::Covers(path),
        Ancestry::Same => Scope::Same,
        Ancestry::Descendant(path) => Scope::Within(path),
    })
}

/// Folds `incoming` into `pending`.
///
/// Whenever the result is a single operation, applying it has the same
/// effect on the tree as applying `pending` and then `incoming`.
pub fn merge(pending: &mut Pending, incoming: Pending) -> Merge {
    let Some(scope) = scope(&pending.target, &incoming.target) else {
        return Merge::Refused(incoming);
    };

    let Pending {
        target,
        operation,
        global_sequence,
        source,
        flags,
    } = incoming;
    let synthesize = |target: Dimension, operation: Operation| {
        Merge::Synthesized(Pending {
            target,
            operation,
            global_sequence,
            source,
            flags,
        })
    };

    let outcome = match (&mut pending.operation, operation, scope) {
        // Assign and clear replace whatever they cover.
        (
            _,
            operation @ (Operation::Assign(_) | Operation::Clear),
            Scope::Covers(_) | Scope::Same,
        ) => {
            Merge::Dominated(Pending {
                target,
                operation,
                global_sequence,
                source,
                flags,
            })
        }

        (Operation::Assign(value), Operation::Assign(inner), Scope::Within(path)) => {
            value.assign_at(&path, inner);
            Merge::Absorbed
        }
        (Operation::Assign(value), Operation::Apply(delta), Scope::Same) => {
            value.apply(&delta);
            Merge::Absorbed
        }
        (Operation::Assign(value), Operation::Apply(delta), Scope::Within(path)) => {
            value.apply_at(&path, &delta);
            Merge::Absorbed
        }
        (Operation::Assign(value), Operation::Apply(delta), Scope::Covers(path)) => {
            let mut combined = Delta::new();
            combined.assign_at(&path, value);
            combined.compose(delta);
            synthesize(target, Operation::Apply(combined))
        }
        (Operation::Assign(value), Operation::Clear, Scope::Within(path)) => {
            value.clear_at(&path);
            Merge::Absorbed
        }

        (Operation::Apply(delta), Operation::Assign(inner), Scope::Within(path)) => {
            delta.assign_at(&path, &inner);
            Merge::Absorbed
        }
        (Operation::Apply(delta), Operation::Apply(next), Scope::Same) => {
            delta.compose(next);
            Merge::Absorbed
        }
        (Operation::Apply(delta), Operation::Apply(next), Scope::Within(path)) => {
            delta.compose_at(&path, next);
            Merge::Absorbed
        }
        (Operation::Apply(delta), Operation::Apply(next), Scope::Covers(path)) => {
            let mut combined = Delta::at(&path, std::mem::take(delta));
            combined.compose(next);
            synthesize(target, Operation::Apply(combined))
        }
        (Operation::Apply(delta), Operation::Clear, Scope::Within(path)) => {
            delta.clear_at(&path);
            Merge::Absorbed
        }

        (Operation::Clear, Operation::Assign(inner), Scope::Within(path)) => {
            let mut value = Value::empty();
            value.assign_at(&path, inner);
            synthesize(pending.target.clone(), Operation::Assign(value))
        }
        (Operation::Clear, Operation::Apply(next), Scope::Same) => {
            let mut combined = Delta::clear();
            combined.compose(next);
            synthesize(target, Operation::Apply(combined))
        }
        (Operation::Clear, Operation::Apply(next), Scope::Covers(path)) => {
            let mut combined = Delta::new();
            combined.clear_at(&path);
            combined.compose(next);
            synthesize(target, Operation::Apply(combined))
        }
        (Operation::Clear, Operation::Apply(next), Scope::Within(path)) => {
            let mut combined = Delta::clear();
            combined.compose_at(&path, next);
            synthesize(pending.target.clone(), Operation::Apply(combined))
        }
        (Operation::Clear, Operation::Clear, Scope::Within(_)) => Merge::Absorbed,
    };

    if outcome == Merge::Absorbed {
        pending.global_sequence = global_sequence;
        pending.source = source;
        pending.flags = flags;
    }
    outcome
}
