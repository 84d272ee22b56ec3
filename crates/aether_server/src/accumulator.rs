//! The accumulation engine: write coalescing under fences and a size cap.

use crate::merge::{merge, Merge, Pending};
use tracing::trace;

/// Holds at most one merged pending operation.
///
/// Every flush hands the pending operation, together with the number of
/// original operations folded into it, to the caller-supplied `apply`.
#[derive(Debug)]
pub struct Accumulator {
    pending: Option<Pending>,
    count: usize,
    cap: usize,
}

impl Accumulator {
    /// Creates an empty accumulator that flushes once more than `cap`
    /// operations have been folded.
    pub fn new(cap: usize) -> Self {
        Self {
            pending: None,
            count: 0,
            cap,
        }
    }

    /// Returns the pending operation, if any.
    pub fn pending(&self) -> Option<&Pending> {
        self.pending.as_ref()
    }

    /// Returns how many operations are folded into the pending one.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Folds `incoming` into the accumulation.
    pub fn accumulate<F>(&mut self, incoming: Pending, apply: &mut F)
    where
        F: FnMut(Pending, usize),
    {
        let post_fence = incoming.flags.post_fence();

        if incoming.flags.pre_fence() {
            self.flush(apply);
            self.pending = Some(incoming);
        } else {
            match self.pending.as_mut() {
                None => self.pending = Some(incoming),
                Some(pending) => match merge(pending, incoming) {
                    Merge::Absorbed => trace!("operation absorbed"),
                    Merge::Dominated(next) => {
                        trace!(target = %next.target, "pending operation dominated");
                        self.pending = Some(next);
                    }
                    Merge::Synthesized(next) => {
                        trace!(target = %next.target, "operation synthesized");
                        self.pending = Some(next);
                    }
                    Merge::Refused(next) => {
                        self.flush(apply);
                        self.pending = Some(next);
                    }
                },
            }
        }

        self.count += 1;
        if post_fence || self.count > self.cap {
            self.flush(apply);
        }
    }

    /// Applies the pending operation, if any, and resets the count.
    pub fn flush<F>(&mut self, apply: &mut F)
    where
        F: FnMut(Pending, usize),
    {
        if let Some(pending) = self.pending.take() {
            apply(pending, self.count);
        }
        self.count = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::merge::{Operation, Source};
    use crate::registry::SessionId;
    use aether_protocol::Flags;
    use aether_tree::{Dimension, Value};

    fn op(target: &str, operation: Operation, seq: u64, flags: Flags) -> Pending {
        Pending {
            target: target.parse::<Dimension>().unwrap(),
            operation,
            global_sequence: seq,
            source: Source {
                session: SessionId(1),
                participant: 0,
            },
            flags,
        }
    }

    fn assign(target: &str, seq: u64) -> Pending {
        op(target, Operation::Assign(Value::leaf(1)), seq, Flags::NONE)
    }

    #[test]
    fn ancestor_clear_reduces_pending() {
        let mut acc = Accumulator::new(64);
        let mut applied = Vec::new();
        let mut apply = |p: Pending, n: usize| applied.push((p, n));

        acc.accumulate(assign("a:b", 1), &mut apply);
        acc.accumulate(op("a", Operation::Clear, 2, Flags::NONE), &mut apply);

        let pending = acc.pending().unwrap();
        assert_eq!(pending.target, "a".parse().unwrap());
        assert_eq!(pending.operation, Operation::Clear);
        assert_eq!(acc.count(), 2);
        drop(apply);
        assert!(applied.is_empty());
    }

    #[test]
    fn pre_fence_flushes_first() {
        let mut acc = Accumulator::new(64);
        let mut applied = Vec::new();
        let mut apply = |p: Pending, n: usize| applied.push((p.global_sequence, n));

        acc.accumulate(assign("a", 1), &mut apply);
        acc.accumulate(assign("a:b", 2), &mut apply);
        acc.accumulate(op("a", Operation::Clear, 3, Flags::PRE_FENCE), &mut apply);
        drop(apply);

        assert_eq!(applied, vec![(2, 2)]);
        assert_eq!(acc.pending().map(|p| p.global_sequence), Some(3));
        assert_eq!(acc.count(), 1);
    }

    #[test]
    fn post_fence_applies_immediately() {
        let mut acc = Accumulator::new(64);
        let mut applied = Vec::new();
        let mut apply = |p: Pending, n: usize| applied.push((p.global_sequence, n));

        acc.accumulate(op("a", Operation::Clear, 1, Flags::POST_FENCE), &mut apply);
        drop(apply);

        assert_eq!(applied, vec![(1, 1)]);
        assert!(acc.pending().is_none());
        assert_eq!(acc.count(), 0);
    }

    #[test]
    fn unrelated_targets_flush_then_queue() {
        let mut acc = Accumulator::new(64);
        let mut applied = Vec::new();
        let mut apply = |p: Pending, _n: usize| applied.push(p.target.to_string());

        acc.accumulate(assign("a", 1), &mut apply);
        acc.accumulate(assign("b", 2), &mut apply);
        drop(apply);

        assert_eq!(applied, vec!["a".to_string()]);
        assert_eq!(acc.pending().map(|p| p.target.to_string()), Some("b".to_string()));
    }

    #[test]
    fn cap_forces_flush() {
        let mut acc = Accumulator::new(2);
        let mut applied = Vec::new();
        let mut apply = |_p: Pending, n: usize| applied.push(n);

        for seq in 1..=3 {
            acc.accumulate(assign("a", seq), &mut apply);
        }
        drop(apply);

        assert_eq!(applied, vec![3]);
        assert!(acc.pending().is_none());
    }
}
