//! Sequence correlation: wakes blocked callers when their reply arrives.
//!
//! Two kinds of waiter exist. Reply waiters are keyed by the local
//! sequence of the request they sent. Global waiters wait until a global
//! sequence has been observed on this endpoint. Every waiter is signalled
//! exactly once: by its reply, by a sweep, or by [`Correlator::resume_all`].

use aether_protocol::{ClientToken, ProtocolError, ProtocolResult};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::{debug, trace};

/// What a waiter was woken with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// The reply to the waiter's request.
    Reply(ClientToken),
    /// The awaited global sequence was observed; carries the observed value.
    Reached(u64),
    /// The session stopped before the waiter was answered.
    Terminated,
}

/// Whether the receive loop should keep going after a resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Keep reading.
    Continue,
    /// The resumed waiter asked the loop to stop.
    Terminate,
}

/// A registered waiter. Blocks in [`Waiter::wait`] until signalled.
#[derive(Debug)]
pub struct Waiter {
    rx: Receiver<Signal>,
}

impl Waiter {
    /// Blocks until the waiter is signalled.
    pub fn wait(self) -> Signal {
        self.rx.recv().unwrap_or(Signal::Terminated)
    }

    /// Returns the signal if it has already arrived.
    pub fn try_wait(&self) -> Option<Signal> {
        self.rx.try_recv().ok()
    }
}

struct Slot {
    terminate: bool,
    barrier: bool,
    tx: Sender<Signal>,
}

#[derive(Default)]
struct Inner {
    replies: HashMap<u64, Slot>,
    globals: BTreeMap<(u64, u64), Sender<Signal>>,
    next_ticket: u64,
    observed: u64,
    closed: bool,
}

impl Inner {
    fn sweep(&mut self, global_sequence: u64) -> usize {
        let later = self.globals.split_off(&(global_sequence.saturating_add(1), 0));
        let reached = std::mem::replace(&mut self.globals, later);
        let count = reached.len();
        for (_, tx) in reached {
            let _ = tx.send(Signal::Reached(global_sequence));
        }
        count
    }
}

/// Per-endpoint map from outstanding sequences to blocked callers.
#[derive(Default)]
pub struct Correlator {
    inner: Mutex<Inner>,
}

impl Correlator {
    /// Creates an empty correlator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a waiter for the reply to request `sequence`.
    ///
    /// `terminate` marks a request after whose reply the receive loop stops.
    /// `barrier` marks a request the server answers only after flushing, so
    /// its ACK counts as an observation of the global sequence it carries.
    ///
    /// Register before sending, so the reply cannot overtake the waiter.
    pub fn register(&self, sequence: u64, terminate: bool, barrier: bool) -> Waiter {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.inner.lock();
        if inner.closed {
            let _ = tx.send(Signal::Terminated);
        } else {
            inner.replies.insert(
                sequence,
                Slot {
                    terminate,
                    barrier,
                    tx,
                },
            );
        }
        Waiter { rx }
    }

    /// Registers a waiter for global sequence `target`. It fires at once if
    /// `target` was already observed.
    pub fn register_global(&self, target: u64) -> Waiter {
        let (tx, rx) = mpsc::channel();
        let mut inner = self.inner.lock();
        if inner.closed {
            let _ = tx.send(Signal::Terminated);
        } else if target <= inner.observed {
            let _ = tx.send(Signal::Reached(inner.observed));
        } else {
            let ticket = inner.next_ticket;
            inner.next_ticket += 1;
            inner.globals.insert((target, ticket), tx);
        }
        Waiter { rx }
    }

    /// Drops the waiter for `sequence` without signalling it, for requests
    /// that never made it onto the wire.
    pub fn abandon(&self, sequence: u64) {
        self.inner.lock().replies.remove(&sequence);
    }

    /// Delivers `reply` to the waiter registered under its sequence.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::UnknownSequence`] if nobody waits for it.
    pub fn resume(&self, reply: ClientToken) -> ProtocolResult<Resume> {
        let sequence = reply.reply_sequence().ok_or_else(|| {
            ProtocolError::unexpected(format!("{} is not a reply", reply.opcode().name()))
        })?;
        let mut inner = self.inner.lock();
        let slot = inner
            .replies
            .remove(&sequence)
            .ok_or(ProtocolError::UnknownSequence(sequence))?;

        let observed = match &reply {
            ClientToken::Ack(ack) if slot.barrier => Some(ack.global_sequence),
            _ => None,
        };
        trace!(sequence, opcode = reply.opcode().name(), "resuming waiter");
        let _ = slot.tx.send(Signal::Reply(reply));
        if let Some(global_sequence) = observed {
            if global_sequence > inner.observed {
                inner.observed = global_sequence;
            }
            let observed = inner.observed;
            inner.sweep(observed);
        }

        Ok(if slot.terminate {
            Resume::Terminate
        } else {
            Resume::Continue
        })
    }

    /// Records that `global_sequence` was observed and wakes every global
    /// waiter at or below it, lowest target first. Returns how many woke.
    pub fn resume_until(&self, global_sequence: u64) -> usize {
        let mut inner = self.inner.lock();
        if global_sequence > inner.observed {
            inner.observed = global_sequence;
        }
        let observed = inner.observed;
        inner.sweep(observed)
    }

    /// Wakes every waiter with [`Signal::Terminated`] and refuses new ones.
    ///
    /// Returns true if any resumed reply waiter had asked for termination.
    pub fn resume_all(&self) -> bool {
        let mut inner = self.inner.lock();
        inner.closed = true;
        let mut terminate = false;
        for (_, slot) in inner.replies.drain() {
            terminate |= slot.terminate;
            let _ = slot.tx.send(Signal::Terminated);
        }
        for (_, tx) in std::mem::take(&mut inner.globals) {
            let _ = tx.send(Signal::Terminated);
        }
        debug!(terminate, "resumed all waiters");
        terminate
    }

    /// Returns the highest global sequence observed.
    pub fn observed(&self) -> u64 {
        self.inner.lock().observed
    }

    /// Returns the number of waiters not yet signalled.
    pub fn outstanding(&self) -> usize {
        let inner = self.inner.lock();
        inner.replies.len() + inner.globals.len()
    }

    /// Returns true once [`Correlator::resume_all`] has run.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_protocol::{Ack, Deny};
    use std::sync::Arc;
    use std::thread;

    fn ack(sequence: u64, global_sequence: u64) -> ClientToken {
        ClientToken::Ack(Ack {
            sequence,
            global_sequence,
            participant: None,
        })
    }

    #[test]
    fn reply_reaches_its_waiter_once() {
        let correlator = Correlator::new();
        let first = correlator.register(1, false, false);
        let second = correlator.register(2, false, false);

        assert_eq!(correlator.resume(ack(2, 7)).unwrap(), Resume::Continue);
        assert_eq!(second.wait(), Signal::Reply(ack(2, 7)));
        assert!(first.try_wait().is_none());

        assert!(matches!(
            correlator.resume(ack(2, 7)),
            Err(ProtocolError::UnknownSequence(2))
        ));
        assert_eq!(correlator.outstanding(), 1);
    }

    #[test]
    fn terminate_flag_is_reported() {
        let correlator = Correlator::new();
        let waiter = correlator.register(5, true, true);
        assert_eq!(correlator.resume(ack(5, 0)).unwrap(), Resume::Terminate);
        assert!(matches!(waiter.wait(), Signal::Reply(_)));
    }

    #[test]
    fn async_ack_does_not_count_as_observed() {
        let correlator = Correlator::new();
        let global = correlator.register_global(3);
        correlator.register(1, false, false);
        correlator.resume(ack(1, 3)).unwrap();
        assert!(global.try_wait().is_none());
        assert_eq!(correlator.observed(), 0);

        correlator.register(2, false, true);
        correlator.resume(ack(2, 3)).unwrap();
        assert_eq!(global.wait(), Signal::Reached(3));
    }

    #[test]
    fn sweep_wakes_in_target_order_and_stops_above() {
        let correlator = Correlator::new();
        let low = correlator.register_global(2);
        let mid = correlator.register_global(4);
        let high = correlator.register_global(9);

        assert_eq!(correlator.resume_until(4), 2);
        assert_eq!(low.wait(), Signal::Reached(4));
        assert_eq!(mid.wait(), Signal::Reached(4));
        assert!(high.try_wait().is_none());

        // Already observed: fires immediately.
        let past = correlator.register_global(3);
        assert_eq!(past.try_wait(), Some(Signal::Reached(4)));
    }

    #[test]
    fn resume_all_releases_everyone() {
        let correlator = Arc::new(Correlator::new());
        let reply = correlator.register(1, true, false);
        let global = correlator.register_global(100);

        let waiters = thread::spawn(move || (reply.wait(), global.wait()));
        assert!(correlator.resume_all());
        assert_eq!(
            waiters.join().unwrap(),
            (Signal::Terminated, Signal::Terminated)
        );

        let late = correlator.register(2, false, false);
        assert_eq!(late.wait(), Signal::Terminated);
        assert!(correlator.is_closed());
    }

    #[test]
    fn deny_is_delivered_as_reply() {
        let correlator = Correlator::new();
        let waiter = correlator.register(4, false, true);
        let deny = ClientToken::Deny(Deny {
            sequence: 4,
            reason: "no".into(),
        });
        correlator.resume(deny.clone()).unwrap();
        assert_eq!(waiter.wait(), Signal::Reply(deny));
        assert_eq!(correlator.observed(), 0);
    }

    #[test]
    fn abandoned_sequence_is_unknown() {
        let correlator = Correlator::new();
        let _waiter = correlator.register(8, false, false);
        correlator.abandon(8);
        assert!(correlator.resume(ack(8, 0)).is_err());
    }
}
