//! Client side of the session: routes replies and notifications.

use crate::correlator::{Correlator, Resume};
use crate::participant::ParticipantTable;
use aether_protocol::{ClientToken, Dispatch, Flow, ProtocolError, Severity};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Dispatches the tokens a client receives.
pub(crate) struct ClientDispatcher {
    correlator: Arc<Correlator>,
    participants: Arc<ParticipantTable>,
    error_tolerant: bool,
}

impl ClientDispatcher {
    pub(crate) fn new(
        correlator: Arc<Correlator>,
        participants: Arc<ParticipantTable>,
        error_tolerant: bool,
    ) -> Self {
        Self {
            correlator,
            participants,
            error_tolerant,
        }
    }

    fn fault(&self, error: &ProtocolError) -> Flow {
        if error.is_fatal() || !self.error_tolerant {
            error!(error = %error, "client session failed");
            Flow::Stop
        } else {
            warn!(error = %error, "ignoring fault");
            Flow::Continue
        }
    }

    fn reply(&mut self, reply: ClientToken) -> Flow {
        match &reply {
            ClientToken::Ack(ack) => {
                if let Some(id) = ack.participant {
                    self.participants.promote(ack.sequence, id);
                }
            }
            ClientToken::Deny(deny) => self.participants.discard(deny.sequence),
            ClientToken::Error(reply) => {
                if let Some(sequence) = reply.sequence {
                    self.participants.discard(sequence);
                }
            }
            _ => {}
        }
        match self.correlator.resume(reply) {
            Ok(Resume::Continue) => Flow::Continue,
            Ok(Resume::Terminate) => Flow::Stop,
            Err(e) => {
                warn!(error = %e, "unmatched reply");
                self.fault(&e)
            }
        }
    }
}

impl Dispatch<ClientToken> for ClientDispatcher {
    fn dispatch(&mut self, token: ClientToken) -> Flow {
        match token {
            ClientToken::Notify(notify) => {
                let flow = match self.participants.dispatch(&notify) {
                    Ok(delivered) => {
                        debug!(global_sequence = notify.global_sequence, delivered, "notified");
                        Flow::Continue
                    }
                    Err(e) => self.fault(&e),
                };
                self.correlator.resume_until(notify.global_sequence);
                flow
            }
            ClientToken::Error(ref reply) if reply.sequence.is_none() => {
                let e = ProtocolError::Remote {
                    severity: reply.severity,
                    message: reply.message.clone(),
                };
                if reply.severity >= Severity::Error {
                    self.fault(&e)
                } else {
                    warn!(error = %e, "server warning");
                    Flow::Continue
                }
            }
            reply @ (ClientToken::Ack(_) | ClientToken::Deny(_) | ClientToken::Error(_)) => {
                self.reply(reply)
            }
            ClientToken::ServerDisconnect => {
                info!("server disconnected");
                Flow::Stop
            }
            ClientToken::ClientTerminate => {
                debug!("transport ended");
                Flow::Stop
            }
        }
    }

    fn end_of_stream(&mut self) {
        self.dispatch(ClientToken::ClientTerminate);
    }

    fn finish(&mut self, error: Option<ProtocolError>) {
        if let Some(e) = &error {
            error!(error = %e, "client transport failed");
        }
        self.correlator.resume_all();
        self.participants.clear();
        info!("client session stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::Signal;
    use crate::participant::NullHandler;
    use aether_protocol::{Ack, ErrorReply, NotifyToken, Target};
    use aether_tree::Dimension;

    fn dispatcher(tolerant: bool) -> (ClientDispatcher, Arc<Correlator>, Arc<ParticipantTable>) {
        let correlator = Arc::new(Correlator::new());
        let participants = Arc::new(ParticipantTable::new());
        (
            ClientDispatcher::new(Arc::clone(&correlator), Arc::clone(&participants), tolerant),
            correlator,
            participants,
        )
    }

    #[test]
    fn join_ack_promotes_before_notifications() {
        let (mut dispatcher, correlator, participants) = dispatcher(false);
        participants.stage(1, Dimension::root(), Arc::new(NullHandler));
        let waiter = correlator.register(1, false, true);

        let ack = ClientToken::Ack(Ack {
            sequence: 1,
            global_sequence: 0,
            participant: Some(7),
        });
        assert_eq!(dispatcher.dispatch(ack.clone()), Flow::Continue);
        assert!(participants.contains(7));
        assert_eq!(waiter.wait(), Signal::Reply(ack));

        let mut notify = NotifyToken::new(3);
        notify.add_target(Target::Clear {
            participant: 7,
            dimension: None,
        });
        let global = correlator.register_global(3);
        assert_eq!(dispatcher.dispatch(ClientToken::Notify(notify)), Flow::Continue);
        assert_eq!(global.wait(), Signal::Reached(3));
    }

    #[test]
    fn unmatched_reply_stops_unless_tolerant() {
        let stray = ClientToken::Ack(Ack {
            sequence: 42,
            global_sequence: 0,
            participant: None,
        });
        let (mut strict, _, _) = dispatcher(false);
        assert_eq!(strict.dispatch(stray.clone()), Flow::Stop);
        let (mut tolerant, _, _) = dispatcher(true);
        assert_eq!(tolerant.dispatch(stray), Flow::Continue);
    }

    #[test]
    fn sessionless_fatal_error_stops() {
        let (mut dispatcher, _, _) = dispatcher(true);
        let fatal = ClientToken::Error(ErrorReply {
            sequence: None,
            severity: Severity::Fatal,
            message: "bye".into(),
        });
        assert_eq!(dispatcher.dispatch(fatal), Flow::Stop);
    }

    #[test]
    fn finish_drains_waiters() {
        let (mut dispatcher, correlator, _) = dispatcher(false);
        let waiter = correlator.register(1, false, true);
        assert_eq!(dispatcher.dispatch(ClientToken::ServerDisconnect), Flow::Stop);
        dispatcher.finish(None);
        assert_eq!(waiter.wait(), Signal::Terminated);
    }
}
