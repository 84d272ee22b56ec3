//! Server side of one client connection.

use crate::aether::{AetherHandle, Outcome};
use crate::registry::SessionId;
use aether_protocol::{Dispatch, Flow, ProtocolError, ServerToken, Severity};
use tracing::{debug, info, warn};

/// Hands every decoded token to the aether loop and waits for the reply.
pub(crate) struct ServerDispatcher {
    session: SessionId,
    aether: AetherHandle,
    error_tolerant: bool,
}

impl ServerDispatcher {
    pub(crate) fn new(session: SessionId, aether: AetherHandle, error_tolerant: bool) -> Self {
        Self {
            session,
            aether,
            error_tolerant,
        }
    }

    fn keeps_going(&self, outcome: Outcome) -> bool {
        match outcome {
            Outcome::Acked | Outcome::Denied => true,
            Outcome::Failed(Severity::Fatal) => false,
            Outcome::Failed(Severity::Error) => self.error_tolerant,
            Outcome::Failed(Severity::Info | Severity::Warning) => true,
        }
    }
}

impl Dispatch<ServerToken> for ServerDispatcher {
    fn dispatch(&mut self, token: ServerToken) -> Flow {
        let disconnecting = matches!(token, ServerToken::ClientDisconnect(_));
        let outcome = match self.aether.submit(self.session, token) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(session = %self.session, error = %e, "aether unavailable");
                return Flow::Stop;
            }
        };
        if disconnecting {
            info!(session = %self.session, "client disconnected");
            return Flow::Stop;
        }
        if self.keeps_going(outcome) {
            Flow::Continue
        } else {
            debug!(session = %self.session, ?outcome, "closing session after error");
            Flow::Stop
        }
    }

    fn end_of_stream(&mut self) {
        debug!(session = %self.session, "peer closed the connection");
    }

    fn finish(&mut self, error: Option<ProtocolError>) {
        if let Some(e) = error {
            warn!(session = %self.session, error = %e, "session failed");
        }
        self.aether.detach(self.session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aether::Aether;
    use crate::config::ServerConfig;
    use aether_protocol::{LeaveToken, SynchToken};
    use aether_tree::MemoryTree;

    fn dispatcher(tolerant: bool) -> (ServerDispatcher, AetherHandle) {
        let (handle, _thread) =
            Aether::spawn(Box::new(MemoryTree::new()), &ServerConfig::default()).unwrap();
        (
            ServerDispatcher::new(SessionId(1), handle.clone(), tolerant),
            handle,
        )
    }

    fn bad_leave() -> ServerToken {
        ServerToken::Leave(LeaveToken {
            sequence: 1,
            participant: 42,
        })
    }

    #[test]
    fn errors_stop_unless_tolerant() {
        let (mut strict, handle) = dispatcher(false);
        assert_eq!(strict.dispatch(bad_leave()), Flow::Stop);
        handle.shutdown().unwrap();

        let (mut tolerant, handle) = dispatcher(true);
        assert_eq!(tolerant.dispatch(bad_leave()), Flow::Continue);
        assert_eq!(
            tolerant.dispatch(ServerToken::Synch(SynchToken { sequence: 2 })),
            Flow::Continue
        );
        handle.shutdown().unwrap();
    }

    #[test]
    fn stopped_aether_stops_the_session() {
        let (mut dispatcher, handle) = dispatcher(true);
        handle.shutdown().unwrap();
        assert_eq!(
            dispatcher.dispatch(ServerToken::Synch(SynchToken { sequence: 1 })),
            Flow::Stop
        );
    }
}
