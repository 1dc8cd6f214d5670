//! Loopback endpoints (local, pc)
//!
//! Both legs of a call live in the same session: placing a call raises
//! an `incoming-call` for the far leg, which the controller answers.

use crate::constants::Prefix;
use crate::error::CommandError;
use crate::message::{CallId, CallState, Command, Event};
use crate::queue::EventSink;

use super::handler::{
    misrouted, Job, Leg, Legs, ProtocolHandler, LOCAL_CLEAR_REASON, REMOTE_CLEAR_REASON,
};

pub struct LoopbackHandler {
    prefix: Prefix,
    legs: Legs,
}

impl LoopbackHandler {
    pub fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            legs: Legs::default(),
        }
    }

    fn peer_of(&self, call_id: &CallId) -> Option<CallId> {
        self.legs.get(call_id).ok().and_then(|leg| leg.peer.clone())
    }
}

impl ProtocolHandler for LoopbackHandler {
    fn prefix(&self) -> Prefix {
        self.prefix
    }

    fn handle(&mut self, job: Job, sink: &EventSink) -> Result<(), CommandError> {
        match job.command {
            Command::CallSetup { party_a, party_b } => {
                let outgoing = job
                    .call_id
                    .ok_or_else(|| CommandError::Rejected("call-setup without call id".to_string()))?;
                let incoming = CallId::next();

                let mut leg = Leg::outgoing();
                leg.peer = Some(incoming.clone());
                self.legs.insert(outgoing.clone(), leg);
                self.legs.insert(incoming.clone(), Leg::incoming(outgoing.clone()));

                sink.emit(Event::CallStateChanged {
                    call_id: outgoing.clone(),
                    state: CallState::Proceeding,
                });
                sink.emit(Event::IncomingCall {
                    call_id: incoming,
                    protocol: self.prefix,
                    party_a: party_a.unwrap_or_default(),
                    party_b,
                });
                self.legs.transition(&outgoing, CallState::Alerting, sink);
                Ok(())
            }
            Command::CallAnswer { call_id } => {
                let leg = self.legs.get(&call_id)?;
                if !leg.incoming || leg.state != CallState::Alerting {
                    return Err(CommandError::InvalidCallState {
                        call_id: call_id.to_string(),
                        state: leg.state.to_string(),
                        action: "answer",
                    });
                }
                let peer = leg.peer.clone();

                self.legs.connect(&call_id, sink);
                if let Some(peer) = peer {
                    self.legs.connect(&peer, sink);
                }
                Ok(())
            }
            Command::CallClear { call_id, reason } => {
                let leg = self.legs.remove(&call_id)?;
                sink.emit(Event::CallCleared {
                    call_id,
                    reason: reason.unwrap_or_else(|| LOCAL_CLEAR_REASON.to_string()),
                });
                if let Some(peer) = leg.peer {
                    if self.legs.remove(&peer).is_ok() {
                        sink.emit(Event::CallCleared {
                            call_id: peer,
                            reason: REMOTE_CLEAR_REASON.to_string(),
                        });
                    }
                }
                Ok(())
            }
            Command::SendUserInput { call_id, input } => {
                self.legs
                    .require(&call_id, &[CallState::Connected], "send user input")?;
                if let Some(peer) = self.peer_of(&call_id) {
                    sink.emit(Event::UserInput {
                        call_id: peer,
                        input,
                    });
                }
                Ok(())
            }
            Command::CallHold { call_id } => self.legs.hold(&call_id, sink),
            Command::CallRetrieve { call_id } => self.legs.retrieve(&call_id, sink),
            Command::MediaStream {
                call_id,
                media,
                action,
            } => self.legs.media(&call_id, media, action, sink),
            other => Err(misrouted(self.prefix, &other)),
        }
    }
}
