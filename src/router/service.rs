//! Service endpoints (IVR, mixer, line interfaces, fax, IM, ...)
//!
//! The service picks up at once: calls go straight from proceeding to
//! connected.

use crate::constants::Prefix;
use crate::error::CommandError;
use crate::message::{CallState, Command, Event};
use crate::queue::EventSink;

use super::handler::{misrouted, Job, Leg, Legs, ProtocolHandler, LOCAL_CLEAR_REASON};

pub struct ServiceHandler {
    prefix: Prefix,
    legs: Legs,
}

impl ServiceHandler {
    pub fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            legs: Legs::default(),
        }
    }
}

impl ProtocolHandler for ServiceHandler {
    fn prefix(&self) -> Prefix {
        self.prefix
    }

    fn handle(&mut self, job: Job, sink: &EventSink) -> Result<(), CommandError> {
        match job.command {
            Command::CallSetup { .. } => {
                let call_id = job
                    .call_id
                    .ok_or_else(|| CommandError::Rejected("call-setup without call id".to_string()))?;
                self.legs.insert(call_id.clone(), Leg::outgoing());
                sink.emit(Event::CallStateChanged {
                    call_id: call_id.clone(),
                    state: CallState::Proceeding,
                });
                self.legs.connect(&call_id, sink);
                Ok(())
            }
            Command::CallClear { call_id, reason } => {
                self.legs.remove(&call_id)?;
                sink.emit(Event::CallCleared {
                    call_id,
                    reason: reason.unwrap_or_else(|| LOCAL_CLEAR_REASON.to_string()),
                });
                Ok(())
            }
            Command::CallAnswer { call_id } => {
                let leg = self.legs.get(&call_id)?;
                Err(CommandError::InvalidCallState {
                    call_id: call_id.to_string(),
                    state: leg.state.to_string(),
                    action: "answer",
                })
            }
            Command::SendUserInput { call_id, input } => {
                self.legs
                    .require(&call_id, &[CallState::Connected], "send user input")?;
                tracing::debug!("{}: user input '{}' on {}", self.prefix, input, call_id);
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
