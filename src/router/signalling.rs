//! Network signalling endpoints (SIP, H.323, IAX2, ...)
//!
//! Stands in for the external signalling stack: the far party rings and
//! answers, registrars accept registrations, and event package
//! subscriptions report their initial state.

use std::collections::HashSet;

use crate::constants::{Prefix, LINE_APPEARANCE_EVENT_PACKAGE, MWI_EVENT_PACKAGE};
use crate::error::CommandError;
use crate::message::{CallState, Command, Event, LineState, RegistrationStatus};
use crate::queue::EventSink;

use super::handler::{misrouted, Job, Leg, Legs, ProtocolHandler, LOCAL_CLEAR_REASON};

pub struct SignallingHandler {
    prefix: Prefix,
    legs: Legs,
    /// Addresses of record currently registered
    registered: HashSet<String>,
}

impl SignallingHandler {
    pub fn new(prefix: Prefix) -> Self {
        Self {
            prefix,
            legs: Legs::default(),
            registered: HashSet::new(),
        }
    }

    fn register(
        &mut self,
        identifier: String,
        host: Option<String>,
        time_to_live: u32,
        event_package: Option<String>,
        sink: &EventSink,
    ) -> Result<(), CommandError> {
        let prefix = self.prefix;
        let status = |status: RegistrationStatus| Event::RegistrationStatus {
            protocol: prefix,
            identifier: identifier.clone(),
            status,
        };

        if time_to_live == 0 {
            if !self.registered.remove(&identifier) {
                return Err(CommandError::Rejected(format!(
                    "'{}' is not registered",
                    identifier
                )));
            }
            sink.emit(status(RegistrationStatus::Unregistered));
            return Ok(());
        }

        // A registrar is either named or taken from the address of record
        let registrar = host.or_else(|| {
            identifier
                .rsplit_once('@')
                .map(|(_, domain)| domain.to_string())
        });
        if registrar.map_or(true, |r| r.is_empty()) {
            return Err(CommandError::InvalidParameter {
                name: "host".to_string(),
                reason: format!("no registrar for '{}'", identifier),
            });
        }

        let subscription = match event_package.as_deref() {
            None => None,
            Some(MWI_EVENT_PACKAGE) => Some(Event::MessageWaiting {
                party: identifier.clone(),
                package: MWI_EVENT_PACKAGE.to_string(),
                new_messages: 0,
                old_messages: 0,
            }),
            Some(LINE_APPEARANCE_EVENT_PACKAGE) => Some(Event::LineAppearance {
                line: identifier.clone(),
                package: LINE_APPEARANCE_EVENT_PACKAGE.to_string(),
                state: LineState::Idle,
            }),
            Some(other) => {
                return Err(CommandError::InvalidParameter {
                    name: "event-package".to_string(),
                    reason: format!("unsupported package '{}'", other),
                })
            }
        };

        sink.emit(status(RegistrationStatus::Registering));
        sink.emit(status(RegistrationStatus::Registered));
        if let Some(event) = subscription {
            sink.emit(event);
        }
        self.registered.insert(identifier);
        Ok(())
    }
}

impl ProtocolHandler for SignallingHandler {
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
                self.legs.transition(&call_id, CallState::Alerting, sink);
                self.legs.connect(&call_id, sink);
                Ok(())
            }
            Command::CallAnswer { call_id } => {
                // Every leg here is outgoing
                let leg = self.legs.get(&call_id)?;
                Err(CommandError::InvalidCallState {
                    call_id: call_id.to_string(),
                    state: leg.state.to_string(),
                    action: "answer",
                })
            }
            Command::CallClear { call_id, reason } => {
                self.legs.remove(&call_id)?;
                sink.emit(Event::CallCleared {
                    call_id,
                    reason: reason.unwrap_or_else(|| LOCAL_CLEAR_REASON.to_string()),
                });
                Ok(())
            }
            Command::SendUserInput { call_id, input } => {
                self.legs
                    .require(&call_id, &[CallState::Connected], "send user input")?;
                tracing::debug!("{}: user input '{}' sent on {}", self.prefix, input, call_id);
                Ok(())
            }
            Command::CallHold { call_id } => self.legs.hold(&call_id, sink),
            Command::CallRetrieve { call_id } => self.legs.retrieve(&call_id, sink),
            Command::MediaStream {
                call_id,
                media,
                action,
            } => self.legs.media(&call_id, media, action, sink),
            Command::Registration {
                identifier,
                host,
                time_to_live,
                event_package,
                ..
            } => self.register(identifier, host, time_to_live, event_package, sink),
            other => Err(misrouted(self.prefix, &other)),
        }
    }
}
