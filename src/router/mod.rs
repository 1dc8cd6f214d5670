//! Command Router
//!
//! Decodes inbound commands, resolves the protocol handler that owns them
//! and forwards them to that handler's worker.
//!
//! ## Resolution
//! - `call-setup`: URI scheme of `party-b` (no scheme → default protocol)
//! - call-scoped commands: the call table (`CallId → Prefix`)
//! - `registration`: the `protocol` parameter, signalling endpoints only
//! - `set-*-params`: applied here, no worker involved
//!
//! ## Acknowledgement policy
//! The synchronous reply only covers decoding, version checks and
//! routing. Anything that depends on call state is decided by the worker
//! and reported asynchronously, as call events or as a `command-error`
//! carrying the command's id.

mod handler;
mod loopback;
mod service;
mod signalling;
mod worker;

pub use handler::{Job, Leg, Legs, ProtocolHandler, LOCAL_CLEAR_REASON, REMOTE_CLEAR_REASON};
pub use loopback::LoopbackHandler;
pub use service::ServiceHandler;
pub use signalling::SignallingHandler;
pub use worker::Worker;

use std::collections::{BTreeMap, HashMap};

use crate::config::Config;
use crate::constants::{Family, Prefix, LINE_APPEARANCE_EVENT_PACKAGE};
use crate::error::{CommandError, Result};
use crate::message::{
    CallId, Command, Event, Message, MessageType, Params, Value, LINE_APPEARANCE_SINCE_VERSION,
};
use crate::queue::EventSink;

/// Build the handler for a prefix according to its family
pub fn handler_for(prefix: Prefix) -> Box<dyn ProtocolHandler> {
    match prefix.family() {
        Family::Signalling => Box::new(SignallingHandler::new(prefix)),
        Family::Loopback => Box::new(LoopbackHandler::new(prefix)),
        Family::Service => Box::new(ServiceHandler::new(prefix)),
    }
}

/// Routes commands to protocol workers (lives on the controller side)
pub struct CommandRouter {
    api_version: u32,
    default_protocol: Prefix,
    workers: BTreeMap<Prefix, Worker>,
    /// Which protocol owns each live call
    calls: HashMap<CallId, Prefix>,
    general: Params,
    protocol_settings: BTreeMap<Prefix, Params>,
}

impl CommandRouter {
    /// Spawn a worker for every enabled protocol.
    ///
    /// Workers already started are stopped again if a later spawn fails.
    pub fn start(config: &Config, api_version: u32, sink: &EventSink) -> Result<Self> {
        let mut workers = BTreeMap::new();
        for &prefix in &config.protocols {
            // On error, `workers` drops and each Worker joins its thread
            let worker = Worker::spawn(handler_for(prefix), sink.clone())?;
            workers.insert(prefix, worker);
        }

        Ok(Self {
            api_version,
            default_protocol: config.default_protocol,
            workers,
            calls: HashMap::new(),
            general: Params::new(),
            protocol_settings: BTreeMap::new(),
        })
    }

    /// Route a command message; always yields an ack or an error event
    pub fn route(&mut self, message: &Message) -> Event {
        match self.dispatch(message) {
            Ok(ack) => ack,
            Err(e) => {
                tracing::warn!("Rejected {} {}: {}", message.id(), message.tag(), e);
                Event::rejected(&e, Some(message))
            }
        }
    }

    fn dispatch(&mut self, message: &Message) -> std::result::Result<Event, CommandError> {
        let command = Command::decode(message)?;
        let tag = command.message_type();

        if let Some(since) = tag.since_version() {
            if since > self.api_version {
                return Err(CommandError::UnsupportedInVersion {
                    command: tag.to_string(),
                    since,
                    negotiated: self.api_version,
                });
            }
        }

        let ack = |call_id: Option<CallId>, previous: Option<Params>| Event::CommandAck {
            command: tag.clone(),
            command_id: message.id(),
            call_id,
            previous,
        };

        match command {
            Command::SetGeneralParams { settings } => {
                let previous = replace_settings(&mut self.general, settings);
                Ok(ack(None, Some(previous)))
            }
            Command::SetProtocolParams { protocol, settings } => {
                self.worker(protocol)?;
                let current = self.protocol_settings.entry(protocol).or_default();
                let previous = replace_settings(current, settings);
                Ok(ack(None, Some(previous)))
            }
            Command::Registration {
                protocol,
                ref event_package,
                ..
            } => {
                self.worker(protocol)?;
                if protocol.family() != Family::Signalling {
                    return Err(CommandError::Rejected(format!(
                        "'{}' does not support registration",
                        protocol
                    )));
                }
                if event_package.as_deref() == Some(LINE_APPEARANCE_EVENT_PACKAGE)
                    && self.api_version < LINE_APPEARANCE_SINCE_VERSION
                {
                    return Err(CommandError::UnsupportedInVersion {
                        command: format!("{} ({})", tag, LINE_APPEARANCE_EVENT_PACKAGE),
                        since: LINE_APPEARANCE_SINCE_VERSION,
                        negotiated: self.api_version,
                    });
                }
                self.submit(protocol, message, command, None)?;
                Ok(ack(None, None))
            }
            Command::CallSetup { party_a, party_b } => {
                let (protocol, party_b) = self.resolve_party(&party_b)?;
                let party_a = party_a.unwrap_or_else(|| self.local_party(protocol));
                let call_id = CallId::next();

                self.submit(
                    protocol,
                    message,
                    Command::CallSetup {
                        party_a: Some(party_a),
                        party_b,
                    },
                    Some(call_id.clone()),
                )?;
                self.calls.insert(call_id.clone(), protocol);
                tracing::debug!("{} placed on {} as {}", message.id(), protocol, call_id);
                Ok(ack(Some(call_id), None))
            }
            command => {
                let call_id = command
                    .call_id()
                    .cloned()
                    .ok_or_else(|| CommandError::Rejected(format!("cannot route '{}'", tag)))?;
                let protocol = *self
                    .calls
                    .get(&call_id)
                    .ok_or_else(|| CommandError::UnknownCall(call_id.to_string()))?;

                let clearing = matches!(command, Command::CallClear { .. });
                self.submit(protocol, message, command, None)?;
                if clearing {
                    self.calls.remove(&call_id);
                }
                Ok(ack(Some(call_id), None))
            }
        }
    }

    /// Track calls the controller learns about from delivered events
    pub fn observe(&mut self, message: &Message) {
        match message.tag() {
            MessageType::IncomingCall => {
                let protocol = message.text("protocol").and_then(|p| p.parse().ok());
                if let (Some(call_id), Some(protocol)) = (message.call_id(), protocol) {
                    self.calls.insert(call_id, protocol);
                }
            }
            MessageType::CallCleared => {
                if let Some(call_id) = message.call_id() {
                    self.calls.remove(&call_id);
                }
            }
            _ => {}
        }
    }

    /// Stop every worker; reports the first failure after stopping all
    pub fn stop(&mut self) -> Result<()> {
        let mut first_error = None;
        for (_, mut worker) in std::mem::take(&mut self.workers) {
            if let Err(e) = worker.stop() {
                tracing::error!("{}", e);
                first_error.get_or_insert(e);
            }
        }
        self.calls.clear();
        first_error.map_or(Ok(()), Err)
    }

    /// Enabled protocols, in table order
    pub fn protocols(&self) -> Vec<Prefix> {
        self.workers.keys().copied().collect()
    }

    /// Number of calls the router currently routes
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }

    pub fn general_settings(&self) -> &Params {
        &self.general
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn worker(&self, protocol: Prefix) -> std::result::Result<&Worker, CommandError> {
        self.workers
            .get(&protocol)
            .ok_or_else(|| CommandError::NoEndpoint(protocol.to_string()))
    }

    fn submit(
        &self,
        protocol: Prefix,
        message: &Message,
        command: Command,
        call_id: Option<CallId>,
    ) -> std::result::Result<(), CommandError> {
        self.worker(protocol)?.submit(Job {
            command_id: message.id(),
            command,
            call_id,
        })
    }

    /// Split a party URI into its protocol and a fully qualified URI
    fn resolve_party(&self, party: &str) -> std::result::Result<(Prefix, String), CommandError> {
        match Prefix::of_uri(party) {
            Some(Ok(prefix)) => {
                self.worker(prefix)?;
                Ok((prefix, party.to_string()))
            }
            Some(Err(scheme)) => Err(CommandError::NoEndpoint(scheme)),
            None => {
                let prefix = self.default_protocol;
                self.worker(prefix)?;
                Ok((prefix, format!("{}:{}", prefix, party)))
            }
        }
    }

    /// Calling party for a protocol, from its `user-name` setting
    fn local_party(&self, protocol: Prefix) -> String {
        let user = self
            .protocol_settings
            .get(&protocol)
            .and_then(|s| s.get("user-name"))
            .and_then(Value::as_text)
            .unwrap_or("switchboard");
        format!("{}:{}", protocol, user)
    }
}

/// Apply `settings` and return the values they replaced.
///
/// An empty update is a query: every current value is returned.
fn replace_settings(current: &mut Params, settings: Params) -> Params {
    if settings.is_empty() {
        return current.clone();
    }
    let mut previous = Params::new();
    for (key, value) in settings {
        if let Some(old) = current.insert(key.clone(), value) {
            previous.insert(key, old);
        }
    }
    previous
}
