//! Event definitions
//!
//! Typed view of engine-to-controller messages.

use crate::constants::Prefix;
use crate::error::{CommandError, Result, SwitchboardError};
use crate::params;

use super::command::insert_opt;
use super::{
    optional_integer, optional_text, required_integer, required_parsed, required_text, CallId,
    MediaKind, Message, MessageId, MessageType, Params, Value,
};

keyword_enum! {
    /// Progress of a call leg
    CallState {
        Proceeding => "proceeding",
        Alerting => "alerting",
        Connected => "connected",
        Held => "held",
    }
}

keyword_enum! {
    MediaState { Open => "open", Closed => "closed", Paused => "paused" }
}

keyword_enum! {
    RegistrationStatus {
        Registering => "registering",
        Registered => "registered",
        Unregistered => "unregistered",
        Failed => "failed",
    }
}

keyword_enum! {
    LineState { Idle => "idle", Busy => "busy" }
}

/// An engine event
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Synchronous acknowledgement of an accepted command
    CommandAck {
        command: MessageType,
        command_id: MessageId,
        call_id: Option<CallId>,
        /// Settings replaced by a set-params command
        previous: Option<Params>,
    },

    /// A command was rejected, synchronously or by its protocol handler
    CommandError {
        reason: String,
        command: Option<MessageType>,
        command_id: Option<MessageId>,
    },

    IncomingCall {
        call_id: CallId,
        protocol: Prefix,
        party_a: String,
        party_b: String,
    },

    CallStateChanged { call_id: CallId, state: CallState },

    CallCleared { call_id: CallId, reason: String },

    UserInput { call_id: CallId, input: String },

    MediaStream {
        call_id: CallId,
        media: MediaKind,
        state: MediaState,
    },

    RegistrationStatus {
        protocol: Prefix,
        identifier: String,
        status: RegistrationStatus,
    },

    MessageWaiting {
        party: String,
        package: String,
        new_messages: u32,
        old_messages: u32,
    },

    LineAppearance {
        line: String,
        package: String,
        state: LineState,
    },
}

impl Event {
    /// Build the error event for a rejected command
    pub fn rejected(error: &CommandError, command: Option<&Message>) -> Self {
        Event::CommandError {
            reason: error.to_string(),
            command: command.map(|m| m.tag().clone()),
            command_id: command.map(Message::id),
        }
    }

    pub fn message_type(&self) -> MessageType {
        match self {
            Event::CommandAck { .. } => MessageType::CommandAck,
            Event::CommandError { .. } => MessageType::CommandError,
            Event::IncomingCall { .. } => MessageType::IncomingCall,
            Event::CallStateChanged { .. } => MessageType::CallStateChanged,
            Event::CallCleared { .. } => MessageType::CallCleared,
            Event::UserInput { .. } => MessageType::UserInput,
            Event::MediaStream { .. } => MessageType::MediaStreamState,
            Event::RegistrationStatus { .. } => MessageType::RegistrationStatus,
            Event::MessageWaiting { .. } => MessageType::MessageWaiting,
            Event::LineAppearance { .. } => MessageType::LineAppearance,
        }
    }

    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            Event::CommandAck { call_id, .. } => call_id.as_ref(),
            Event::IncomingCall { call_id, .. }
            | Event::CallStateChanged { call_id, .. }
            | Event::CallCleared { call_id, .. }
            | Event::UserInput { call_id, .. }
            | Event::MediaStream { call_id, .. } => Some(call_id),
            _ => None,
        }
    }

    /// Encode into a tagged event message
    pub fn into_message(self) -> Message {
        let tag = self.message_type();
        let params = match self {
            Event::CommandAck {
                command,
                command_id,
                call_id,
                previous,
            } => {
                let mut params = params! {
                    "command" => command.as_str(),
                    "command-id" => command_id.0,
                };
                insert_opt(&mut params, "call-id", call_id.map(|c| c.to_string()));
                if let Some(previous) = previous {
                    params.insert("previous".to_string(), Value::Fields(previous));
                }
                params
            }
            Event::CommandError {
                reason,
                command,
                command_id,
            } => {
                let mut params = params! { "reason" => reason };
                insert_opt(&mut params, "command", command.map(|c| c.to_string()));
                if let Some(id) = command_id {
                    params.insert("command-id".to_string(), Value::from(id.0));
                }
                params
            }
            Event::IncomingCall {
                call_id,
                protocol,
                party_a,
                party_b,
            } => params! {
                "call-id" => call_id.as_str(),
                "protocol" => protocol.as_str(),
                "party-a" => party_a,
                "party-b" => party_b,
            },
            Event::CallStateChanged { call_id, state } => params! {
                "call-id" => call_id.as_str(),
                "state" => state.as_str(),
            },
            Event::CallCleared { call_id, reason } => params! {
                "call-id" => call_id.as_str(),
                "reason" => reason,
            },
            Event::UserInput { call_id, input } => params! {
                "call-id" => call_id.as_str(),
                "user-input" => input,
            },
            Event::MediaStream {
                call_id,
                media,
                state,
            } => params! {
                "call-id" => call_id.as_str(),
                "media" => media.as_str(),
                "state" => state.as_str(),
            },
            Event::RegistrationStatus {
                protocol,
                identifier,
                status,
            } => params! {
                "protocol" => protocol.as_str(),
                "identifier" => identifier,
                "status" => status.as_str(),
            },
            Event::MessageWaiting {
                party,
                package,
                new_messages,
                old_messages,
            } => params! {
                "party" => party,
                "package" => package,
                "new-messages" => new_messages,
                "old-messages" => old_messages,
            },
            Event::LineAppearance {
                line,
                package,
                state,
            } => params! {
                "line" => line,
                "package" => package,
                "state" => state.as_str(),
            },
        };
        Message::event(tag, params)
    }

    /// Decode an event message
    pub fn decode(message: &Message) -> Result<Event> {
        if !message.is_event() {
            return Err(SwitchboardError::Protocol(format!(
                "message '{}' is not an event",
                message.tag()
            )));
        }
        decode_params(message.tag(), message.params())
            .map_err(|e| SwitchboardError::Protocol(format!("bad '{}' event: {}", message.tag(), e)))
    }
}

fn decode_params(tag: &MessageType, params: &Params) -> std::result::Result<Event, CommandError> {
    let call_id = || required_text(params, "call-id").map(CallId::from);
    let command_id = || -> std::result::Result<Option<MessageId>, CommandError> {
        optional_integer(params, "command-id")?
            .map(|n| in_range(n, "command-id").map(MessageId))
            .transpose()
    };

    let event = match tag {
        MessageType::CommandAck => Event::CommandAck {
            command: MessageType::from_tag(required_text(params, "command")?),
            command_id: command_id()?.ok_or(CommandError::MissingParameter("command-id"))?,
            call_id: optional_text(params, "call-id")?.map(CallId::from),
            previous: params.get("previous").and_then(Value::as_fields).cloned(),
        },
        MessageType::CommandError => Event::CommandError {
            reason: required_text(params, "reason")?.to_string(),
            command: optional_text(params, "command")?.map(MessageType::from_tag),
            command_id: command_id()?,
        },
        MessageType::IncomingCall => Event::IncomingCall {
            call_id: call_id()?,
            protocol: required_parsed(params, "protocol")?,
            party_a: required_text(params, "party-a")?.to_string(),
            party_b: required_text(params, "party-b")?.to_string(),
        },
        MessageType::CallStateChanged => Event::CallStateChanged {
            call_id: call_id()?,
            state: required_parsed(params, "state")?,
        },
        MessageType::CallCleared => Event::CallCleared {
            call_id: call_id()?,
            reason: required_text(params, "reason")?.to_string(),
        },
        MessageType::UserInput => Event::UserInput {
            call_id: call_id()?,
            input: required_text(params, "user-input")?.to_string(),
        },
        MessageType::MediaStreamState => Event::MediaStream {
            call_id: call_id()?,
            media: required_parsed(params, "media")?,
            state: required_parsed(params, "state")?,
        },
        MessageType::RegistrationStatus => Event::RegistrationStatus {
            protocol: required_parsed(params, "protocol")?,
            identifier: required_text(params, "identifier")?.to_string(),
            status: required_parsed(params, "status")?,
        },
        MessageType::MessageWaiting => Event::MessageWaiting {
            party: required_text(params, "party")?.to_string(),
            package: required_text(params, "package")?.to_string(),
            new_messages: in_range(required_integer(params, "new-messages")?, "new-messages")?,
            old_messages: in_range(required_integer(params, "old-messages")?, "old-messages")?,
        },
        MessageType::LineAppearance => Event::LineAppearance {
            line: required_text(params, "line")?.to_string(),
            package: required_text(params, "package")?.to_string(),
            state: required_parsed(params, "state")?,
        },
        other => return Err(CommandError::UnknownType(other.to_string())),
    };
    Ok(event)
}

fn in_range<T: TryFrom<i64>>(n: i64, name: &str) -> std::result::Result<T, CommandError> {
    T::try_from(n).map_err(|_| CommandError::InvalidParameter {
        name: name.to_string(),
        reason: format!("{} is out of range", n),
    })
}
