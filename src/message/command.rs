//! Command definitions
//!
//! Typed view of controller-to-engine messages.

use crate::constants::Prefix;
use crate::error::CommandError;
use crate::params;

use super::{
    optional_integer, optional_text, required_parsed, required_text, CallId, Message,
    MessageType, Params, Value,
};

keyword_enum! {
    /// Media type of a stream
    MediaKind { Audio => "audio", Video => "video" }
}

keyword_enum! {
    /// Requested change to a media stream
    MediaAction { Open => "open", Close => "close", Pause => "pause", Resume => "resume" }
}

/// Keys accepted by `set-general-params`
pub const GENERAL_PARAM_KEYS: [&str; 8] = [
    "auto-rx-media",
    "auto-tx-media",
    "stun-server",
    "rtp-port-base",
    "rtp-port-max",
    "jitter-min",
    "jitter-max",
    "silence-detection",
];

/// Keys accepted by `set-protocol-params` besides `protocol`
pub const PROTOCOL_PARAM_KEYS: [&str; 3] = ["user-name", "display-name", "interface"];

/// Registration lifetime when `time-to-live` is omitted (seconds)
pub const DEFAULT_REGISTRATION_TTL: u32 = 300;

/// A decoded command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Change engine-wide settings
    SetGeneralParams { settings: Params },

    /// Change settings of one protocol handler
    SetProtocolParams { protocol: Prefix, settings: Params },

    /// Register (or unregister, TTL 0) an address of record
    Registration {
        protocol: Prefix,
        identifier: String,
        host: Option<String>,
        password: Option<String>,
        time_to_live: u32,
        event_package: Option<String>,
    },

    /// Place an outgoing call
    CallSetup {
        party_a: Option<String>,
        party_b: String,
    },

    /// Answer an incoming call leg
    CallAnswer { call_id: CallId },

    /// Hang up
    CallClear {
        call_id: CallId,
        reason: Option<String>,
    },

    /// Send DTMF / user input on a connected call
    SendUserInput { call_id: CallId, input: String },

    CallHold { call_id: CallId },

    CallRetrieve { call_id: CallId },

    /// Open, close, pause or resume a media stream
    MediaStream {
        call_id: CallId,
        media: MediaKind,
        action: MediaAction,
    },
}

impl Command {
    /// Get the type tag
    pub fn message_type(&self) -> MessageType {
        match self {
            Command::SetGeneralParams { .. } => MessageType::SetGeneralParams,
            Command::SetProtocolParams { .. } => MessageType::SetProtocolParams,
            Command::Registration { .. } => MessageType::Registration,
            Command::CallSetup { .. } => MessageType::CallSetup,
            Command::CallAnswer { .. } => MessageType::CallAnswer,
            Command::CallClear { .. } => MessageType::CallClear,
            Command::SendUserInput { .. } => MessageType::SendUserInput,
            Command::CallHold { .. } => MessageType::CallHold,
            Command::CallRetrieve { .. } => MessageType::CallRetrieve,
            Command::MediaStream { .. } => MessageType::MediaStream,
        }
    }

    /// The call this command targets, for call-scoped commands
    pub fn call_id(&self) -> Option<&CallId> {
        match self {
            Command::CallAnswer { call_id }
            | Command::CallClear { call_id, .. }
            | Command::SendUserInput { call_id, .. }
            | Command::CallHold { call_id }
            | Command::CallRetrieve { call_id }
            | Command::MediaStream { call_id, .. } => Some(call_id),
            _ => None,
        }
    }

    /// Decode a tagged message into a command
    pub fn decode(message: &Message) -> Result<Command, CommandError> {
        let tag = message.tag();
        if let MessageType::Unknown(name) = tag {
            return Err(CommandError::UnknownType(name.clone()));
        }
        if message.is_event() || !tag.is_command() {
            return Err(CommandError::NotACommand(tag.to_string()));
        }

        let params = message.params();
        let command = match tag {
            MessageType::SetGeneralParams => {
                check_keys(params, &GENERAL_PARAM_KEYS, "general")?;
                Command::SetGeneralParams {
                    settings: params.clone(),
                }
            }
            MessageType::SetProtocolParams => {
                let protocol = required_parsed(params, "protocol")?;
                let mut settings = params.clone();
                settings.remove("protocol");
                check_keys(&settings, &PROTOCOL_PARAM_KEYS, "protocol")?;
                for key in settings.keys() {
                    if settings[key].as_text().is_none() {
                        return Err(CommandError::InvalidParameter {
                            name: key.clone(),
                            reason: "expected text".to_string(),
                        });
                    }
                }
                Command::SetProtocolParams { protocol, settings }
            }
            MessageType::Registration => {
                let ttl = optional_integer(params, "time-to-live")?
                    .unwrap_or(i64::from(DEFAULT_REGISTRATION_TTL));
                let time_to_live = u32::try_from(ttl).map_err(|_| CommandError::InvalidParameter {
                    name: "time-to-live".to_string(),
                    reason: format!("{} is out of range", ttl),
                })?;
                Command::Registration {
                    protocol: required_parsed(params, "protocol")?,
                    identifier: non_empty(params, "identifier")?,
                    host: optional_text(params, "host")?.map(str::to_string),
                    password: optional_text(params, "password")?.map(str::to_string),
                    time_to_live,
                    event_package: optional_text(params, "event-package")?.map(str::to_string),
                }
            }
            MessageType::CallSetup => Command::CallSetup {
                party_a: optional_text(params, "party-a")?.map(str::to_string),
                party_b: non_empty(params, "party-b")?,
            },
            MessageType::CallAnswer => Command::CallAnswer {
                call_id: call_id(params)?,
            },
            MessageType::CallClear => Command::CallClear {
                call_id: call_id(params)?,
                reason: optional_text(params, "reason")?.map(str::to_string),
            },
            MessageType::SendUserInput => Command::SendUserInput {
                call_id: call_id(params)?,
                input: non_empty(params, "user-input")?,
            },
            MessageType::CallHold => Command::CallHold {
                call_id: call_id(params)?,
            },
            MessageType::CallRetrieve => Command::CallRetrieve {
                call_id: call_id(params)?,
            },
            MessageType::MediaStream => Command::MediaStream {
                call_id: call_id(params)?,
                media: match params.get("media") {
                    None => MediaKind::Audio,
                    Some(_) => required_parsed(params, "media")?,
                },
                action: required_parsed(params, "state")?,
            },
            other => return Err(CommandError::NotACommand(other.to_string())),
        };

        Ok(command)
    }

    /// Encode into a tagged command message
    pub fn into_message(self) -> Message {
        let tag = self.message_type();
        let params = match self {
            Command::SetGeneralParams { settings } => settings,
            Command::SetProtocolParams { protocol, mut settings } => {
                settings.insert("protocol".to_string(), Value::from(protocol.as_str()));
                settings
            }
            Command::Registration {
                protocol,
                identifier,
                host,
                password,
                time_to_live,
                event_package,
            } => {
                let mut params = params! {
                    "protocol" => protocol.as_str(),
                    "identifier" => identifier,
                    "time-to-live" => time_to_live,
                };
                insert_opt(&mut params, "host", host);
                insert_opt(&mut params, "password", password);
                insert_opt(&mut params, "event-package", event_package);
                params
            }
            Command::CallSetup { party_a, party_b } => {
                let mut params = params! { "party-b" => party_b };
                insert_opt(&mut params, "party-a", party_a);
                params
            }
            Command::CallAnswer { call_id }
            | Command::CallHold { call_id }
            | Command::CallRetrieve { call_id } => params! { "call-id" => call_id.as_str() },
            Command::CallClear { call_id, reason } => {
                let mut params = params! { "call-id" => call_id.as_str() };
                insert_opt(&mut params, "reason", reason);
                params
            }
            Command::SendUserInput { call_id, input } => params! {
                "call-id" => call_id.as_str(),
                "user-input" => input,
            },
            Command::MediaStream {
                call_id,
                media,
                action,
            } => params! {
                "call-id" => call_id.as_str(),
                "media" => media.as_str(),
                "state" => action.as_str(),
            },
        };
        Message::command(tag, params)
    }
}

fn call_id(params: &Params) -> Result<CallId, CommandError> {
    Ok(CallId::from(required_text(params, "call-id")?))
}

fn non_empty(params: &Params, name: &'static str) -> Result<String, CommandError> {
    let text = required_text(params, name)?.trim();
    if text.is_empty() {
        return Err(CommandError::InvalidParameter {
            name: name.to_string(),
            reason: "must not be empty".to_string(),
        });
    }
    Ok(text.to_string())
}

fn check_keys(params: &Params, allowed: &[&str], scope: &str) -> Result<(), CommandError> {
    match params.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(key) => Err(CommandError::InvalidParameter {
            name: key.clone(),
            reason: format!("not a {} parameter", scope),
        }),
        None => Ok(()),
    }
}

pub(crate) fn insert_opt(params: &mut Params, name: &str, value: Option<String>) {
    if let Some(value) = value {
        params.insert(name.to_string(), Value::Text(value));
    }
}
