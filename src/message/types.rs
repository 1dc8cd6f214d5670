//! Message type tags

use std::fmt;

use serde::{Deserialize, Serialize};

/// Direction of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MessageKind {
    /// Controller to engine
    Command = 0x01,
    /// Engine to controller
    Event = 0x02,
}

/// The closed vocabulary of message type tags
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------
    SetGeneralParams,
    SetProtocolParams,
    Registration,
    CallSetup,
    CallAnswer,
    CallClear,
    SendUserInput,
    CallHold,
    CallRetrieve,
    MediaStream,

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------
    CommandAck,
    CommandError,
    IncomingCall,
    CallStateChanged,
    CallCleared,
    UserInput,
    MediaStreamState,
    RegistrationStatus,
    MessageWaiting,
    LineAppearance,

    /// A tag outside the vocabulary, kept verbatim
    Unknown(String),
}

impl MessageType {
    /// Every known tag
    pub const KNOWN: [MessageType; 20] = [
        MessageType::SetGeneralParams,
        MessageType::SetProtocolParams,
        MessageType::Registration,
        MessageType::CallSetup,
        MessageType::CallAnswer,
        MessageType::CallClear,
        MessageType::SendUserInput,
        MessageType::CallHold,
        MessageType::CallRetrieve,
        MessageType::MediaStream,
        MessageType::CommandAck,
        MessageType::CommandError,
        MessageType::IncomingCall,
        MessageType::CallStateChanged,
        MessageType::CallCleared,
        MessageType::UserInput,
        MessageType::MediaStreamState,
        MessageType::RegistrationStatus,
        MessageType::MessageWaiting,
        MessageType::LineAppearance,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            MessageType::SetGeneralParams => "set-general-params",
            MessageType::SetProtocolParams => "set-protocol-params",
            MessageType::Registration => "registration",
            MessageType::CallSetup => "call-setup",
            MessageType::CallAnswer => "call-answer",
            MessageType::CallClear => "call-clear",
            MessageType::SendUserInput => "send-user-input",
            MessageType::CallHold => "call-hold",
            MessageType::CallRetrieve => "call-retrieve",
            MessageType::MediaStream => "media-stream",
            MessageType::CommandAck => "command-ack",
            MessageType::CommandError => "command-error",
            MessageType::IncomingCall => "incoming-call",
            MessageType::CallStateChanged => "call-state-changed",
            MessageType::CallCleared => "call-cleared",
            MessageType::UserInput => "user-input",
            MessageType::MediaStreamState => "media-stream-state",
            MessageType::RegistrationStatus => "registration-status",
            MessageType::MessageWaiting => "message-waiting",
            MessageType::LineAppearance => "line-appearance",
            MessageType::Unknown(tag) => tag,
        }
    }

    /// Resolve a tag string; never fails
    pub fn from_tag(tag: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|t| t.as_str() == tag)
            .cloned()
            .unwrap_or_else(|| MessageType::Unknown(tag.to_string()))
    }

    pub fn is_command(&self) -> bool {
        self.since_version().is_some()
    }

    /// First API version in which a command is available (`None` for events)
    pub fn since_version(&self) -> Option<u32> {
        match self {
            MessageType::SetGeneralParams
            | MessageType::SetProtocolParams
            | MessageType::Registration
            | MessageType::CallSetup
            | MessageType::CallAnswer
            | MessageType::CallClear
            | MessageType::SendUserInput => Some(1),
            MessageType::CallHold | MessageType::CallRetrieve => Some(10),
            MessageType::MediaStream => Some(18),
            _ => None,
        }
    }
}

/// API version required to register for line appearance
pub const LINE_APPEARANCE_SINCE_VERSION: u32 = 22;

impl From<&str> for MessageType {
    fn from(tag: &str) -> Self {
        MessageType::from_tag(tag)
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
