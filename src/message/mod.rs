//! Message Module
//!
//! The tagged data unit exchanged with a session.
//!
//! ## Representation
//! Every message is a type tag plus named parameters:
//! ```text
//! ┌──────────┬──────────┬──────────────┬──────────────────────────────┐
//! │ Id (u64) │   Kind   │  Type tag    │ Params: key -> Value         │
//! └──────────┴──────────┴──────────────┴──────────────────────────────┘
//! ```
//! `Command` and `Event` are the typed views. The router decodes inbound
//! commands into the closed `Command` sum; the engine builds `Event`s and
//! encodes them into messages for delivery.
//!
//! ## Ownership
//! `Message` is not `Clone`. A message sits in exactly one
//! queue, and dequeueing moves it to the caller, who releases it with
//! [`Message::release`] or by dropping it.

/// Small enums carried as kebab-case text parameters
macro_rules! keyword_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = ();

            fn from_str(s: &str) -> ::std::result::Result<Self, ()> {
                match s {
                    $($text => Ok($name::$variant),)+
                    _ => Err(()),
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

mod types;
mod value;
mod command;
mod event;

pub use types::{MessageKind, MessageType, LINE_APPEARANCE_SINCE_VERSION};
pub use value::{Params, Value};
pub use command::{Command, MediaAction, MediaKind};
pub use event::{CallState, Event, LineState, MediaState, RegistrationStatus};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::error::CommandError;

static NEXT_MESSAGE_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CALL_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique message identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MessageId(pub u64);

impl MessageId {
    fn next() -> Self {
        MessageId(NEXT_MESSAGE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Token naming one call leg
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallId(String);

impl CallId {
    /// Allocate a fresh call id ("call-<n>")
    pub fn next() -> Self {
        CallId(format!("call-{}", NEXT_CALL_ID.fetch_add(1, Ordering::Relaxed)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for CallId {
    fn from(s: &str) -> Self {
        CallId(s.to_string())
    }
}

impl From<String> for CallId {
    fn from(s: String) -> Self {
        CallId(s)
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A command or event travelling through a session
#[derive(Debug, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    kind: MessageKind,
    tag: MessageType,
    params: Params,
}

impl Message {
    fn new(kind: MessageKind, tag: MessageType, params: Params) -> Self {
        Self {
            id: MessageId::next(),
            kind,
            tag,
            params,
        }
    }

    /// Build a command message from a type tag and parameters.
    ///
    /// The tag is not validated here; unknown tags are carried to the
    /// router, which answers them with a `command-error` event.
    pub fn command(tag: impl Into<MessageType>, params: Params) -> Self {
        Self::new(MessageKind::Command, tag.into(), params)
    }

    pub(crate) fn event(tag: MessageType, params: Params) -> Self {
        Self::new(MessageKind::Event, tag, params)
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn tag(&self) -> &MessageType {
        &self.tag
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }

    /// Text parameter, if present and textual
    pub fn text(&self, name: &str) -> Option<&str> {
        self.params.get(name).and_then(Value::as_text)
    }

    /// Integer parameter; textual digits are accepted too
    pub fn integer(&self, name: &str) -> Option<i64> {
        self.params.get(name).and_then(Value::as_integer)
    }

    /// The `call-id` parameter, if this message concerns a call
    pub fn call_id(&self) -> Option<CallId> {
        self.text("call-id").map(CallId::from)
    }

    pub fn is_command(&self) -> bool {
        self.kind == MessageKind::Command
    }

    pub fn is_event(&self) -> bool {
        self.kind == MessageKind::Event
    }

    /// True for `command-error` events
    pub fn is_error(&self) -> bool {
        self.tag == MessageType::CommandError
    }

    /// Typed view of an event message
    pub fn to_event(&self) -> crate::error::Result<Event> {
        Event::decode(self)
    }

    /// Release the message. Ownership makes double release impossible.
    pub fn release(self) {
        tracing::trace!("Released message {} ({})", self.id, self.tag);
    }
}

// =============================================================================
// Parameter Helpers
// =============================================================================

pub(crate) fn required_text<'a>(
    params: &'a Params,
    name: &'static str,
) -> std::result::Result<&'a str, CommandError> {
    match params.get(name) {
        None => Err(CommandError::MissingParameter(name)),
        Some(value) => value.as_text().ok_or_else(|| CommandError::InvalidParameter {
            name: name.to_string(),
            reason: "expected text".to_string(),
        }),
    }
}

pub(crate) fn optional_text<'a>(
    params: &'a Params,
    name: &'static str,
) -> std::result::Result<Option<&'a str>, CommandError> {
    match params.get(name) {
        None => Ok(None),
        Some(_) => required_text(params, name).map(Some),
    }
}

pub(crate) fn optional_integer(
    params: &Params,
    name: &'static str,
) -> std::result::Result<Option<i64>, CommandError> {
    match params.get(name) {
        None => Ok(None),
        Some(value) => value
            .as_integer()
            .map(Some)
            .ok_or_else(|| CommandError::InvalidParameter {
                name: name.to_string(),
                reason: "expected integer".to_string(),
            }),
    }
}

pub(crate) fn required_integer(
    params: &Params,
    name: &'static str,
) -> std::result::Result<i64, CommandError> {
    optional_integer(params, name)?.ok_or(CommandError::MissingParameter(name))
}

/// Parse a text parameter through `FromStr`
pub(crate) fn required_parsed<T: std::str::FromStr>(
    params: &Params,
    name: &'static str,
) -> std::result::Result<T, CommandError> {
    let text = required_text(params, name)?;
    text.parse().map_err(|_| CommandError::InvalidParameter {
        name: name.to_string(),
        reason: format!("unrecognized value '{}'", text),
    })
}
