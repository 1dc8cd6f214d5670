//! Protocol handler seam
//!
//! A handler owns the call legs of one protocol and turns routed jobs into
//! events. Each handler runs on its own worker thread, so nothing in here
//! needs locking.

use std::collections::HashMap;

use crate::constants::Prefix;
use crate::error::CommandError;
use crate::message::{CallId, CallState, Command, Event, MediaAction, MediaKind, MediaState, MessageId};
use crate::queue::EventSink;

/// A routed command, ready for its handler
#[derive(Debug, Clone)]
pub struct Job {
    /// Id of the command message, echoed on asynchronous errors
    pub command_id: MessageId,

    pub command: Command,

    /// Call id allocated by the router for `call-setup`
    pub call_id: Option<CallId>,
}

/// Implemented once per protocol family.
///
/// An `Err` is reported to the controller as a `command-error` event
/// carrying the job's command id.
pub trait ProtocolHandler: Send {
    fn prefix(&self) -> Prefix;

    fn handle(&mut self, job: Job, sink: &EventSink) -> Result<(), CommandError>;
}

/// Reason reported when the controller clears a call without giving one
pub const LOCAL_CLEAR_REASON: &str = "cleared by local user";

/// Reason reported on the peer leg of a cleared loopback call
pub const REMOTE_CLEAR_REASON: &str = "remote party cleared";

/// One side of a call
#[derive(Debug, Clone)]
pub struct Leg {
    pub state: CallState,
    pub incoming: bool,
    /// The other leg when both live in this session
    pub peer: Option<CallId>,
    pub media: HashMap<MediaKind, MediaState>,
}

impl Leg {
    pub fn outgoing() -> Self {
        Self {
            state: CallState::Proceeding,
            incoming: false,
            peer: None,
            media: HashMap::new(),
        }
    }

    pub fn incoming(peer: CallId) -> Self {
        Self {
            state: CallState::Alerting,
            incoming: true,
            peer: Some(peer),
            media: HashMap::new(),
        }
    }
}

/// Call legs owned by a handler, with the transitions every family shares
#[derive(Debug, Default)]
pub struct Legs {
    legs: HashMap<CallId, Leg>,
}

impl Legs {
    pub fn insert(&mut self, call_id: CallId, leg: Leg) {
        self.legs.insert(call_id, leg);
    }

    pub fn get(&self, call_id: &CallId) -> Result<&Leg, CommandError> {
        self.legs
            .get(call_id)
            .ok_or_else(|| CommandError::UnknownCall(call_id.to_string()))
    }

    pub fn remove(&mut self, call_id: &CallId) -> Result<Leg, CommandError> {
        self.legs
            .remove(call_id)
            .ok_or_else(|| CommandError::UnknownCall(call_id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Fail unless the leg is in `expected`
    pub fn require(
        &self,
        call_id: &CallId,
        expected: &[CallState],
        action: &'static str,
    ) -> Result<&Leg, CommandError> {
        let leg = self.get(call_id)?;
        if expected.contains(&leg.state) {
            Ok(leg)
        } else {
            Err(CommandError::InvalidCallState {
                call_id: call_id.to_string(),
                state: leg.state.to_string(),
                action,
            })
        }
    }

    /// Move a leg to `state` and report it
    pub fn transition(&mut self, call_id: &CallId, state: CallState, sink: &EventSink) {
        if let Some(leg) = self.legs.get_mut(call_id) {
            leg.state = state;
            sink.emit(Event::CallStateChanged {
                call_id: call_id.clone(),
                state,
            });
        }
    }

    /// Connect a leg and open its audio stream
    pub fn connect(&mut self, call_id: &CallId, sink: &EventSink) {
        self.transition(call_id, CallState::Connected, sink);
        if let Some(leg) = self.legs.get_mut(call_id) {
            leg.media.insert(MediaKind::Audio, MediaState::Open);
            sink.emit(Event::MediaStream {
                call_id: call_id.clone(),
                media: MediaKind::Audio,
                state: MediaState::Open,
            });
        }
    }

    pub fn hold(&mut self, call_id: &CallId, sink: &EventSink) -> Result<(), CommandError> {
        self.require(call_id, &[CallState::Connected], "hold")?;
        self.transition(call_id, CallState::Held, sink);
        Ok(())
    }

    pub fn retrieve(&mut self, call_id: &CallId, sink: &EventSink) -> Result<(), CommandError> {
        self.require(call_id, &[CallState::Held], "retrieve")?;
        self.transition(call_id, CallState::Connected, sink);
        Ok(())
    }

    /// Apply a media stream change.
    ///
    /// Open, pause and resume need a connected call; close is also allowed
    /// while held.
    pub fn media(
        &mut self,
        call_id: &CallId,
        media: MediaKind,
        action: MediaAction,
        sink: &EventSink,
    ) -> Result<(), CommandError> {
        let allowed: &[CallState] = match action {
            MediaAction::Close => &[CallState::Connected, CallState::Held],
            _ => &[CallState::Connected],
        };
        self.require(call_id, allowed, "change media")?;

        let current = self
            .legs
            .get(call_id)
            .and_then(|leg| leg.media.get(&media).copied())
            .unwrap_or(MediaState::Closed);

        let next = match (action, current) {
            (MediaAction::Open, MediaState::Closed) => MediaState::Open,
            (MediaAction::Close, MediaState::Open | MediaState::Paused) => MediaState::Closed,
            (MediaAction::Pause, MediaState::Open) => MediaState::Paused,
            (MediaAction::Resume, MediaState::Paused) => MediaState::Open,
            (action, current) => {
                return Err(CommandError::Rejected(format!(
                    "cannot {} {} stream that is {}",
                    action, media, current
                )))
            }
        };

        if let Some(leg) = self.legs.get_mut(call_id) {
            leg.media.insert(media, next);
        }
        sink.emit(Event::MediaStream {
            call_id: call_id.clone(),
            media,
            state: next,
        });
        Ok(())
    }
}

/// Reject a command the router should never have sent to this handler
pub(crate) fn misrouted(prefix: Prefix, command: &Command) -> CommandError {
    CommandError::Rejected(format!(
        "'{}' is not handled by the {} endpoint",
        command.message_type(),
        prefix
    ))
}
