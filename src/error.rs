//! Error types for Switchboard
//!
//! Provides a unified error type for all operations, plus the three
//! domain taxonomies callers match on: initialisation, lifecycle state,
//! and command rejection.

use thiserror::Error;

use crate::session::SessionState;

/// Result type alias using SwitchboardError
pub type Result<T> = std::result::Result<T, SwitchboardError>;

/// Unified error type for Switchboard operations
#[derive(Debug, Error)]
pub enum SwitchboardError {
    // -------------------------------------------------------------------------
    // Session Errors
    // -------------------------------------------------------------------------
    #[error("Initialisation failed: {0}")]
    Init(#[from] InitError),

    #[error("Invalid session state: {0}")]
    State(#[from] StateError),

    #[error("Command rejected: {0}")]
    Command(#[from] CommandError),

    #[error("Protocol worker failure: {0}")]
    Worker(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Network Errors
    // -------------------------------------------------------------------------
    #[error("Network error: {0}")]
    Network(String),

    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Failures while creating a session. A failed `initialise` never yields a
/// partial session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InitError {
    #[error("API version {requested} is below the minimum supported version {minimum}")]
    UnsupportedVersion { requested: u32, minimum: u32 },

    #[error("bad options: {0}")]
    BadOptions(String),

    #[error("resource exhaustion: {0}")]
    Resources(String),
}

/// Operation invalid for the current session lifecycle state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("session is {0}, operation requires Running")]
    NotRunning(SessionState),

    #[error("another thread is already waiting in get_message")]
    ConcurrentConsumer,
}

/// Reasons a command is rejected. These travel to the controller inside a
/// `command-error` event rather than as an `Err`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("unknown message type '{0}'")]
    UnknownType(String),

    #[error("message '{0}' is not a command")]
    NotACommand(String),

    #[error("missing parameter '{0}'")]
    MissingParameter(&'static str),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("'{command}' requires API version {since}, session negotiated {negotiated}")]
    UnsupportedInVersion {
        command: String,
        since: u32,
        negotiated: u32,
    },

    #[error("no endpoint for protocol '{0}'")]
    NoEndpoint(String),

    #[error("unknown call '{0}'")]
    UnknownCall(String),

    #[error("call '{call_id}' is {state}, cannot {action}")]
    InvalidCallState {
        call_id: String,
        state: String,
        action: &'static str,
    },

    #[error("{0}")]
    Rejected(String),
}

impl From<bincode::Error> for SwitchboardError {
    fn from(e: bincode::Error) -> Self {
        SwitchboardError::Serialization(e.to_string())
    }
}
