//! Session Module
//!
//! One initialised instance of the engine: the controller's handle.
//!
//! ## Responsibilities
//! - Negotiate the API version
//! - Own the event queue and the protocol workers
//! - Enforce the lifecycle (`Running` is the only state that accepts work)
//! - Release every pending message on shutdown

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Config;
use crate::constants::{Prefix, API_VERSION, MINIMUM_API_VERSION};
use crate::error::{InitError, Result, StateError};
use crate::message::Message;
use crate::queue::{EventQueue, EventSink, Pop, Timeout};
use crate::router::CommandRouter;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialised,
    Running,
    ShuttingDown,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Uninitialised => "Uninitialised",
            SessionState::Running => "Running",
            SessionState::ShuttingDown => "ShuttingDown",
            SessionState::Closed => "Closed",
        };
        f.write_str(name)
    }
}

/// Handle to a running engine instance
///
/// ## Concurrency Model
///
/// - `send_message` may run on any thread, concurrently with `get_message`
/// - `get_message` has a single consumer; `consumer` turns a second
///   concurrent caller into a `StateError` instead of a race
/// - The queue is the only data shared with protocol workers
///
/// Dropping a running session shuts it down.
pub struct Session {
    api_version: u32,
    config: Config,
    state: Mutex<SessionState>,
    queue: Arc<EventQueue>,
    router: Mutex<CommandRouter>,
    consumer: Mutex<()>,
}

impl Session {
    /// Initialise a session from an options string
    ///
    /// The negotiated version is `min(requested_version, API_VERSION)`.
    pub fn initialise(requested_version: u32, options: &str) -> Result<Self> {
        let config = Config::from_options(options)?;
        Self::open(requested_version, config)
    }

    /// Initialise a session from a built config
    pub fn open(requested_version: u32, config: Config) -> Result<Self> {
        if requested_version < MINIMUM_API_VERSION {
            return Err(InitError::UnsupportedVersion {
                requested: requested_version,
                minimum: MINIMUM_API_VERSION,
            }
            .into());
        }
        config.validate()?;

        let api_version = requested_version.min(API_VERSION);
        let queue = Arc::new(EventQueue::new(config.queue_warn_depth));
        let router = CommandRouter::start(&config, api_version, &EventSink::new(Arc::clone(&queue)))?;

        tracing::info!(
            "Session initialised: api_version={} (requested {}), protocols={:?}",
            api_version,
            requested_version,
            router.protocols()
        );

        Ok(Self {
            api_version,
            config,
            state: Mutex::new(SessionState::Running),
            queue,
            router: Mutex::new(router),
            consumer: Mutex::new(()),
        })
    }

    /// Wait up to `timeout` for the next event
    ///
    /// Returns `Ok(None)` when the timeout expires.
    pub fn get_message(&self, timeout: Timeout) -> Result<Option<Message>> {
        self.ensure_running()?;
        let _consumer = self
            .consumer
            .try_lock()
            .ok_or(StateError::ConcurrentConsumer)?;

        match self.queue.pop(timeout) {
            Pop::Message(message) => {
                self.router.lock().observe(&message);
                tracing::trace!("Delivering {} {}", message.id(), message.tag());
                Ok(Some(message))
            }
            Pop::TimedOut => Ok(None),
            Pop::Closed => Err(StateError::NotRunning(self.state()).into()),
        }
    }

    /// Submit a command and return its immediate response
    ///
    /// The response is a `command-ack` or a `command-error` event; the
    /// protocol outcome follows through `get_message`.
    pub fn send_message(&self, command: &Message) -> Result<Message> {
        self.ensure_running()?;
        tracing::trace!("Received {} {}", command.id(), command.tag());

        let reply = self.router.lock().route(command);
        Ok(reply.into_message())
    }

    /// Stop workers, release pending messages and close the session
    ///
    /// Only valid while `Running`.
    pub fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != SessionState::Running {
                return Err(StateError::NotRunning(*state).into());
            }
            *state = SessionState::ShuttingDown;
        }
        tracing::debug!("Session shutting down");

        // Close first: wakes a blocked consumer and discards late events
        self.queue.close();
        let stopped = self.router.lock().stop();

        let pending = self.queue.drain();
        let released = pending.len();
        for message in pending {
            message.release();
        }

        *self.state.lock() = SessionState::Closed;
        tracing::info!("Session closed, {} pending messages released", released);
        stopped
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// The negotiated API version
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Number of events waiting in the queue
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Protocols with a running handler
    pub fn protocols(&self) -> Vec<Prefix> {
        self.router.lock().protocols()
    }

    /// Calls currently known to the router
    pub fn active_calls(&self) -> usize {
        self.router.lock().call_count()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn ensure_running(&self) -> Result<()> {
        match self.state() {
            SessionState::Running => Ok(()),
            state => Err(StateError::NotRunning(state).into()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.state() == SessionState::Running {
            if let Err(e) = self.shutdown() {
                tracing::error!("Shutdown on drop failed: {}", e);
            }
        }
    }
}
