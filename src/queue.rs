//! Event Queue
//!
//! Thread-safe, blocking-with-timeout queue connecting protocol workers
//! (producers) to the controller (single consumer).
//!
//! ## Concurrency
//! - `state`: one `parking_lot::Mutex` guards the message deque and the
//!   closed flag together, so a close can never slip between a consumer's
//!   emptiness check and its wait.
//! - `available`: `Condvar` signalled once per push and broadcast on close.
//! - Timed waits run against a fixed deadline; spurious wakeups re-wait for
//!   the remainder only.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::constants::INFINITE_TIMEOUT;
use crate::message::{Event, Message};

/// How long `pop` may block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Return immediately
    Poll,
    /// Block for at most this long
    After(Duration),
    /// Block until a message arrives or the queue closes
    Infinite,
}

impl Timeout {
    /// Map a millisecond count: 0 polls, [`INFINITE_TIMEOUT`] blocks forever
    pub fn from_millis(ms: u32) -> Self {
        match ms {
            0 => Timeout::Poll,
            INFINITE_TIMEOUT => Timeout::Infinite,
            ms => Timeout::After(Duration::from_millis(u64::from(ms))),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Timeout::Poll
        } else {
            Timeout::After(d)
        }
    }
}

/// Outcome of a `pop`
#[derive(Debug)]
pub enum Pop {
    Message(Message),
    TimedOut,
    Closed,
}

struct QueueState {
    messages: VecDeque<Message>,
    closed: bool,
}

/// FIFO of messages awaiting delivery
pub struct EventQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    warn_depth: usize,
}

impl EventQueue {
    /// Create an open, empty queue
    pub fn new(warn_depth: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                messages: VecDeque::new(),
                closed: false,
            }),
            available: Condvar::new(),
            warn_depth,
        }
    }

    /// Append a message and wake the consumer.
    ///
    /// Hands the message back if the queue is closed.
    pub fn push(&self, message: Message) -> Result<(), Message> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(message);
        }
        state.messages.push_back(message);

        let depth = state.messages.len();
        if self.warn_depth > 0 && depth % self.warn_depth == 0 {
            tracing::warn!("Event queue depth reached {}", depth);
        }
        drop(state);

        self.available.notify_one();
        Ok(())
    }

    /// Take the oldest message, blocking up to `timeout`
    pub fn pop(&self, timeout: Timeout) -> Pop {
        let deadline = match timeout {
            Timeout::After(d) => Instant::now().checked_add(d),
            _ => None,
        };

        let mut state = self.state.lock();
        loop {
            if let Some(message) = state.messages.pop_front() {
                return Pop::Message(message);
            }
            if state.closed {
                return Pop::Closed;
            }

            match (timeout, deadline) {
                (Timeout::Poll, _) => return Pop::TimedOut,
                (Timeout::After(_), Some(deadline)) => {
                    if Instant::now() >= deadline {
                        return Pop::TimedOut;
                    }
                    // Loop re-checks the deque, so a message racing the
                    // deadline is still delivered.
                    self.available.wait_until(&mut state, deadline);
                }
                // Infinite, or a bound too large to represent
                _ => self.available.wait(&mut state),
            }
        }
    }

    /// Refuse further pushes and wake every waiter
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.available.notify_all();
    }

    /// Remove and return every pending message
    pub fn drain(&self) -> Vec<Message> {
        self.state.lock().messages.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.state.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

/// Producer handle given to protocol workers
#[derive(Clone)]
pub struct EventSink {
    queue: Arc<EventQueue>,
}

impl EventSink {
    pub fn new(queue: Arc<EventQueue>) -> Self {
        Self { queue }
    }

    /// Encode and enqueue an event; dropped silently once the queue closes
    pub fn emit(&self, event: Event) {
        let message = event.into_message();
        tracing::trace!("Emitting {} {}", message.id(), message.tag());
        if let Err(message) = self.queue.push(message) {
            tracing::debug!("Queue closed, discarding {} {}", message.id(), message.tag());
        }
    }
}
