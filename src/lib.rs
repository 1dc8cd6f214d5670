//! # Switchboard
//!
//! A message-oriented control API for a multi-protocol communications
//! engine:
//! - Opaque session handle with a negotiated API version
//! - Blocking/polling event delivery with bounded timeouts
//! - Closed command/event vocabulary routed to protocol handlers
//! - TCP bridge for remote controllers
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Controller                             │
//! │          send_message ▼            ▲ get_message             │
//! └─────────────────────┬──────────────┴────────────────────────┘
//!                       │              │
//! ┌─────────────────────▼───────┐  ┌───┴─────────────────────────┐
//! │       Command Router        │  │        Event Queue           │
//! │ (decode, version, routing)  │  │  (Mutex + Condvar, FIFO)     │
//! └─────────────────────┬───────┘  └───▲─────────────────────────┘
//!                       │ jobs          │ events
//!          ┌────────────┼──────────────┼────────────┐
//!          ▼            ▼              │            ▼
//!   ┌─────────────┐ ┌─────────────┐ ┌──┴──────────┐
//!   │ Signalling  │ │  Loopback   │ │   Service   │
//!   │ sip, h323.. │ │  local, pc  │ │  ivr, mcu.. │
//!   └─────────────┘ └─────────────┘ └─────────────┘
//!       (one worker thread per enabled protocol)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use switchboard::{params, Message, Session, Timeout};
//!
//! let session = Session::initialise(20, "").unwrap();
//! let ack = session
//!     .send_message(&Message::command("call-setup", params! { "party-b" => "sip:alice@example.com" }))
//!     .unwrap();
//! let call_id = ack.call_id().unwrap();
//!
//! while let Some(event) = session.get_message(Timeout::from_millis(5000)).unwrap() {
//!     println!("{} {:?}", event.tag(), event.params());
//! }
//! session.shutdown().unwrap();
//! # let _ = call_id;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod constants;

pub mod message;
pub mod queue;
pub mod router;
pub mod session;
pub mod network;
pub mod protocol;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CommandError, InitError, Result, StateError, SwitchboardError};
pub use config::Config;
pub use constants::{Prefix, API_VERSION, INFINITE_TIMEOUT, MINIMUM_API_VERSION};
pub use message::{CallId, Command, Event, Message, MessageType, Params, Value};
pub use queue::Timeout;
pub use session::{Session, SessionState};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Switchboard
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
