//! Network Module
//!
//! TCP bridge that lets a remote controller drive sessions.
//!
//! ## Architecture
//! - Single non-blocking acceptor loop
//! - One thread per connection, one session per connection
//! - A pump thread per connection forwards session events

mod server;
mod connection;

pub use server::Server;
pub use connection::Connection;
