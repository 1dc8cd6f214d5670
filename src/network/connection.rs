//! Connection Handler
//!
//! Drives one bridge client: handshake, command forwarding, event pump.

use std::io::{BufReader, BufWriter};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, SwitchboardError};
use crate::protocol::{read_frame, write_frame, Frame};
use crate::queue::Timeout;
use crate::session::Session;

/// How often the event pump re-checks for connection teardown
const PUMP_INTERVAL: Duration = Duration::from_millis(100);

/// Handles a single client connection (one session per connection)
pub struct Connection {
    /// TCP stream reader (buffered for efficiency)
    reader: BufReader<TcpStream>,

    /// TCP stream writer, shared with the event pump
    writer: Arc<Mutex<BufWriter<TcpStream>>>,

    /// Engine defaults for clients that send empty options
    config: Config,

    /// Peer address for logging
    peer_addr: String,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, config: Config) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        let mut connection = Self {
            reader: BufReader::new(read_stream),
            writer: Arc::new(Mutex::new(BufWriter::new(write_stream))),
            config,
            peer_addr,
        };
        connection.set_timeouts()?;
        Ok(connection)
    }

    /// Apply the configured socket timeouts (0 = none)
    fn set_timeouts(&mut self) -> Result<()> {
        let read_ms = self.config.read_timeout_ms;
        let write_ms = self.config.write_timeout_ms;

        if read_ms > 0 {
            self.reader
                .get_ref()
                .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        }
        if write_ms > 0 {
            self.writer
                .lock()
                .get_ref()
                .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        }
        Ok(())
    }

    /// Handle the connection (blocking until closed)
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        let session = match self.handshake()? {
            Some(session) => Arc::new(session),
            None => return Ok(()),
        };

        let closing = Arc::new(AtomicBool::new(false));
        let pump = self.spawn_event_pump(Arc::clone(&session), Arc::clone(&closing))?;

        let result = self.command_loop(&session);

        closing.store(true, Ordering::Relaxed);
        if pump.join().is_err() {
            tracing::warn!("Event pump for {} panicked", self.peer_addr);
        }
        if let Err(e) = session.shutdown() {
            tracing::warn!("Session shutdown for {} failed: {}", self.peer_addr, e);
        }
        tracing::debug!("Client {} disconnected", self.peer_addr);
        result
    }

    /// Expect HELLO and open a session for it
    fn handshake(&mut self) -> Result<Option<Session>> {
        let (version, options) = match read_frame(&mut self.reader) {
            Ok(Frame::Hello { version, options }) => (version, options),
            Ok(other) => {
                self.send(&Frame::Failure(format!("expected HELLO, got {:?}", other.kind())))?;
                return Ok(None);
            }
            Err(e) if is_disconnect(&e) => return Ok(None),
            Err(e) => return Err(e),
        };

        let opened = if options.trim().is_empty() {
            Session::open(version, self.config.clone())
        } else {
            Session::initialise(version, &options)
        };

        match opened {
            Ok(session) => {
                self.send(&Frame::Welcome {
                    version: session.api_version(),
                })?;
                Ok(Some(session))
            }
            Err(e) => {
                tracing::warn!("Client {} could not open a session: {}", self.peer_addr, e);
                self.send(&Frame::Failure(e.to_string()))?;
                Ok(None)
            }
        }
    }

    /// Forward events to the client until the connection closes
    fn spawn_event_pump(
        &self,
        session: Arc<Session>,
        closing: Arc<AtomicBool>,
    ) -> Result<thread::JoinHandle<()>> {
        let writer = Arc::clone(&self.writer);
        let peer_addr = self.peer_addr.clone();

        let handle = thread::Builder::new()
            .name(format!("switchboard-pump-{}", peer_addr))
            .spawn(move || {
                while !closing.load(Ordering::Relaxed) {
                    match session.get_message(Timeout::After(PUMP_INTERVAL)) {
                        Ok(Some(message)) => {
                            if let Err(e) = write_frame(&mut *writer.lock(), &Frame::Event(message)) {
                                tracing::debug!("Event write to {} failed: {}", peer_addr, e);
                                break;
                            }
                        }
                        Ok(None) => continue,
                        Err(_) => break,
                    }
                }
            })?;
        Ok(handle)
    }

    /// Read commands and answer them with RESPONSE frames
    fn command_loop(&mut self, session: &Session) -> Result<()> {
        loop {
            let frame = match read_frame(&mut self.reader) {
                Ok(frame) => frame,
                Err(e) if is_disconnect(&e) => return Ok(()),
                Err(e) => {
                    tracing::warn!("Error reading from {}: {}", self.peer_addr, e);
                    let _ = self.send(&Frame::Failure(e.to_string()));
                    return Err(e);
                }
            };

            let reply = match frame {
                Frame::Command(command) => {
                    tracing::trace!("Received {} from {}", command.tag(), self.peer_addr);
                    match session.send_message(&command) {
                        Ok(response) => Frame::Response(response),
                        Err(e) => Frame::Failure(e.to_string()),
                    }
                }
                other => Frame::Failure(format!("unexpected {:?} frame", other.kind())),
            };

            if let Err(e) = self.send(&reply) {
                if is_disconnect(&e) {
                    tracing::debug!(
                        "Client {} disconnected before response could be sent: {}",
                        self.peer_addr,
                        e
                    );
                    return Ok(());
                }
                tracing::warn!("Error writing to {}: {}", self.peer_addr, e);
                return Err(e);
            }
        }
    }

    fn send(&self, frame: &Frame) -> Result<()> {
        write_frame(&mut *self.writer.lock(), frame)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

/// I/O errors that mean the peer went away (or idled past the read timeout)
fn is_disconnect(error: &SwitchboardError) -> bool {
    match error {
        SwitchboardError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::TimedOut
        ),
        _ => false,
    }
}
