//! TCP Server
//!
//! Accepts bridge connections and runs each on its own thread.

use std::io::ErrorKind;
use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::Config;
use crate::error::{Result, SwitchboardError};
use crate::protocol::{write_frame, Frame};

use super::Connection;

/// Poll interval of the non-blocking accept loop
const ACCEPT_INTERVAL: Duration = Duration::from_millis(50);

/// How long `run` waits for closed connections to finish their session teardown
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// TCP server for the remote control bridge
pub struct Server {
    config: Config,
    listener: Option<TcpListener>,
    shutdown: Arc<AtomicBool>,
    active: Arc<AtomicUsize>,
    /// Live connection sockets, closed when the server stops
    streams: Arc<Mutex<HashMap<u64, TcpStream>>>,
    next_id: AtomicU64,
}

impl Server {
    /// Create a new server with the given config
    pub fn new(config: Config) -> Self {
        Self {
            config,
            listener: None,
            shutdown: Arc::new(AtomicBool::new(false)),
            active: Arc::new(AtomicUsize::new(0)),
            streams: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Bind the listen address; returns the bound address
    pub fn bind(&mut self) -> Result<SocketAddr> {
        let listener = TcpListener::bind(&self.config.listen_addr).map_err(|e| {
            SwitchboardError::Network(format!("cannot bind {}: {}", self.config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        self.listener = Some(listener);
        Ok(addr)
    }

    /// Start the server (blocking until `shutdown` is signalled)
    pub fn run(&mut self) -> Result<()> {
        if self.listener.is_none() {
            self.bind()?;
        }
        let listener = self
            .listener
            .take()
            .ok_or_else(|| SwitchboardError::Network("listener not bound".to_string()))?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        while !self.shutdown.load(Ordering::Relaxed) {
            match listener.accept() {
                Ok((stream, addr)) => self.accept(stream, addr),
                Err(e) if e.kind() == ErrorKind::WouldBlock => thread::sleep(ACCEPT_INTERVAL),
                Err(e) => tracing::warn!("Accept failed: {}", e),
            }
        }

        tracing::info!("Server stopped accepting connections");
        self.close_connections();
        Ok(())
    }

    /// Signal the server to shutdown gracefully.
    ///
    /// `run` then stops accepting, closes every live connection (each
    /// client reads end-of-stream and its session is shut down) and
    /// returns once they have drained.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Flag that stops `run` when set, for use from another thread
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Number of connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    fn close_connections(&self) {
        let streams: Vec<TcpStream> = self.streams.lock().drain().map(|(_, s)| s).collect();
        if streams.is_empty() {
            return;
        }
        tracing::info!("Closing {} live connection(s)", streams.len());
        for stream in streams {
            let _ = stream.shutdown(Shutdown::Both);
        }

        let deadline = Instant::now() + DRAIN_TIMEOUT;
        while self.active.load(Ordering::Relaxed) > 0 {
            if Instant::now() >= deadline {
                tracing::warn!(
                    "{} connection(s) still tearing down after {:?}",
                    self.active.load(Ordering::Relaxed),
                    DRAIN_TIMEOUT
                );
                break;
            }
            thread::sleep(ACCEPT_INTERVAL);
        }
    }

    fn accept(&self, stream: TcpStream, addr: SocketAddr) {
        // Accepted sockets inherit non-blocking mode on some platforms
        if let Err(e) = stream.set_nonblocking(false) {
            tracing::warn!("Cannot configure connection from {}: {}", addr, e);
            return;
        }

        if self.active.load(Ordering::Relaxed) >= self.config.max_connections {
            tracing::warn!("Refusing {}: connection limit reached", addr);
            let mut stream = stream;
            let _ = write_frame(
                &mut stream,
                &Frame::Failure("connection limit reached".to_string()),
            );
            return;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match stream.try_clone() {
            Ok(handle) => {
                self.streams.lock().insert(id, handle);
            }
            Err(e) => {
                tracing::warn!("Cannot track connection from {}: {}", addr, e);
                return;
            }
        }

        let config = self.config.clone();
        let active = Arc::clone(&self.active);
        active.fetch_add(1, Ordering::Relaxed);

        let spawned = thread::Builder::new()
            .name(format!("switchboard-conn-{}", addr))
            .spawn({
                let active = Arc::clone(&active);
                let streams = Arc::clone(&self.streams);
                move || {
                    match Connection::new(stream, config).and_then(|mut c| c.handle()) {
                        Ok(()) => {}
                        Err(e) => tracing::warn!("Connection {} ended with error: {}", addr, e),
                    }
                    streams.lock().remove(&id);
                    active.fetch_sub(1, Ordering::Relaxed);
                }
            });

        if let Err(e) = spawned {
            tracing::error!("Cannot spawn handler for {}: {}", addr, e);
            self.streams.lock().remove(&id);
            active.fetch_sub(1, Ordering::Relaxed);
        }
    }
}
