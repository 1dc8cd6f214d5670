//! Configuration for Switchboard
//!
//! Centralized configuration with sensible defaults. A session is normally
//! configured from the options string handed to `Session::initialise`.

use std::collections::BTreeSet;

use crate::constants::{Prefix, PREFIX_ALL};
use crate::error::{InitError, Result};

/// Main configuration for a Switchboard session (and the TCP bridge)
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Engine Configuration
    // -------------------------------------------------------------------------
    /// Protocols that get a handler worker
    pub protocols: BTreeSet<Prefix>,

    /// Protocol used for party URIs without a scheme
    pub default_protocol: Prefix,

    /// Queue depth above which enqueueing logs a warning
    pub queue_warn_depth: usize,

    // -------------------------------------------------------------------------
    // Network Configuration
    // -------------------------------------------------------------------------
    /// TCP listen address for the remote control bridge
    pub listen_addr: String,

    /// Max concurrent bridge connections (one session each)
    pub max_connections: usize,

    /// Connection read timeout (milliseconds)
    pub read_timeout_ms: u64,

    /// Connection write timeout (milliseconds)
    pub write_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            protocols: Prefix::ALL.iter().copied().collect(),
            default_protocol: Prefix::Sip,
            queue_warn_depth: 1024,
            listen_addr: "127.0.0.1:1720".to_string(),
            max_connections: 64,
            read_timeout_ms: 0,
            write_timeout_ms: 5000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Parse an options string.
    ///
    /// Tokens are whitespace separated. A bare token enables a protocol
    /// (`*` or `all` enables every protocol); `key=value` tokens set
    /// `default-protocol` or `queue-warn`. With no protocol tokens every
    /// protocol is enabled.
    pub fn from_options(options: &str) -> Result<Self> {
        let mut config = Config::default();
        let mut protocols = BTreeSet::new();

        for token in options.split_whitespace() {
            match token.split_once('=') {
                Some(("default-protocol", value)) => {
                    config.default_protocol = parse_prefix(value)?;
                }
                Some(("queue-warn", value)) => {
                    config.queue_warn_depth = value.parse().map_err(|_| {
                        InitError::BadOptions(format!("queue-warn: '{}' is not a number", value))
                    })?;
                }
                Some((key, _)) => {
                    return Err(InitError::BadOptions(format!("unknown option '{}'", key)).into());
                }
                None if token == PREFIX_ALL || token.eq_ignore_ascii_case("all") => {
                    protocols.extend(Prefix::ALL);
                }
                None => {
                    protocols.insert(parse_prefix(token)?);
                }
            }
        }

        if !protocols.is_empty() {
            config.protocols = protocols;
        }
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> Result<()> {
        if self.protocols.is_empty() {
            return Err(InitError::BadOptions("no protocols enabled".to_string()).into());
        }
        if !self.protocols.contains(&self.default_protocol) {
            return Err(InitError::BadOptions(format!(
                "default protocol '{}' is not enabled",
                self.default_protocol
            ))
            .into());
        }
        Ok(())
    }
}

fn parse_prefix(token: &str) -> Result<Prefix> {
    token
        .parse()
        .map_err(|_| InitError::BadOptions(format!("unknown protocol '{}'", token)).into())
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Enable exactly these protocols
    pub fn protocols(mut self, protocols: impl IntoIterator<Item = Prefix>) -> Self {
        self.config.protocols = protocols.into_iter().collect();
        self
    }

    /// Set the protocol for scheme-less party URIs
    pub fn default_protocol(mut self, prefix: Prefix) -> Self {
        self.config.default_protocol = prefix;
        self
    }

    /// Set the queue depth warning threshold
    pub fn queue_warn_depth(mut self, depth: usize) -> Self {
        self.config.queue_warn_depth = depth;
        self
    }

    /// Set the TCP listen address
    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.listen_addr = addr.into();
        self
    }

    /// Set the maximum number of concurrent connections
    pub fn max_connections(mut self, count: usize) -> Self {
        self.config.max_connections = count;
        self
    }

    /// Set the read timeout (in milliseconds, 0 = none)
    pub fn read_timeout_ms(mut self, ms: u64) -> Self {
        self.config.read_timeout_ms = ms;
        self
    }

    /// Set the write timeout (in milliseconds, 0 = none)
    pub fn write_timeout_ms(mut self, ms: u64) -> Self {
        self.config.write_timeout_ms = ms;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
