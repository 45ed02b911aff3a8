//! Listener configuration and host properties loading
//!
//! A [`ListenerConfig`] is fixed for the lifetime of one listener; changing
//! the port or bind address means building a new listener from a new config.
//! [`ServerProperties`] reads the values the host server is configured with
//! from a Java-style `server.properties` file.

use crate::error::{ConfigError, QueryError};
use crate::handler::HandlerSettings;
use log::warn;
use shared::{DEFAULT_MAX_PLAYERS, DEFAULT_QUERY_PORT, DEFAULT_SERVER_PORT};
use std::fmt;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Longest accepted request line, terminator included
pub const DEFAULT_MAX_LINE_LENGTH: usize = 256;

/// How long a client may take to send its request line
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Concurrent connection handlers allowed per listener
pub const DEFAULT_MAX_CONNECTIONS: usize = 256;

/// Address the query listener binds to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindAddress {
    /// All interfaces. Binds `[::]`, which also takes IPv4 clients on
    /// dual-stack hosts, or `0.0.0.0` where IPv6 is unavailable.
    Any,
    /// A specific host name or IP literal
    Host(String),
}

impl BindAddress {
    /// Candidate socket addresses for `port`, in the order they should be
    /// tried. Host names resolve to their first address only.
    pub async fn resolve(&self, port: u16) -> Result<Vec<SocketAddr>, QueryError> {
        match self {
            BindAddress::Any => Ok(vec![
                SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)),
                SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)),
            ]),
            BindAddress::Host(host) => {
                let invalid = |source: io::Error| QueryError::InvalidAddress {
                    addr: format!("{}:{}", host, port),
                    source,
                };

                let mut addrs = tokio::net::lookup_host((host.as_str(), port))
                    .await
                    .map_err(invalid)?;

                let addr = addrs.next().ok_or_else(|| {
                    invalid(io::Error::new(
                        io::ErrorKind::NotFound,
                        "host resolved to no addresses",
                    ))
                })?;
                Ok(vec![addr])
            }
        }
    }
}

impl FromStr for BindAddress {
    type Err = std::convert::Infallible;

    /// Empty strings and "any" (any case) mean all interfaces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("any") {
            Ok(BindAddress::Any)
        } else {
            Ok(BindAddress::Host(s.to_string()))
        }
    }
}

impl fmt::Display for BindAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindAddress::Any => f.write_str("ANY"),
            BindAddress::Host(host) => f.write_str(host),
        }
    }
}

/// Configuration for one query listener instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub bind_address: BindAddress,
    pub port: u16,
    /// Idle limit for reading the request line. `None` waits forever.
    pub read_timeout: Option<Duration>,
    pub max_line_length: usize,
    pub max_connections: usize,
}

impl ListenerConfig {
    pub fn new(bind_address: BindAddress, port: u16) -> Self {
        Self {
            bind_address,
            port,
            read_timeout: Some(DEFAULT_READ_TIMEOUT),
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Disables the read timeout. A client that never sends a line then
    /// holds its handler until it disconnects.
    pub fn without_read_timeout(mut self) -> Self {
        self.read_timeout = None;
        self
    }

    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length.max(1);
        self
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections.clamp(1, Semaphore::MAX_PERMITS);
        self
    }

    pub fn handler_settings(&self) -> HandlerSettings {
        HandlerSettings {
            max_line_length: self.max_line_length,
            read_timeout: self.read_timeout,
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self::new(BindAddress::Any, DEFAULT_QUERY_PORT)
    }
}

/// Values read from the host's `server.properties`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerProperties {
    /// `server-ip`; blank means any address
    pub server_ip: BindAddress,
    /// `server-port`, the game server's own port
    pub server_port: u16,
    /// `minequery-port`, the port the query listener binds
    pub query_port: u16,
    /// `max-players`
    pub max_players: u32,
}

impl Default for ServerProperties {
    fn default() -> Self {
        Self {
            server_ip: BindAddress::Any,
            server_port: DEFAULT_SERVER_PORT,
            query_port: DEFAULT_QUERY_PORT,
            max_players: DEFAULT_MAX_PLAYERS,
        }
    }
}

impl ServerProperties {
    /// Parses `key=value` / `key: value` lines. Comment lines start with
    /// `#` or `!`, unknown keys are ignored.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut properties = ServerProperties::default();

        for line in text.lines() {
            let line = line.trim_start();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }

            let Some(split) = line.find(|c: char| c == '=' || c == ':') else {
                continue;
            };
            let key = line[..split].trim();
            let value = line[split + 1..].trim();

            match key {
                "server-ip" => {
                    properties.server_ip = value.parse().unwrap_or(BindAddress::Any)
                }
                "server-port" => properties.server_port = parse_value(key, value)?,
                "minequery-port" => properties.query_port = parse_value(key, value)?,
                "max-players" => properties.max_players = parse_value(key, value)?,
                _ => {}
            }
        }

        Ok(properties)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    /// Like [`ServerProperties::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!(
                    "{} not found, using default server properties",
                    path.display()
                );
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn listener_config(&self) -> ListenerConfig {
        ListenerConfig::new(self.server_ip.clone(), self.query_port)
    }
}

fn parse_value<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}
