//! Listener configuration.
//!
//! Settings come from three places, highest precedence first: command-line
//! flags, environment, and an optional TOML file. This module owns the file
//! format and the merged result; flag and environment parsing live in the
//! binary.
//!
//! ```toml
//! host = "127.0.0.1"
//! port = 4000
//! max_connections = 256
//! write_timeout_secs = 10
//! ```

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use super::{ServerError, DEFAULT_WRITE_TIMEOUT};

/// Address the listener binds when none is configured (all interfaces).
pub const DEFAULT_HOST: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Resolved listener settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind
    pub host: IpAddr,

    /// TCP port; 0 asks the OS for an ephemeral port
    pub port: u16,

    /// Cap on concurrently open connections (None = unbounded)
    pub max_connections: Option<usize>,

    /// How long one line may take to reach a client before that client is
    /// disconnected
    pub write_timeout: Duration,
}

impl ServerConfig {
    /// Creates a config for `port` on all interfaces with no connection cap.
    pub fn new(port: u16) -> Self {
        Self {
            host: DEFAULT_HOST,
            port,
            max_connections: None,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    pub fn with_host(mut self, host: IpAddr) -> Self {
        self.host = host;
        self
    }

    pub fn with_max_connections(mut self, max: Option<usize>) -> Self {
        self.max_connections = max;
        self
    }

    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }

    /// Returns the socket address to bind.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

/// Contents of a TOML config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConfigFile {
    pub host: Option<IpAddr>,
    pub port: Option<u16>,
    pub max_connections: Option<usize>,
    pub write_timeout_secs: Option<u64>,
}

impl ConfigFile {
    /// Reads and parses a config file.
    ///
    /// # Errors
    ///
    /// `ServerError::Config` if the file cannot be read or is not valid TOML
    /// for this schema.
    pub fn load(path: &Path) -> Result<Self, ServerError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ServerError::Config {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Self::parse(&contents).map_err(|error| ServerError::Config {
            path: path.to_path_buf(),
            error,
        })
    }

    /// Parses config file contents.
    pub fn parse(contents: &str) -> Result<Self, String> {
        toml::from_str(contents).map_err(|e| e.to_string())
    }

    /// Layers explicit settings over the file.
    ///
    /// Each `Some` argument wins over the file's value. Returns `None` if no
    /// port is known from either source.
    pub fn resolve(
        &self,
        port: Option<u16>,
        host: Option<IpAddr>,
        max_connections: Option<usize>,
    ) -> Option<ServerConfig> {
        let port = port.or(self.port)?;
        let host = host.or(self.host).unwrap_or(DEFAULT_HOST);
        let max_connections = max_connections.or(self.max_connections);

        let write_timeout = self
            .write_timeout_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_WRITE_TIMEOUT);

        Some(
            ServerConfig::new(port)
                .with_host(host)
                .with_max_connections(max_connections)
                .with_write_timeout(write_timeout),
        )
    }
}
