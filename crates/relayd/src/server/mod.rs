//! TCP listener for the relay.
//!
//! The server:
//! - Binds a TCP port (a bind failure is fatal)
//! - Spawns a Session for each client on its own task
//! - Keeps accepting while sessions run; accept errors are logged and skipped
//! - Supports graceful shutdown via CancellationToken
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │   ChatServer    │
//! │                 │
//! │   TcpListener   │
//! └───────┬─────────┘
//!         │ accept()
//!         ▼
//! ┌─────────────────┐     ┌─────────────────┐
//! │     Session     │────▶│  RegistryHandle │
//! │   (per client)  │     │                 │
//! └─────────────────┘     └─────────────────┘
//!         ▲                        │
//!         │ outbox                 │ broadcast
//!         └────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Server errors are logged and allow continued operation

mod config;
mod session;

pub use config::{ConfigFile, ServerConfig, DEFAULT_HOST};
pub use session::{Session, SessionError, DEFAULT_WRITE_TIMEOUT};

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use relay_core::SessionId;

use crate::registry::{RegistryHandle, RelayEvent};

/// TCP listener for the relay.
///
/// Accepts connections and hands each one to a new Session.
pub struct ChatServer {
    /// Bound listener
    listener: TcpListener,

    /// Address actually bound (resolves port 0)
    local_addr: SocketAddr,

    /// Handle to the session registry
    registry: RegistryHandle,

    /// Cancellation token for graceful shutdown
    cancel_token: CancellationToken,

    /// Connection counter for generating session IDs
    connection_counter: AtomicU64,

    /// Permits for open connections when a cap is configured
    connection_limit: Option<Arc<Semaphore>>,

    /// Configured cap, for logs
    max_connections: Option<usize>,

    /// Per-line write timeout handed to every session
    write_timeout: Duration,
}

impl ChatServer {
    /// Binds the listening socket.
    ///
    /// # Arguments
    ///
    /// * `config` - Address and limits
    /// * `registry` - Handle to the session registry
    /// * `cancel_token` - Token for graceful shutdown
    ///
    /// # Errors
    ///
    /// `ServerError::Bind` if the address cannot be bound. The failure is
    /// also published as `RelayEvent::FatalError`. There is no retry: a bad
    /// port is a configuration problem.
    pub async fn bind(
        config: &ServerConfig,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Result<Self, ServerError> {
        let addr = config.socket_addr();

        let bound = match TcpListener::bind(addr).await {
            Ok(listener) => listener.local_addr().map(|local| (listener, local)),
            Err(e) => Err(e),
        };

        let (listener, local_addr) = match bound {
            Ok(bound) => bound,
            Err(e) => {
                let err = ServerError::Bind {
                    addr,
                    error: e.to_string(),
                };
                error!(addr = %addr, error = %e, "Failed to bind listener");
                registry.publish(RelayEvent::FatalError {
                    message: err.to_string(),
                });
                return Err(err);
            }
        };

        info!(
            addr = %local_addr,
            max_connections = ?config.max_connections,
            "Chat server listening"
        );
        registry.publish(RelayEvent::Listening { addr: local_addr });

        Ok(Self {
            listener,
            local_addr,
            registry,
            cancel_token,
            connection_counter: AtomicU64::new(0),
            connection_limit: config
                .max_connections
                .map(|max| Arc::new(Semaphore::new(max))),
            max_connections: config.max_connections,
            write_timeout: config.write_timeout,
        })
    }

    /// Binds and runs the server.
    ///
    /// Only returns early on a bind failure; otherwise runs until the
    /// cancellation token fires.
    pub async fn start(
        config: &ServerConfig,
        registry: RegistryHandle,
        cancel_token: CancellationToken,
    ) -> Result<(), ServerError> {
        let server = Self::bind(config, registry, cancel_token).await?;
        server.run().await;
        Ok(())
    }

    /// Returns the bound address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the accept loop.
    ///
    /// Listens for connections until the cancellation token is triggered.
    /// Accepting never waits on a session.
    pub async fn run(self) {
        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    info!("Server shutdown requested");
                    break;
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            let conn_num = self.connection_counter.fetch_add(1, Ordering::Relaxed);
                            self.handle_connection(stream, peer, SessionId::new(conn_num));
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                            // Continue accepting other connections
                        }
                    }
                }
            }
        }

        info!(addr = %self.local_addr, "Server stopped");
    }

    /// Handles a new client connection by spawning a session task.
    ///
    /// A connection over the cap is dropped before it is announced.
    fn handle_connection(&self, stream: TcpStream, peer: SocketAddr, session_id: SessionId) {
        let permit = match &self.connection_limit {
            Some(limit) => match Arc::clone(limit).try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    warn!(
                        session_id = %session_id,
                        peer = %peer,
                        max = ?self.max_connections,
                        "Connection limit reached, dropping connection"
                    );
                    return;
                }
            },
            None => None,
        };

        info!(session_id = %session_id, peer = %peer, "Client connected");
        self.registry
            .publish(RelayEvent::Connected { session_id, peer });

        let session = Session::new(
            peer,
            session_id,
            self.registry.clone(),
            self.cancel_token.child_token(),
        )
        .with_write_timeout(self.write_timeout);

        tokio::spawn(async move {
            // Held for the life of the session
            let _permit = permit;

            let state = session.run(stream).await;

            if state.is_closed() {
                debug!(session_id = %session_id, "Session task finished");
            } else {
                warn!(session_id = %session_id, state = %state, "Session ended without closing");
            }
        });
    }
}

/// Errors that can occur in server operations.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {error}")]
    Bind { addr: SocketAddr, error: String },

    #[error("Failed to load config {path}: {error}")]
    Config { path: PathBuf, error: String },
}
