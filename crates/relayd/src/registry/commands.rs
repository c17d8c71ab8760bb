//! Registry actor commands, errors, and events.
//!
//! This module defines the message types for communicating with the `RegistryActor`:
//! - `RegistryCommand`: Commands sent to the actor
//! - `RegistryError`: Errors that can occur during registry operations
//! - `RelayEvent`: Events published for observers (status display, logs)
//!
//! All types are designed for async message passing and follow the panic-free policy.

use std::net::SocketAddr;

use relay_core::{DisplayName, SessionId};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Sending side of a session's outgoing line queue.
///
/// The registry holds one of these per joined session and pushes broadcast
/// lines into it; the session's writer task drains it onto the socket.
pub type Outbox = mpsc::UnboundedSender<String>;

// ============================================================================
// Registry Commands
// ============================================================================

/// Commands sent to the registry actor.
///
/// Each command carries a oneshot channel for the response, so every
/// operation completes (and is observed) in the order the actor ran it.
///
/// # Usage
///
/// ```ignore
/// let (tx, rx) = oneshot::channel();
/// registry_tx.send(RegistryCommand::HasAny { respond_to: tx }).await?;
/// let anyone_here = rx.await?;
/// ```
#[derive(Debug)]
pub enum RegistryCommand {
    /// Register a session under a display name.
    ///
    /// Always succeeds; a name already in use is shared, not rejected.
    AddName {
        /// Name the client picked
        name: DisplayName,
        /// Session claiming the name
        session_id: SessionId,
        /// Where broadcasts for this session are queued
        outbox: Outbox,
        /// Channel to signal completion
        respond_to: oneshot::Sender<()>,
    },

    /// Deregister a session.
    ///
    /// Responds `true` only if `session_id` was registered under `name`.
    RemoveName {
        name: DisplayName,
        session_id: SessionId,
        respond_to: oneshot::Sender<bool>,
    },

    /// Copy of the current display names, sorted.
    SnapshotNames {
        respond_to: oneshot::Sender<Vec<DisplayName>>,
    },

    /// Whether anybody is registered.
    HasAny { respond_to: oneshot::Sender<bool> },

    /// Queue `message` for every registered session except `exclude`.
    ///
    /// Responds with the number of sessions the message was queued for.
    Broadcast {
        /// Line to deliver, without terminator
        message: String,
        /// The sender, who never receives its own line
        exclude: SessionId,
        respond_to: oneshot::Sender<usize>,
    },
}

// ============================================================================
// Registry Errors
// ============================================================================

/// Errors that can occur during registry operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The actor stopped before answering.
    #[error("response channel closed")]
    ChannelClosed,
}

// ============================================================================
// Relay Events
// ============================================================================

/// Events published for whatever is watching the relay.
///
/// Nothing in the relay depends on these being received; with no
/// subscribers they are simply dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// The listener bound its socket.
    Listening { addr: SocketAddr },

    /// A connection was accepted.
    Connected {
        session_id: SessionId,
        peer: SocketAddr,
    },

    /// A joined session left and was removed from the registry.
    Disconnected {
        session_id: SessionId,
        name: DisplayName,
    },

    /// The listener cannot continue.
    FatalError { message: String },
}

impl std::fmt::Display for RelayEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Listening { addr } => write!(f, "Chat server is listening on {addr}"),
            Self::Connected { peer, .. } => write!(f, "User '{}' has connected.", peer.ip()),
            Self::Disconnected { name, .. } => write!(f, "User {name} has left the server."),
            Self::FatalError { message } => write!(f, "Error: {message}"),
        }
    }
}
