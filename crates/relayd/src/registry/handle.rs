//! Client interface for interacting with the RegistryActor.
//!
//! The `RegistryHandle` provides a cheap-to-clone interface for sending commands
//! to the registry actor and subscribing to relay events.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel errors are mapped to `RegistryError::ChannelClosed` or a neutral value

use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

use relay_core::{DisplayName, SessionId};

use super::commands::{Outbox, RegistryCommand, RegistryError, RelayEvent};

// ============================================================================
// Registry Handle
// ============================================================================

/// Handle for interacting with the registry actor.
///
/// This is a cheap-to-clone handle that can be shared across tasks.
/// All methods are async and communicate with the actor via channels.
///
/// # Usage
///
/// ```ignore
/// // Clone the handle to share across tasks
/// let handle = registry_handle.clone();
///
/// // Join
/// handle.add_name(name.clone(), session_id, outbox).await?;
/// handle.broadcast(format!("New user connected: {name}"), session_id).await;
///
/// // Subscribe to events
/// let mut rx = handle.subscribe();
/// while let Ok(event) = rx.recv().await {
///     // Handle event
/// }
/// ```
#[derive(Clone)]
pub struct RegistryHandle {
    /// Command sender to the actor
    sender: mpsc::Sender<RegistryCommand>,

    /// Event broadcaster for subscribing to updates
    event_sender: broadcast::Sender<RelayEvent>,
}

impl RegistryHandle {
    /// Create a new registry handle.
    ///
    /// # Arguments
    ///
    /// * `sender` - The command channel sender for communicating with the actor
    /// * `event_sender` - The broadcast sender for relay events
    pub fn new(
        sender: mpsc::Sender<RegistryCommand>,
        event_sender: broadcast::Sender<RelayEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Register a session under a display name.
    ///
    /// The name is not checked for uniqueness or emptiness. From the moment
    /// this returns, broadcasts from other sessions are queued on `outbox`.
    ///
    /// # Errors
    ///
    /// - `RegistryError::ChannelClosed` if the actor has shut down
    pub async fn add_name(
        &self,
        name: DisplayName,
        session_id: SessionId,
        outbox: Outbox,
    ) -> Result<(), RegistryError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(RegistryCommand::AddName {
                name,
                session_id,
                outbox,
                respond_to: tx,
            })
            .await
            .map_err(|_| RegistryError::ChannelClosed)?;

        rx.await.map_err(|_| RegistryError::ChannelClosed)
    }

    /// Deregister a session.
    ///
    /// Returns `true` if the session was registered under `name` and has now
    /// been removed, `false` otherwise (including when the actor is gone).
    /// Callers use the result to decide whether to announce the departure.
    pub async fn remove_name(&self, name: DisplayName, session_id: SessionId) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::RemoveName {
                name,
                session_id,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            actor_unavailable("remove_name");
            return false;
        }

        rx.await.unwrap_or_else(|_| {
            actor_unavailable("remove_name");
            false
        })
    }

    /// Get a sorted copy of the registered display names.
    ///
    /// Returns an empty vector if nobody is registered or if communication
    /// with the actor fails.
    pub async fn snapshot_names(&self) -> Vec<DisplayName> {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::SnapshotNames { respond_to: tx })
            .await
            .is_err()
        {
            actor_unavailable("snapshot_names");
            return Vec::new();
        }

        rx.await.unwrap_or_else(|_| {
            actor_unavailable("snapshot_names");
            Vec::new()
        })
    }

    /// Returns `true` if at least one session is registered.
    pub async fn has_any(&self) -> bool {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::HasAny { respond_to: tx })
            .await
            .is_err()
        {
            actor_unavailable("has_any");
            return false;
        }

        rx.await.unwrap_or_else(|_| {
            actor_unavailable("has_any");
            false
        })
    }

    /// Queue `message` for every registered session except `exclude`.
    ///
    /// Best-effort: recipients that can no longer accept lines are skipped
    /// and the failure is never reported to the caller. Returns how many
    /// sessions the line was queued for (0 if the actor is gone).
    pub async fn broadcast(&self, message: impl Into<String>, exclude: SessionId) -> usize {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(RegistryCommand::Broadcast {
                message: message.into(),
                exclude,
                respond_to: tx,
            })
            .await
            .is_err()
        {
            actor_unavailable("broadcast");
            return 0;
        }

        rx.await.unwrap_or_else(|_| {
            actor_unavailable("broadcast");
            0
        })
    }

    /// Subscribe to relay events.
    ///
    /// This is a synchronous operation - it doesn't communicate with the actor.
    pub fn subscribe(&self) -> broadcast::Receiver<RelayEvent> {
        self.event_sender.subscribe()
    }

    /// Publish an event from outside the actor (listener lifecycle).
    ///
    /// Dropped silently when nobody is subscribed.
    pub fn publish(&self, event: RelayEvent) {
        let _ = self.event_sender.send(event);
    }
}

fn actor_unavailable(operation: &'static str) {
    warn!(operation, "Registry actor unavailable, returning empty result");
}
