//! Registry actor - owns all membership state and performs broadcasts.
//!
//! The RegistryActor is the single owner of the name and session sets.
//! It receives commands via an mpsc channel and publishes events via broadcast.
//!
//! # Panic-Free Guarantees
//!
//! This module follows the crate panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations use `?`, pattern matching, or `unwrap_or`
//! - Channel send failures are logged but don't panic

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use relay_core::{DisplayName, SessionId};

use super::commands::{Outbox, RegistryCommand, RelayEvent};

/// A joined session as the registry sees it.
#[derive(Debug)]
struct Member {
    name: DisplayName,
    outbox: Outbox,
    joined_at: DateTime<Utc>,
}

// ============================================================================
// Registry Actor
// ============================================================================

/// The registry actor - owns all membership state.
///
/// Implements the actor pattern: receives commands via mpsc channel,
/// processes them sequentially, and publishes events to subscribers.
///
/// # Ownership
///
/// The actor owns:
/// - `sessions`: joined sessions keyed by SessionId (primary storage)
/// - `names`: index from display name to the sessions holding it
///
/// A session enters both maps in the same command and leaves both in the
/// same command, so no caller can observe one without the other.
///
/// # Ordering
///
/// Commands run one at a time in arrival order. Every broadcast is queued
/// to each recipient's outbox before the next command starts, which gives
/// each recipient the broadcasts in the order they were issued.
pub struct RegistryActor {
    /// Command receiver
    receiver: mpsc::Receiver<RegistryCommand>,

    /// Primary storage: SessionId → member
    sessions: HashMap<SessionId, Member>,

    /// Display name → sessions currently using it.
    /// Never holds an empty set.
    names: BTreeMap<DisplayName, BTreeSet<SessionId>>,

    /// Event publisher for observers
    event_publisher: broadcast::Sender<RelayEvent>,
}

impl RegistryActor {
    /// Creates a new registry actor.
    ///
    /// # Arguments
    ///
    /// * `receiver` - Channel for receiving commands
    /// * `event_publisher` - Broadcast channel for publishing events
    pub fn new(
        receiver: mpsc::Receiver<RegistryCommand>,
        event_publisher: broadcast::Sender<RelayEvent>,
    ) -> Self {
        Self {
            receiver,
            sessions: HashMap::new(),
            names: BTreeMap::new(),
            event_publisher,
        }
    }

    /// Runs the actor event loop.
    ///
    /// Processes commands until the channel closes (all handles dropped).
    /// This is the main entry point - call this in a spawned task.
    pub async fn run(mut self) {
        info!("Registry actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd);
        }

        info!(sessions = self.sessions.len(), "Registry actor stopped");
    }

    /// Dispatches a command to the appropriate handler.
    fn handle_command(&mut self, cmd: RegistryCommand) {
        match cmd {
            RegistryCommand::AddName {
                name,
                session_id,
                outbox,
                respond_to,
            } => {
                self.handle_add_name(name, session_id, outbox);
                // Ignore send error - caller may have given up waiting
                let _ = respond_to.send(());
            }
            RegistryCommand::RemoveName {
                name,
                session_id,
                respond_to,
            } => {
                let removed = self.handle_remove_name(&name, session_id);
                let _ = respond_to.send(removed);
            }
            RegistryCommand::SnapshotNames { respond_to } => {
                let _ = respond_to.send(self.names.keys().cloned().collect());
            }
            RegistryCommand::HasAny { respond_to } => {
                let _ = respond_to.send(!self.names.is_empty());
            }
            RegistryCommand::Broadcast {
                message,
                exclude,
                respond_to,
            } => {
                let delivered = self.handle_broadcast(&message, exclude);
                let _ = respond_to.send(delivered);
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    fn handle_add_name(&mut self, name: DisplayName, session_id: SessionId, outbox: Outbox) {
        // A session registers once; a repeat re-keys it under the new name.
        if let Some(previous) = self.sessions.remove(&session_id) {
            debug!(
                session_id = %session_id,
                previous = %previous.name,
                name = %name,
                "Session re-registered under a new name"
            );
            self.unindex(&previous.name, session_id);
        }

        let holders = self.names.entry(name.clone()).or_default();
        holders.insert(session_id);
        let shared = holders.len() > 1;

        self.sessions.insert(
            session_id,
            Member {
                name: name.clone(),
                outbox,
                joined_at: Utc::now(),
            },
        );

        info!(
            session_id = %session_id,
            name = %name,
            shared_name = shared,
            total_sessions = self.sessions.len(),
            "User joined"
        );
    }

    fn handle_remove_name(&mut self, name: &DisplayName, session_id: SessionId) -> bool {
        let registered_under_name = self
            .sessions
            .get(&session_id)
            .is_some_and(|member| &member.name == name);

        if !registered_under_name {
            debug!(
                session_id = %session_id,
                name = %name,
                "Nothing to remove"
            );
            return false;
        }

        let Some(member) = self.sessions.remove(&session_id) else {
            return false;
        };
        self.unindex(&member.name, session_id);

        let connected_secs = (Utc::now() - member.joined_at).num_seconds();
        info!(
            session_id = %session_id,
            name = %member.name,
            connected_secs,
            total_sessions = self.sessions.len(),
            "User left"
        );

        // Publish event (ignore if no subscribers)
        let _ = self.event_publisher.send(RelayEvent::Disconnected {
            session_id,
            name: member.name,
        });

        true
    }

    /// Queues `message` for every member except `exclude`.
    ///
    /// A recipient whose writer has already gone away is skipped; it will be
    /// removed when its own session notices the broken connection.
    fn handle_broadcast(&self, message: &str, exclude: SessionId) -> usize {
        let mut delivered = 0;

        for (session_id, member) in &self.sessions {
            if *session_id == exclude {
                continue;
            }

            match member.outbox.send(message.to_string()) {
                Ok(()) => delivered += 1,
                Err(_) => {
                    debug!(
                        session_id = %session_id,
                        name = %member.name,
                        "Recipient writer closed, skipping"
                    );
                }
            }
        }

        debug!(
            exclude = %exclude,
            delivered,
            "Broadcast queued"
        );

        delivered
    }

    fn unindex(&mut self, name: &DisplayName, session_id: SessionId) {
        if let Some(holders) = self.names.get_mut(name) {
            holders.remove(&session_id);
            if holders.is_empty() {
                self.names.remove(name);
            }
        }
    }

    // ========================================================================
    // Query Methods (for testing)
    // ========================================================================

    /// Returns the number of registered sessions.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Returns the number of distinct registered names.
    pub fn name_count(&self) -> usize {
        self.names.len()
    }
}
