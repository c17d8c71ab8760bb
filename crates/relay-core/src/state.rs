//! Per-connection protocol state machine.
//!
//! ```text
//! Connected ──▶ Joining ──▶ Active ──▶ Leaving ──▶ Closed
//!                  │          ▲  │
//!                  │          └──┘ (chat line)
//!                  └──────────────────────────────▶ Closed
//!                     (peer left before naming itself)
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};

/// Where a session is in its join/chat/leave lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Accepted, nothing sent yet.
    #[default]
    Connected,

    /// Roster sent, waiting for the client's display name.
    Joining,

    /// Registered under a display name and relaying chat lines.
    Active,

    /// Read loop finished; deregistering.
    Leaving,

    /// Connection closed. Terminal.
    Closed,
}

impl SessionState {
    /// Returns true if `next` is reachable from this state in one step.
    #[must_use]
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Connected, Joining)
                | (Connected, Closed)
                | (Joining, Active)
                | (Joining, Closed)
                | (Active, Active)
                | (Active, Leaving)
                | (Leaving, Closed)
        )
    }

    /// Moves to `next`, rejecting transitions the protocol does not allow.
    pub fn advance(self, next: SessionState) -> DomainResult<SessionState> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    #[must_use]
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Joining => write!(f, "joining"),
            Self::Active => write!(f, "active"),
            Self::Leaving => write!(f, "leaving"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let state = SessionState::default()
            .advance(SessionState::Joining)
            .and_then(|s| s.advance(SessionState::Active))
            .and_then(|s| s.advance(SessionState::Active))
            .and_then(|s| s.advance(SessionState::Leaving))
            .and_then(|s| s.advance(SessionState::Closed));
        assert_eq!(state, Ok(SessionState::Closed));
    }

    #[test]
    fn test_unnamed_peer_closes_without_leaving() {
        assert!(SessionState::Joining.can_advance_to(SessionState::Closed));
        assert!(!SessionState::Joining.can_advance_to(SessionState::Leaving));
    }

    #[test]
    fn test_closed_is_terminal() {
        for next in [
            SessionState::Connected,
            SessionState::Joining,
            SessionState::Active,
            SessionState::Leaving,
            SessionState::Closed,
        ] {
            assert!(!SessionState::Closed.can_advance_to(next));
        }
    }

    #[test]
    fn test_active_cannot_skip_leaving() {
        let err = SessionState::Active.advance(SessionState::Closed).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid session transition: active -> closed"
        );
    }

    #[test]
    fn test_closed_state() {
        assert!(SessionState::Closed.is_closed());
        assert!(!SessionState::Leaving.is_closed());
        assert!(!SessionState::default().is_closed());
    }
}
