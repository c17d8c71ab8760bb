//! Server and client line types.
//!
//! # Wire format
//!
//! ```text
//! server → joining client   Currently connected: [alice, bob]
//!                           No users currently connected.
//! client → server           <display name>
//! server → others           New user connected: <name>
//! client → server           <text>            (repeats)
//! server → others           <name>: <text>
//! client → server           bye
//! server → others           <name>: bye
//! server → others           <name> has left the server.
//! ```

use std::fmt;

use relay_core::DisplayName;

/// The line a client sends to leave the server (case-sensitive, exact match).
pub const BYE_SENTINEL: &str = "bye";

/// Lines the server sends to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerLine {
    /// Who is already here, sent to a client right after it connects.
    Roster(Vec<DisplayName>),

    /// Sent instead of `Roster` when nobody has joined yet.
    NoUsers,

    /// Somebody finished joining.
    UserJoined(DisplayName),

    /// A chat line relayed from `from`.
    Chat { from: DisplayName, text: String },

    /// Somebody left.
    UserLeft(DisplayName),
}

impl ServerLine {
    /// Builds the greeting for a new connection from a roster snapshot.
    ///
    /// An empty snapshot yields [`ServerLine::NoUsers`].
    pub fn roster(names: Vec<DisplayName>) -> Self {
        if names.is_empty() {
            Self::NoUsers
        } else {
            Self::Roster(names)
        }
    }

    pub fn chat(from: &DisplayName, text: impl Into<String>) -> Self {
        Self::Chat {
            from: from.clone(),
            text: text.into(),
        }
    }
}

impl fmt::Display for ServerLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Roster(names) => {
                write!(f, "Currently connected: [")?;
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}")?;
                }
                write!(f, "]")
            }
            Self::NoUsers => write!(f, "No users currently connected."),
            Self::UserJoined(name) => write!(f, "New user connected: {name}"),
            Self::Chat { from, text } => write!(f, "{from}: {text}"),
            Self::UserLeft(name) => write!(f, "{name} has left the server."),
        }
    }
}

/// A line received from a joined client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientLine {
    /// Anything that is not the sentinel.
    Chat(String),

    /// The client asked to leave.
    Bye,
}

impl ClientLine {
    pub fn parse(line: impl Into<String>) -> Self {
        let line = line.into();
        if line == BYE_SENTINEL {
            Self::Bye
        } else {
            Self::Chat(line)
        }
    }

    /// Returns the text as the client typed it.
    ///
    /// The sentinel is relayed to the other clients like any other line
    /// before the sender is disconnected.
    pub fn text(&self) -> &str {
        match self {
            Self::Chat(text) => text,
            Self::Bye => BYE_SENTINEL,
        }
    }

    #[must_use]
    pub fn is_bye(&self) -> bool {
        matches!(self, Self::Bye)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<DisplayName> {
        list.iter().map(|n| DisplayName::from(*n)).collect()
    }

    #[test]
    fn test_roster_rendering() {
        assert_eq!(
            ServerLine::roster(names(&["alice"])).to_string(),
            "Currently connected: [alice]"
        );
        assert_eq!(
            ServerLine::roster(names(&["alice", "bob"])).to_string(),
            "Currently connected: [alice, bob]"
        );
    }

    #[test]
    fn test_empty_roster_is_no_users() {
        let line = ServerLine::roster(Vec::new());
        assert_eq!(line, ServerLine::NoUsers);
        assert_eq!(line.to_string(), "No users currently connected.");
    }

    #[test]
    fn test_notices() {
        let alice = DisplayName::from("alice");
        assert_eq!(
            ServerLine::UserJoined(alice.clone()).to_string(),
            "New user connected: alice"
        );
        assert_eq!(
            ServerLine::chat(&alice, "hello").to_string(),
            "alice: hello"
        );
        assert_eq!(
            ServerLine::UserLeft(alice).to_string(),
            "alice has left the server."
        );
    }

    #[test]
    fn test_empty_name_renders_verbatim() {
        let nobody = DisplayName::from("");
        assert_eq!(ServerLine::chat(&nobody, "hi").to_string(), ": hi");
    }

    #[test]
    fn test_sentinel_is_exact_match() {
        assert!(ClientLine::parse("bye").is_bye());
        assert!(!ClientLine::parse("Bye").is_bye());
        assert!(!ClientLine::parse("bye ").is_bye());
        assert!(!ClientLine::parse("goodbye").is_bye());
    }

    #[test]
    fn test_sentinel_text_is_relayed() {
        assert_eq!(ClientLine::parse("bye").text(), "bye");
        assert_eq!(ClientLine::parse("hello").text(), "hello");
    }
}
