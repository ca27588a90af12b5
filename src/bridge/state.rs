// Connection State
// The three-state machine the bridge owns

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where the bridge is in its session lifecycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No session (initial and terminal)
    #[default]
    Disconnected,
    /// An adapter is establishing a session
    Connecting,
    /// The adapter confirmed the session is usable
    Connected,
}

impl ConnectionState {
    /// Whether the machine has an edge from `self` to `next`
    ///
    /// `Connecting -> Connecting` and `Connected -> Connecting` are absent:
    /// a second connect never restarts an attempt or a live session.
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
        }
    }
}
