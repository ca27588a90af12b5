// Bridge Errors
// The one failure vocabulary callers see, whatever the transport

use crate::command::CommandError;
use crate::transport::TransportError;
use thiserror::Error;

/// Failures surfaced by the connectivity bridge
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The host cannot drive this transport at all
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// The operator backed out, or a disconnect overtook the connect
    #[error("Aborted: {0}")]
    UserAborted(String),

    /// The device or relay did not answer in time, or refused the session
    #[error("Unreachable: {0}")]
    Unreachable(String),

    /// An established session ended without being asked to
    #[error("Session lost: {0}")]
    SessionLost(String),

    /// The command could not be accepted or written
    #[error("Command rejected: {0}")]
    CommandRejected(String),
}

impl BridgeError {
    pub fn not_connected() -> Self {
        Self::CommandRejected("not connected".to_string())
    }

    pub fn is_not_connected(&self) -> bool {
        matches!(self, Self::CommandRejected(reason) if reason == "not connected")
    }

    pub fn is_user_aborted(&self) -> bool {
        matches!(self, Self::UserAborted(_))
    }

    /// Whether the UI should raise an alarm for this failure
    pub fn should_alert(&self) -> bool {
        !self.is_user_aborted()
    }
}

impl From<TransportError> for BridgeError {
    fn from(e: TransportError) -> Self {
        let reason = e.to_string();
        match e {
            TransportError::Unsupported(_) | TransportError::InvalidConfig(_) => Self::Unsupported(reason),
            TransportError::Cancelled => Self::UserAborted(reason),
            TransportError::Unreachable(_)
            | TransportError::Timeout
            | TransportError::Http { .. }
            | TransportError::Refused(_)
            | TransportError::Protocol(_) => Self::Unreachable(reason),
            TransportError::NotConnected => Self::not_connected(),
            TransportError::ChannelMissing(_)
            | TransportError::WriteFailed(_)
            | TransportError::AlreadyConnected => Self::CommandRejected(reason),
            TransportError::SessionClosed(_) => Self::SessionLost(reason),
        }
    }
}

impl From<CommandError> for BridgeError {
    fn from(e: CommandError) -> Self {
        Self::CommandRejected(e.to_string())
    }
}
