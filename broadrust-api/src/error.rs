//! Protocol error taxonomy

use std::io;

pub type Result<T> = std::result::Result<T, ApiError>;

/// Errors surfaced by the protocol seam.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The device refused the handshake. It is locked and must be
    /// unlocked manually through the vendor app.
    #[error("Authentication denied - the device is locked")]
    AuthenticationDenied,

    /// A previously established session key was invalidated.
    #[error("Authorization revoked by the device")]
    AuthorizationRevoked,

    /// The device closed the connection mid-exchange.
    #[error("Connection closed by the device")]
    ConnectionClosed,

    /// No response within the per-device timeout.
    #[error("Network timeout")]
    NetworkTimeout,

    /// The network containing the device cannot be reached.
    #[error("Network unreachable")]
    NetworkUnreachable,

    /// The device answered with something the protocol library could
    /// not interpret.
    #[error("Unexpected device response: {0}")]
    Protocol(String),

    /// The device family does not implement the requested command.
    #[error("Command not supported: {0}")]
    CommandNotSupported(String),

    /// The device-side code storage is full or unavailable.
    #[error("Device storage error")]
    Storage,

    /// Any other OS-level failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ApiError {
    /// Categorize an I/O error.
    ///
    /// The kind → category mapping is policy, not a guarantee: which
    /// errno a given failure produces varies by platform, so the whole
    /// mapping lives here and nowhere else.
    pub fn from_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Self::NetworkTimeout,
            io::ErrorKind::NetworkUnreachable | io::ErrorKind::HostUnreachable => {
                Self::NetworkUnreachable
            }
            _ => Self::Io(err),
        }
    }

    /// Whether a later retry can reasonably succeed without user action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkTimeout | Self::NetworkUnreachable | Self::ConnectionClosed | Self::Io(_)
        )
    }

    /// Whether the failure calls for one re-authentication before a
    /// single retry of the original operation.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::AuthorizationRevoked | Self::ConnectionClosed)
    }

    /// Stable error code for user-facing reporting.
    pub fn code(&self) -> &'static str {
        match self {
            Self::AuthenticationDenied => "invalid_auth",
            Self::NetworkTimeout | Self::NetworkUnreachable => "cannot_connect",
            Self::AuthorizationRevoked
            | Self::ConnectionClosed
            | Self::Protocol(_)
            | Self::CommandNotSupported(_)
            | Self::Storage
            | Self::Io(_) => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_timeout_maps_to_network_timeout() {
        let err = ApiError::from_io(io::Error::new(io::ErrorKind::TimedOut, "timed out"));
        assert!(matches!(err, ApiError::NetworkTimeout));
    }

    #[test]
    fn test_io_unreachable_maps_to_network_unreachable() {
        let err = ApiError::from_io(io::Error::new(
            io::ErrorKind::NetworkUnreachable,
            "unreachable",
        ));
        assert!(matches!(err, ApiError::NetworkUnreachable));
    }

    #[test]
    fn test_io_other_stays_generic() {
        let err = ApiError::from_io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(matches!(err, ApiError::Io(_)));
        assert_eq!(err.code(), "unknown");
    }

    #[test]
    fn test_reauth_trigger_set() {
        assert!(ApiError::AuthorizationRevoked.requires_reauth());
        assert!(ApiError::ConnectionClosed.requires_reauth());
        assert!(!ApiError::NetworkTimeout.requires_reauth());
        assert!(!ApiError::AuthenticationDenied.requires_reauth());
    }

    #[test]
    fn test_denied_is_not_transient() {
        assert!(!ApiError::AuthenticationDenied.is_transient());
        assert!(ApiError::NetworkTimeout.is_transient());
        assert_eq!(ApiError::AuthenticationDenied.code(), "invalid_auth");
        assert_eq!(ApiError::NetworkTimeout.code(), "cannot_connect");
    }
}
