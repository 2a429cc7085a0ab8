//! Link error taxonomy.

use thiserror::Error;

/// Failures produced anywhere in the link runtime.
///
/// Errors never cross task boundaries as panics: attempt, reader and writer
/// tasks convert them into a state transition plus one status event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error("Bluetooth adapter not available")]
    AdapterUnavailable,

    #[error("Bluetooth adapter is disabled")]
    AdapterDisabled,

    #[error("Bluetooth permission denied")]
    PermissionDenied,

    #[error("invalid endpoint address: {0}")]
    InvalidEndpoint(String),

    #[error("serial port service not found on {0}")]
    ServiceNotFound(String),

    #[error("socket open failed: {0}")]
    SocketOpen(String),

    #[error("connection attempt timed out after {0}s")]
    ConnectTimeout(u64),

    #[error("stream I/O failure: {0}")]
    StreamIo(String),

    #[error("stream closed by remote device")]
    StreamClosed,

    #[error("inbound message exceeded {0} bytes without a delimiter")]
    FramingOverflow(usize),

    #[error("not connected")]
    NotConnected,

    #[error("a connection attempt is in progress")]
    AlreadyConnecting,

    #[error("connection manager has shut down")]
    ManagerClosed,
}

impl LinkError {
    /// Whether the reconnection policy may retry after this failure.
    ///
    /// Transport failures are retried. Permission, adapter and endpoint
    /// problems are not, since a retry would fail the same way.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ServiceNotFound(_)
                | Self::SocketOpen(_)
                | Self::ConnectTimeout(_)
                | Self::StreamIo(_)
                | Self::StreamClosed
                | Self::FramingOverflow(_)
        )
    }

    /// Map an I/O error from a stream read or write.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted => Self::StreamClosed,
            _ => Self::StreamIo(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_failures_are_retryable() {
        assert!(LinkError::SocketOpen("refused".into()).is_retryable());
        assert!(LinkError::StreamIo("reset".into()).is_retryable());
        assert!(LinkError::StreamClosed.is_retryable());
        assert!(LinkError::ConnectTimeout(15).is_retryable());
    }

    #[test]
    fn test_permission_and_adapter_failures_are_not_retryable() {
        assert!(!LinkError::PermissionDenied.is_retryable());
        assert!(!LinkError::AdapterDisabled.is_retryable());
        assert!(!LinkError::AdapterUnavailable.is_retryable());
        assert!(!LinkError::InvalidEndpoint("x".into()).is_retryable());
        assert!(!LinkError::NotConnected.is_retryable());
    }

    #[test]
    fn test_io_error_mapping() {
        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope");
        assert_eq!(LinkError::from_io(&denied), LinkError::PermissionDenied);

        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(LinkError::from_io(&reset), LinkError::StreamClosed);

        let other = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        assert!(matches!(LinkError::from_io(&other), LinkError::StreamIo(_)));
    }
}
