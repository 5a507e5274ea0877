use thiserror::Error;

/// Failures surfaced to callers of the client.
///
/// Errors are cloneable so one transport failure can be handed to every request
/// waiting on the connection, and so a failed iterator can keep reporting its
/// failure on every later pull.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("connection closed")]
    ConnectionClosed,

    #[error("timed out waiting for a response; the request is still outstanding")]
    Timeout,

    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("session closed")]
    SessionClosed,

    #[error("transaction closed")]
    TransactionClosed,

    #[error("server error: {0}")]
    Server(String),

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("failed to decode answer: {0}")]
    Decode(String),
}

impl Error {
    /// Whether waiting again on the same request may still succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_are_recoverable() {
        assert!(Error::Timeout.is_recoverable());
        assert!(!Error::ConnectionClosed.is_recoverable());
        assert!(!Error::ProtocolViolation("x".into()).is_recoverable());
    }

    #[test]
    fn error_messages() {
        assert_eq!(
            Error::InvalidConfiguration("batch size 0".into()).to_string(),
            "invalid configuration: batch size 0"
        );
        assert_eq!(Error::ConnectionClosed.to_string(), "connection closed");
    }
}
