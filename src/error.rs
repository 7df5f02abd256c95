//! Error types for the cache core.
//!
//! Backend-level failures are classified so callers can distinguish an
//! unreachable node from a malformed response. Nothing in this module
//! escapes the public cache surface: `get`/`set`/`delete` convert every
//! failure into a miss or a `false` and log it.

use std::time::Duration;
use thiserror::Error;

/// Failures talking to a single backend node.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Connection refused, reset, or otherwise unreachable.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// The per-call deadline elapsed before a response arrived.
    #[error("backend request timed out after {0:?}")]
    Timeout(Duration),

    /// The node answered, but the response did not match the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// No connection is currently established for this backend.
    #[error("backend not connected")]
    NotConnected,

    /// The value could not be serialized to JSON. Never retried.
    #[error("value is not JSON-encodable: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::InvalidData => BackendError::Protocol(err.to_string()),
            _ => BackendError::Unreachable(err.to_string()),
        }
    }
}

impl BackendError {
    /// Protocol errors are logged distinctly but retried like an
    /// unreachable node.
    pub fn is_protocol(&self) -> bool {
        matches!(self, BackendError::Protocol(_))
    }
}

/// Failures of administrative cluster operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("node {0} is not registered")]
    NoSuchNode(String),

    #[error("node {node_id} unreachable at {addr}: {source}")]
    NodeUnreachable {
        node_id: String,
        addr: String,
        source: BackendError,
    },

    #[error("node {0} is already registered")]
    AlreadyExists(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_classification() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(matches!(BackendError::from(refused), BackendError::Unreachable(_)));

        let garbled = std::io::Error::new(std::io::ErrorKind::InvalidData, "bad frame");
        let err = BackendError::from(garbled);
        assert!(err.is_protocol());
    }
}
