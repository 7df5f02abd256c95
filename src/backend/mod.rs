//! Backend abstraction for cache storage nodes
//!
//! The cache core talks to every storage node through the small `Backend`
//! capability interface. Implementations are selected explicitly at
//! construction time via a `BackendConnector`; there is no runtime
//! fallback from one implementation to another.

pub mod memory;
pub mod protocol;
pub mod remote;

pub use memory::MemoryBackend;
pub use remote::RemoteBackend;

use crate::config::{BackendConfig, BackendKind};
use crate::error::BackendError;
use async_trait::async_trait;
use std::sync::Arc;

/// Capability interface of a single storage node.
///
/// Values cross this boundary already serialized; TTLs are forwarded
/// verbatim (`0` = no expiry).
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch a value. `Ok(None)` is a clean not-found, not an error.
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError>;

    /// Store a value with the given TTL in seconds (`0` = no expiry).
    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), BackendError>;

    /// Delete a key, returning how many entries were removed.
    async fn delete(&self, key: &str) -> Result<u64, BackendError>;

    /// Delete all keys matching a glob-style pattern.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64, BackendError>;

    /// Lightweight liveness probe.
    async fn ping(&self) -> Result<(), BackendError>;

    /// Human-readable description for health reports and logs.
    fn describe(&self) -> String;
}

impl std::fmt::Debug for dyn Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Backend({})", self.describe())
    }
}

/// Opens backend connections for cluster nodes.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn Backend>, BackendError>;
}

/// Connector producing TCP-backed `RemoteBackend`s.
pub struct RemoteConnector {
    request_timeout: std::time::Duration,
}

impl RemoteConnector {
    pub fn new(request_timeout: std::time::Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl BackendConnector for RemoteConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<Arc<dyn Backend>, BackendError> {
        let backend = RemoteBackend::connect(host, port, self.request_timeout).await?;
        Ok(Arc::new(backend))
    }
}

/// Connector producing fresh in-process backends. Useful for embedded
/// deployments and tests.
pub struct MemoryConnector;

#[async_trait]
impl BackendConnector for MemoryConnector {
    async fn connect(&self, _host: &str, _port: u16) -> Result<Arc<dyn Backend>, BackendError> {
        Ok(Arc::new(MemoryBackend::new()))
    }
}

/// Build the connector named by the configuration.
pub fn connector_for(config: &BackendConfig) -> Arc<dyn BackendConnector> {
    match config.kind {
        BackendKind::Memory => Arc::new(MemoryConnector),
        BackendKind::Remote => Arc::new(RemoteConnector::new(config.request_timeout())),
    }
}

/// Glob matcher for pattern deletes. Supports `*` matching any run of
/// characters; all other characters match literally.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    fn inner(pat: &[u8], text: &[u8]) -> bool {
        match pat.first() {
            None => text.is_empty(),
            Some(b'*') => {
                (0..=text.len()).any(|skip| inner(&pat[1..], &text[skip..]))
            }
            Some(&c) => text.first() == Some(&c) && inner(&pat[1..], &text[1..]),
        }
    }
    inner(pattern.as_bytes(), key.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("stock:*", "stock:AAPL"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("sentiment:*:reddit", "sentiment:TSLA:reddit"));
        assert!(glob_match("stock:AAPL", "stock:AAPL"));
        assert!(!glob_match("stock:*", "sentiment:AAPL"));
        assert!(!glob_match("stock:AAPL", "stock:AAP"));
    }

    #[tokio::test]
    async fn test_connector_selection() {
        let config = BackendConfig {
            kind: BackendKind::Memory,
            ..Default::default()
        };
        let connector = connector_for(&config);
        let backend = connector.connect("", 0).await.unwrap();
        assert!(backend.ping().await.is_ok());
    }
}
