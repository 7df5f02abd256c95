//! In-process backend with per-entry expiry
//!
//! Expired entries are reaped lazily on access, the same way the remote
//! store handles TTLs. This backend powers embedded deployments and the
//! test suites; it is always reachable, so `ping` never fails.

use crate::backend::{glob_match, Backend};
use crate::error::BackendError;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(deadline) if deadline <= now)
    }
}

/// In-memory key/value backend with TTL support.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<HashMap<String, Entry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        let data = self.data.read().await;
        data.values().filter(|e| !e.is_expired(now)).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, BackendError> {
        let mut data = self.data.write().await;
        match data.get(key) {
            Some(entry) if entry.is_expired(Instant::now()) => {
                data.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), BackendError> {
        let expires_at = if ttl_seconds > 0 {
            Some(Instant::now() + Duration::from_secs(ttl_seconds))
        } else {
            None
        };
        let mut data = self.data.write().await;
        data.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<u64, BackendError> {
        let mut data = self.data.write().await;
        Ok(data.remove(key).map(|_| 1).unwrap_or(0))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64, BackendError> {
        let mut data = self.data.write().await;
        let matching: Vec<String> = data
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect();
        let removed = matching.len() as u64;
        for key in matching {
            data.remove(&key);
        }
        Ok(removed)
    }

    async fn ping(&self) -> Result<(), BackendError> {
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
